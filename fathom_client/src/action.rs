use serde::{Deserialize, Serialize};

/// A schemaless document payload, keyed by the index's configured key field.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// What the service should do with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexActionKind {
    /// Insert the document, replacing any existing one with the same key.
    Upload,
    /// Update fields of an existing document; fails if the key is unknown.
    Merge,
    /// Merge when the key exists, upload otherwise.
    MergeOrUpload,
    /// Remove the document with this key. Only the key field is consulted.
    Delete,
}

/// One (action, document) pair of an indexing batch.
///
/// Explicit variants per action kind; the wire form is internally tagged:
/// `{"action": "mergeOrUpload", "document": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum IndexAction {
    Upload { document: Document },
    Merge { document: Document },
    MergeOrUpload { document: Document },
    Delete { document: Document },
}

impl IndexAction {
    pub fn upload(document: Document) -> Self {
        Self::Upload { document }
    }

    pub fn merge(document: Document) -> Self {
        Self::Merge { document }
    }

    pub fn merge_or_upload(document: Document) -> Self {
        Self::MergeOrUpload { document }
    }

    pub fn delete(document: Document) -> Self {
        Self::Delete { document }
    }

    pub fn kind(&self) -> IndexActionKind {
        match self {
            Self::Upload { .. } => IndexActionKind::Upload,
            Self::Merge { .. } => IndexActionKind::Merge,
            Self::MergeOrUpload { .. } => IndexActionKind::MergeOrUpload,
            Self::Delete { .. } => IndexActionKind::Delete,
        }
    }

    pub fn document(&self) -> &Document {
        match self {
            Self::Upload { document }
            | Self::Merge { document }
            | Self::MergeOrUpload { document }
            | Self::Delete { document } => document,
        }
    }

    /// The document's key under the index's key field, if present and a
    /// string.
    pub fn key(&self, key_field: &str) -> Option<&str> {
        self.document().get(key_field)?.as_str()
    }
}

/// Per-document outcome reported by the batch endpoint.
///
/// The service returns one result per submitted action; a failed result is
/// data, not an error, and carries the per-document status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingResult {
    pub key: String,

    pub status_code: u16,

    pub succeeded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl IndexingResult {
    /// A successful result, as tests and mocks commonly need one.
    pub fn success(key: impl Into<String>, status_code: u16) -> Self {
        Self {
            key: key.into(),
            status_code,
            succeeded: true,
            error_message: None,
        }
    }

    /// A failed result with the service's per-document error message.
    pub fn failure(key: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status_code,
            succeeded: false,
            error_message: Some(message.into()),
        }
    }
}

/// Request envelope of the batch endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct BatchRequest<'a> {
    pub(crate) actions: &'a [IndexAction],
}

/// Response envelope of the batch endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponse {
    pub(crate) results: Vec<IndexingResult>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn doc(key: &str, rating: i64) -> Document {
        let mut document = Document::new();
        document.insert("hotelId".to_owned(), json!(key));
        document.insert("rating".to_owned(), json!(rating));
        document
    }

    #[test]
    fn test_action_wire_format() {
        let action = IndexAction::merge_or_upload(doc("h1", 4));

        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({
                "action": "mergeOrUpload",
                "document": {"hotelId": "h1", "rating": 4},
            })
        );
    }

    #[test]
    fn test_batch_envelope() {
        let actions = vec![
            IndexAction::upload(doc("h1", 4)),
            IndexAction::delete(doc("h2", 1)),
        ];
        let batch = BatchRequest { actions: &actions };

        assert_eq!(
            serde_json::to_value(&batch).unwrap(),
            json!({
                "actions": [
                    {"action": "upload", "document": {"hotelId": "h1", "rating": 4}},
                    {"action": "delete", "document": {"hotelId": "h2", "rating": 1}},
                ],
            })
        );
    }

    #[test]
    fn test_result_parsing() {
        let body = json!({
            "results": [
                {"key": "h1", "statusCode": 201, "succeeded": true},
                {
                    "key": "h2",
                    "statusCode": 404,
                    "succeeded": false,
                    "errorMessage": "document not found",
                },
            ],
        });

        let parsed: BatchResponse = serde_json::from_value(body).unwrap();
        assert_eq!(
            parsed.results,
            vec![
                IndexingResult::success("h1", 201),
                IndexingResult::failure("h2", 404, "document not found"),
            ]
        );
    }

    #[test]
    fn test_key_extraction() {
        let action = IndexAction::upload(doc("h9", 2));
        assert_eq!(action.key("hotelId"), Some("h9"));
        assert_eq!(action.key("missing"), None);

        // Non-string keys are rejected rather than stringified
        assert_eq!(action.key("rating"), None);
    }

    #[test]
    fn test_kind_accessors() {
        let action = IndexAction::delete(doc("h1", 0));
        assert_eq!(action.kind(), IndexActionKind::Delete);
        assert_eq!(action.document().len(), 2);
    }
}
