//! End-to-end tests of [`BufferedSender`] driving a real
//! [`fathom_client::Client`] over a scripted transport.

use std::sync::Arc;

use http::StatusCode;
use http_pipeline::mock::{MockResponse, MockTransport};
use pretty_assertions::assert_eq;
use serde_json::json;

use fathom_client::Client;
use index_buffer::{BufferedSender, BufferedSenderConfig, Document, Error, IndexError};

fn doc(key: &str) -> Document {
    let mut document = Document::new();
    document.insert("hotelId".to_owned(), json!(key));
    document
}

fn results_body(results: &[(&str, u16, bool)]) -> String {
    let results: Vec<_> = results
        .iter()
        .map(|(key, status_code, succeeded)| {
            json!({ "key": key, "statusCode": status_code, "succeeded": succeeded })
        })
        .collect();
    json!({ "results": results }).to_string()
}

fn client(transport: &MockTransport) -> Client {
    Client::builder("http://search.test", "hotels")
        .with_api_key("secret")
        .with_transport(Arc::new(transport.clone()))
        .build()
        .unwrap()
}

fn batch_keys(transport: &MockTransport) -> Vec<Vec<String>> {
    transport
        .requests()
        .iter()
        .map(|request| {
            let body: serde_json::Value =
                serde_json::from_slice(request.body.as_bytes()).unwrap();
            body["actions"]
                .as_array()
                .unwrap()
                .iter()
                .map(|action| action["hotelId"].as_str().unwrap().to_owned())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn test_per_document_failure_is_retried_through_the_stack() {
    let transport = MockTransport::new();
    transport.push_response(
        MockResponse::new(StatusCode::MULTI_STATUS)
            .with_body(results_body(&[("h1", 200, true), ("h2", 503, false)])),
    );
    transport.push_response(
        MockResponse::new(StatusCode::OK).with_body(results_body(&[("h2", 201, true)])),
    );

    let sender = BufferedSender::new(
        Arc::new(client(&transport)),
        "hotelId",
        BufferedSenderConfig {
            batch_action_count: 10,
            auto_flush: false,
            ..Default::default()
        },
        None,
    );

    sender
        .upload_documents(vec![doc("h1"), doc("h2")])
        .await
        .unwrap();

    // One flush call drains the retry internally: the full batch, then the
    // failed document alone
    sender.flush(None).await.unwrap();

    assert_eq!(batch_keys(&transport), vec![vec!["h1", "h2"], vec!["h2"]]);
    assert_eq!(sender.pending_actions(), 0);
    assert_eq!(transport.remaining(), 0);
}

#[tokio::test]
async fn test_threshold_flush_reaches_the_service() {
    let transport = MockTransport::new();
    transport.push_response(MockResponse::new(StatusCode::OK).with_body(results_body(&[
        ("h1", 201, true),
        ("h2", 201, true),
        ("h3", 201, true),
    ])));

    let sender = BufferedSender::new(
        Arc::new(client(&transport)),
        "hotelId",
        BufferedSenderConfig {
            batch_action_count: 3,
            auto_flush: false,
            ..Default::default()
        },
        None,
    );

    // The third document trips the threshold; no explicit flush needed
    sender
        .upload_documents(vec![doc("h1"), doc("h2"), doc("h3")])
        .await
        .unwrap();

    assert_eq!(batch_keys(&transport), vec![vec!["h1", "h2", "h3"]]);
    assert_eq!(sender.pending_actions(), 0);
}

#[tokio::test]
async fn test_rejected_batch_surfaces_and_spends_the_budget() {
    let transport = MockTransport::new();
    transport.push_response(
        MockResponse::new(StatusCode::BAD_REQUEST).with_body("malformed batch"),
    );

    let sender = BufferedSender::new(
        Arc::new(client(&transport)),
        "hotelId",
        BufferedSenderConfig {
            batch_action_count: 10,
            auto_flush: false,
            max_retries_per_action: 0,
            ..Default::default()
        },
        None,
    );

    sender.upload_documents(vec![doc("h1")]).await.unwrap();

    let err = sender.flush(None).await.unwrap_err();
    match err {
        Error::Index(IndexError::Rejected { status, message }) => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(message, "malformed batch");
        }
        other => panic!("unexpected error: {other}"),
    }

    // Budget of zero: the action is dropped, not requeued
    assert_eq!(sender.pending_actions(), 0);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_close_drains_through_the_client() {
    let transport = MockTransport::new();
    transport.push_response(
        MockResponse::new(StatusCode::OK).with_body(results_body(&[("h1", 201, true)])),
    );

    let sender = BufferedSender::new(
        Arc::new(client(&transport)),
        "hotelId",
        BufferedSenderConfig {
            batch_action_count: 10,
            auto_flush: false,
            ..Default::default()
        },
        None,
    );

    sender.upload_documents(vec![doc("h1")]).await.unwrap();
    sender.close().await.unwrap();

    assert_eq!(batch_keys(&transport), vec![vec!["h1"]]);
    assert!(matches!(
        sender.upload_documents(vec![doc("h2")]).await,
        Err(Error::Closed)
    ));
}
