use bytes::{Bytes, BytesMut};
use futures::{TryStreamExt, stream::BoxStream};
use http::{HeaderMap, StatusCode};

use crate::transport::TransportError;

/// Stream of body chunks as produced by a [`Transport`].
///
/// [`Transport`]: crate::Transport
pub type BytesStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A response body, either fully buffered by the transport or streamed.
///
/// A streaming body owns the underlying connection until it is consumed or
/// dropped.
pub enum ResponseBody {
    Buffered(Bytes),
    Streaming(BytesStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(bytes).finish(),
            Self::Streaming(_) => f.debug_tuple("Streaming").finish(),
        }
    }
}

impl ResponseBody {
    /// Reads the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        match self {
            Self::Buffered(bytes) => Ok(bytes),
            Self::Streaming(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.try_next().await? {
                    buffer.extend_from_slice(&chunk);
                }
                Ok(buffer.freeze())
            }
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::Buffered(bytes)
    }
}

/// An HTTP response as it travels back up the pipeline.
///
/// A response is returned for every completed exchange: 4xx and 5xx statuses
/// are data here, not errors. Interpreting the status is the caller's (or a
/// policy's) decision.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Consumes the response and reads the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        self.body.bytes().await
    }
}
