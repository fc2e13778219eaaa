use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::{error::FetchError, types::Headers};

/// Stream of response body frames.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// A fully buffered response.
#[derive(Clone, Debug)]
pub struct Payload {
    pub bytes: Bytes,
    /// Content-Type header, if the server sent one.
    pub content_type: Option<String>,
    /// Content-Length header, if the server sent one.
    pub content_length: Option<u64>,
}

/// Minimal HTTP surface the fetcher needs.
///
/// The trait seam exists so retry and session handling can be tested
/// against doubles instead of a live client.
#[cfg_attr(test, unimock::unimock(api = NetMock))]
#[async_trait]
pub trait Net: Send + Sync {
    /// GET `url` and buffer the whole body.
    async fn get(&self, url: Url, headers: Option<Headers>) -> Result<Payload, FetchError>;

    /// GET `url` and stream the body. The response's Content-Length,
    /// when present, is returned alongside the stream.
    async fn stream(
        &self,
        url: Url,
        headers: Option<Headers>,
    ) -> Result<(ByteStream, Option<u64>), FetchError>;
}
