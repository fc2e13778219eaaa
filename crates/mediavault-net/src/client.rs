use async_trait::async_trait;
use futures::TryStreamExt;
use mediavault_core::DownloadOptions;
use reqwest::Client;
use url::Url;

use crate::{
    error::{FetchError, FetchResult},
    traits::{ByteStream, Net, Payload},
    types::Headers,
};

/// `reqwest`-backed [`Net`] implementation.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    /// Build a client from the download options.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Connection`] when the underlying client
    /// cannot be constructed (e.g. a malformed proxy URL).
    pub fn new(options: &DownloadOptions) -> FetchResult<Self> {
        let mut builder = Client::builder().timeout(options.request_timeout);
        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| FetchError::Connection(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if let Some(agent) = &options.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let inner = builder
            .build()
            .map_err(|e| FetchError::Connection(format!("client build failed: {e}")))?;
        Ok(Self { inner })
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get(&self, url: Url, headers: Option<Headers>) -> Result<Payload, FetchError> {
        let req = Self::apply_headers(self.inner.get(url.clone()), headers);
        let resp = req.send().await.map_err(FetchError::from)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16(), &url));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let content_length = resp.content_length();
        let bytes = resp.bytes().await.map_err(FetchError::from)?;

        Ok(Payload {
            bytes,
            content_type,
            content_length,
        })
    }

    async fn stream(
        &self,
        url: Url,
        headers: Option<Headers>,
    ) -> Result<(ByteStream, Option<u64>), FetchError> {
        let req = Self::apply_headers(self.inner.get(url.clone()), headers);
        let resp = req.send().await.map_err(FetchError::from)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16(), &url));
        }

        let content_length = resp.content_length();
        let stream = resp.bytes_stream().map_err(FetchError::from);
        Ok((Box::pin(stream) as ByteStream, content_length))
    }
}
