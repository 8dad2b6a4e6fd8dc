use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Status, the headers the web worker acts on, and the streaming body.
pub struct HttpResponse<E> {
    pub status:         u16,
    pub location:       Option<String>,
    pub content_length: Option<u64>,
    pub content_range:  Option<String>,
    pub body:           BoxStream<'static, Result<Bytes, E>>,
}

impl<E> std::fmt::Debug for HttpResponse<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("location", &self.location)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Asynchronous HTTP client abstraction.
///
/// Implementations must NOT follow redirects themselves: the web worker
/// counts redirects against its own budget.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - Mock implementations for testing
pub trait HttpClient: Send + Sync + 'static {
    type Error: std::error::Error + Send + 'static;

    /// Issue a GET request with the given extra headers.
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use futures_util::StreamExt;
    use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, LOCATION};

    use super::*;
    use crate::error::Result;

    /// Production HTTP client implementation using reqwest.
    ///
    /// One client, and so one connection pool, is shared by every web loader.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new() -> Result<Self> {
            let client = reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()?;
            Ok(Self { client })
        }

        /// Wrap a preconfigured client. It should have redirects disabled.
        pub fn with_client(client: reqwest::Client) -> Self { Self { client } }
    }

    fn header(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> std::result::Result<HttpResponse<Self::Error>, Self::Error> {
            let mut request = self.client.get(url);
            for (key, value) in headers {
                request = request.header(key, value);
            }
            let response = request.send().await?;
            let headers = response.headers();
            let location = header(headers, LOCATION);
            let content_range = header(headers, CONTENT_RANGE);
            let content_length =
                header(headers, CONTENT_LENGTH).and_then(|value| value.parse::<u64>().ok());

            Ok(HttpResponse {
                status: response.status().as_u16(),
                location,
                content_length,
                content_range,
                body: Box::pin(response.bytes_stream().map(|chunk| chunk.map(Bytes::from))),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
