//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`, with middleware-driven
//! exponential backoff for transient failures and standardized JSON response
//! handling. Failures are reported as [`FetchError`] so callers can feed them
//! straight into a poll loop.

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::error::FetchError;

/// A standardized container for API responses.
///
/// Wraps the deserialized data along with metadata about the HTTP
/// transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// The data of a successful response, or the matching [`FetchError`].
    pub fn into_data(self) -> Result<T, FetchError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(FetchError::Decode("empty response body".to_string())),
            (false, _) => Err(FetchError::Status {
                status: self.status,
                body: self.error_body.unwrap_or_default(),
            }),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// authentication tokens, and automatic retries.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// An optional Bearer token used for authorization.
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a new `ApiClient` with a 3-retry exponential backoff policy.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "http://127.0.0.1:3001/api/").
    /// * `auth_token` - An optional string for the Authorization header.
    /// * `timeout` - Per-attempt request timeout.
    ///
    /// # Errors
    /// `FetchError::Unavailable` if `base_url` is not an absolute URL or the
    /// HTTP client can't be built.
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = Url::parse(base_url).map_err(|error| {
            tracing::error!(base_url, %error, "invalid base URL");
            FetchError::Unavailable
        })?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let http = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            tracing::error!(%error, "failed to build HTTP client");
            FetchError::Unavailable
        })?;

        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a generic HTTP request and handles the response.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb (GET, POST, etc.).
    /// * `path` - The relative path to append to the base URL.
    /// * `headers` - Optional additional headers for this specific request.
    /// * `body` - Optional serializable object to send as the JSON body.
    ///
    /// # Errors
    /// `Transport` when the request can't be built or sent, `Decode` when a
    /// 2xx body doesn't match `T`. Non-2xx statuses are not errors here; see
    /// [`ApiResponse::into_data`].
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, FetchError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self
            .base_url
            .join(path)
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b).map_err(|e| FetchError::Transport(e.to_string()))?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await.map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response
                .json::<T>()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response<T>(data: Option<T>, status: u16) -> ApiResponse<T> {
        ApiResponse {
            data,
            error_body: Some("nope".to_string()),
            status,
            success: (200..300).contains(&status),
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_relative_base_url_is_rejected() {
        let result = ApiClient::new("not a url", None, Duration::from_secs(1));
        assert_eq!(result.err(), Some(FetchError::Unavailable));
    }

    #[test]
    fn test_into_data() {
        assert_eq!(response(Some(1), 200).into_data(), Ok(1));
        assert_eq!(
            response::<u8>(None, 502).into_data(),
            Err(FetchError::Status {
                status: 502,
                body: "nope".to_string()
            })
        );
        assert!(matches!(response::<u8>(None, 200).into_data(), Err(FetchError::Decode(_))));
    }
}
