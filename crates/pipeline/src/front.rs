//! Client for the worker-side interactive front.
//!
//! During a page-mode interaction the worker serves the page and its
//! resources from its own small HTTP front. The browser talks to us; we
//! forward each get/create/delete/list call to that front and surface its
//! failures unchanged.
//!
//! Front protocol, relative to the front address the worker registered:
//!
//! ```text
//! GET    /files/{path}?{query}    -> file content
//! PUT    /files/{path}            -> create or replace
//! DELETE /files/{path}            -> delete
//! GET    /list/{path}             -> JSON array of entry names
//! ```

use async_trait::async_trait;

/// Errors from a proxied front call.
#[derive(Debug, thiserror::Error)]
pub enum FrontError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("interactive front request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The front answered with a non-2xx status.
    #[error("interactive front error ({status}): {body}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Content returned by a proxied `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontContent {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// File and content operations on a worker's interactive front.
#[async_trait]
pub trait InteractiveFront: Send + Sync {
    async fn get(
        &self,
        front: &str,
        path: &str,
        query: Option<&str>,
    ) -> Result<FrontContent, FrontError>;

    async fn create(&self, front: &str, path: &str, content: Vec<u8>) -> Result<(), FrontError>;

    async fn delete(&self, front: &str, path: &str) -> Result<(), FrontError>;

    async fn list(&self, front: &str, path: &str) -> Result<Vec<String>, FrontError>;
}

/// [`InteractiveFront`] over HTTP using [`reqwest`].
pub struct HttpFront {
    client: reqwest::Client,
}

impl HttpFront {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a front client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn url(front: &str, kind: &str, path: &str) -> String {
        format!(
            "{}/{kind}/{}",
            front.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Map non-2xx responses to [`FrontError::Remote`].
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, FrontError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FrontError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

impl Default for HttpFront {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InteractiveFront for HttpFront {
    async fn get(
        &self,
        front: &str,
        path: &str,
        query: Option<&str>,
    ) -> Result<FrontContent, FrontError> {
        let mut url = Self::url(front, "files", path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        let response = Self::check(self.client.get(url).send().await?).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?.to_vec();
        Ok(FrontContent { content_type, body })
    }

    async fn create(&self, front: &str, path: &str, content: Vec<u8>) -> Result<(), FrontError> {
        let url = Self::url(front, "files", path);
        Self::check(self.client.put(url).body(content).send().await?).await?;
        Ok(())
    }

    async fn delete(&self, front: &str, path: &str) -> Result<(), FrontError> {
        let url = Self::url(front, "files", path);
        Self::check(self.client.delete(url).send().await?).await?;
        Ok(())
    }

    async fn list(&self, front: &str, path: &str) -> Result<Vec<String>, FrontError> {
        let url = Self::url(front, "list", path);
        let response = Self::check(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slashes() {
        assert_eq!(
            HttpFront::url("http://127.0.0.1:9000/", "files", "/index.html"),
            "http://127.0.0.1:9000/files/index.html"
        );
        assert_eq!(
            HttpFront::url("http://h", "list", "a/b"),
            "http://h/list/a/b"
        );
    }
}
