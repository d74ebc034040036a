//! HTTP response wrapper.

use std::collections::HashMap;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Result, ScrapeError};

/// A response whose status has already been checked.
pub struct HttpResponse {
    pub status: StatusCode,
    /// Final URL after redirects.
    pub url: String,
    pub headers: HashMap<String, String>,
    pub(crate) response: Response,
}

impl HttpResponse {
    pub(crate) fn new(response: Response) -> Self {
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        Self {
            status: response.status(),
            url: response.url().to_string(),
            headers,
            response,
        }
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Mime type without parameters.
    pub fn mime_type(&self) -> Option<String> {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
    }

    pub async fn bytes(self) -> Result<Vec<u8>> {
        Ok(self.response.bytes().await.map(|b| b.to_vec())?)
    }

    pub async fn text(self) -> Result<String> {
        Ok(self.response.text().await?)
    }

    /// Read the body, keeping the URL and mime type.
    pub async fn into_body(self) -> Result<FetchedBody> {
        let url = self.url.clone();
        let mime_type = self.mime_type();
        let body = self.bytes().await?;
        Ok(FetchedBody {
            url,
            mime_type,
            body,
        })
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let url = self.url.clone();
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ScrapeError::InvalidDocument(format!("{}: {}", url, e)))
    }
}

/// A fully read response body.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub url: String,
    pub mime_type: Option<String>,
    pub body: Vec<u8>,
}
