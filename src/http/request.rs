//! Request translation.
//!
//! # Responsibilities
//! - Turn one decoded transport request into a [`NormalizedRequest`]
//! - Build the absolute URL from the Host header (scheme is always `http`)
//! - Collapse headers to one value per name, keeping the full map alongside
//! - Leave the body unread
//!
//! # Design Decisions
//! - Pure and non-blocking: only in-memory work
//! - A missing Host header or unparseable URL is fatal for the event
//! - A missing Content-Type is fatal unless the translator is configured
//!   otherwise; many bodyless requests legitimately carry none

use std::collections::HashMap;

use axum::{
    body::{Body, BodyDataStream, Bytes},
    http::{header, uri::Scheme, HeaderMap, Method, Request, Uri},
};
use thiserror::Error;

use crate::config::TranslatorConfig;

/// Why an inbound event could not be translated.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("request has no Host header")]
    MissingHost,

    #[error("malformed request URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("header '{0}' is not valid UTF-8")]
    InvalidHeader(String),

    #[error("request has no Content-Type header")]
    MissingContentType,
}

impl TranslateError {
    /// True for the malformed-input family (bad Host, URL or header bytes).
    pub fn is_malformed_input(&self) -> bool {
        !matches!(self, TranslateError::MissingContentType)
    }
}

/// Translation policy.
#[derive(Debug, Clone, Copy)]
pub struct TranslatorOptions {
    pub require_content_type: bool,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            require_content_type: true,
        }
    }
}

impl From<&TranslatorConfig> for TranslatorOptions {
    fn from(config: &TranslatorConfig) -> Self {
        Self {
            require_content_type: config.require_content_type,
        }
    }
}

/// Request body that has not been read yet.
#[derive(Debug, Default)]
pub struct RequestBody(Body);

impl RequestBody {
    /// Stream the body chunk by chunk as the client sends it.
    pub fn into_stream(self) -> BodyDataStream {
        self.0.into_data_stream()
    }

    /// Read the whole body, failing if it exceeds `limit` bytes.
    pub async fn to_bytes(self, limit: usize) -> Result<Bytes, axum::Error> {
        axum::body::to_bytes(self.0, limit).await
    }
}

impl From<Body> for RequestBody {
    fn from(body: Body) -> Self {
        Self(body)
    }
}

/// The request value handed to the processing pipeline.
#[derive(Debug)]
pub struct NormalizedRequest {
    url: Uri,
    method: Method,
    headers: HashMap<String, String>,
    header_values: HeaderMap,
    content_type: Option<String>,
    body: RequestBody,
}

impl NormalizedRequest {
    /// Absolute request URL (`http://<host><path>`).
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// Path (and query) part of the URL.
    pub fn request_uri(&self) -> &str {
        self.url
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Last value seen for `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// One value per header name; repeated headers keep their last value.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Every header value as received, repeats included.
    pub fn header_values(&self) -> &HeaderMap {
        &self.header_values
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Take the body, leaving an empty one behind.
    pub fn take_body(&mut self) -> RequestBody {
        std::mem::take(&mut self.body)
    }

    pub fn into_body(self) -> RequestBody {
        self.body
    }
}

/// Translate a decoded transport request.
pub fn translate(
    request: Request<Body>,
    options: &TranslatorOptions,
) -> Result<NormalizedRequest, TranslateError> {
    let (parts, body) = request.into_parts();

    let mut headers = HashMap::with_capacity(parts.headers.keys_len());
    for (name, value) in parts.headers.iter() {
        // obs-text is legal on the wire; only bytes that are not UTF-8 are refused.
        let value = std::str::from_utf8(value.as_bytes())
            .map_err(|_| TranslateError::InvalidHeader(name.to_string()))?;
        headers.insert(name.to_string(), value.to_owned());
    }

    let host = headers
        .get(header::HOST.as_str())
        .ok_or(TranslateError::MissingHost)?;
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(host.as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| TranslateError::MalformedUrl {
            url: format!("http://{host}{path_and_query}"),
            reason: e.to_string(),
        })?;

    let content_type = headers.get(header::CONTENT_TYPE.as_str()).cloned();
    if content_type.is_none() && options.require_content_type {
        return Err(TranslateError::MissingContentType);
    }

    Ok(NormalizedRequest {
        url,
        method: parts.method,
        headers,
        header_values: parts.headers,
        content_type,
        body: RequestBody(body),
    })
}
