//! Configuration, payload, and error types for the fetch boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Fetch configuration.
///
/// Every field is optional; unset fields resolve to the `DEFAULT_*` constants.
/// Maps to the `[fetch]` table in config.toml.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FetchConfig {
    /// User-Agent string for HTTP requests.
    pub user_agent: Option<String>,

    /// Budget for the whole operation (DNS, connect, redirects, body). Default: 6.
    pub timeout_seconds: Option<u32>,

    /// Maximum redirects to follow. Default: 5.
    pub max_redirects: Option<u32>,

    /// Maximum payload size in bytes. Default: 10 MiB.
    pub max_download_bytes: Option<u64>,

    /// Maximum validated addresses to try per hop. Default: 3.
    pub max_connect_attempts: Option<u32>,

    /// Accepted media types. Default: the supported image formats.
    pub allowed_content_types: Option<Vec<String>>,

    /// Security-specific configuration.
    pub security: Option<SecurityConfig>,
}

impl FetchConfig {
    pub const DEFAULT_TIMEOUT_SECONDS: u32 = 6;

    pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

    /// 10 MiB.
    pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 10 * 1024 * 1024;

    pub const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 3;

    pub const DEFAULT_ALLOWED_CONTENT_TYPES: &'static [&'static str] = &[
        "image/jpeg",
        "image/png",
        "image/webp",
        "image/gif",
        "image/bmp",
        "image/tiff",
    ];

    #[must_use]
    pub fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
            .unwrap_or(Self::DEFAULT_TIMEOUT_SECONDS)
            .max(1)
    }

    #[must_use]
    pub fn max_redirects(&self) -> u32 {
        self.max_redirects.unwrap_or(Self::DEFAULT_MAX_REDIRECTS)
    }

    #[must_use]
    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_bytes
            .unwrap_or(Self::DEFAULT_MAX_DOWNLOAD_BYTES)
    }
}

/// Security-specific configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    /// Additional blocked CIDR ranges, on top of the special-purpose registries.
    pub blocked_cidrs: Option<Vec<String>>,

    /// Permit loopback targets. Only honored together with the
    /// `ENTITYX_FETCH_ALLOW_INSECURE_OVERRIDES=1` environment opt-in.
    #[serde(default)]
    pub allow_insecure_overrides: bool,
}

/// Rejected fetch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchConfigError {
    #[error("invalid blocked cidr: {0}")]
    InvalidCidr(String),
    #[error("invalid content type in allow-list: {0:?}")]
    InvalidContentType(String),
}

/// Successfully fetched content.
///
/// Never empty and never larger than the configured byte cap.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Response body.
    pub bytes: Vec<u8>,

    /// Effective media type, lowercased and without parameters.
    pub content_type: String,

    /// Where `content_type` came from.
    pub content_type_source: ContentTypeSource,

    /// URL of the last hop after redirects.
    pub final_url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTypeSource {
    /// `Content-Type` response header.
    Declared,
    /// Leading magic bytes; the header was absent.
    Sniffed,
}

/// Fetch error with structured details.
///
/// Contains:
/// - `code`: Stable error code
/// - `message`: Human-readable description
/// - `retryable`: Whether retry may succeed
/// - `details`: Optional error-specific context
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FetchError {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable description.
    pub message: String,

    /// Whether retry may succeed.
    pub retryable: bool,

    /// Error-specific context.
    pub details: ErrorDetails,
}

impl FetchError {
    pub fn new(code: ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
            details: ErrorDetails::default(),
        }
    }

    /// Add a detail field.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.0.push((key.into(), value.into()));
        self
    }

    /// Look up a detail value by key.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to JSON for an HTTP response body.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "error": true,
            "code": self.code,
            "message": self.message,
            "retryable": self.retryable,
        });

        if !self.details.0.is_empty() {
            let details: serde_json::Map<String, serde_json::Value> = self
                .details
                .0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            obj["details"] = serde_json::Value::Object(details);
        }

        obj
    }
}

impl Serialize for FetchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// URL failed syntactic validation.
    InvalidUrl,
    /// Host is, or resolves to, a non-public address.
    PrivateHostRejected,
    /// Hostname could not be resolved.
    DnsResolutionFailed,
    /// Timeout, network error, non-2xx status, or redirect failure.
    UpstreamFetchFailed,
    /// Payload exceeds the byte cap.
    PayloadTooLarge,
    /// Media type outside the allow-list, or no recognized signature.
    UnsupportedContentType,
    /// Upstream returned no bytes.
    EmptyPayload,
}

impl ErrorCode {
    /// URL Validator and Host Guard failures end the request; retrying is pointless.
    #[must_use]
    pub fn is_request_terminal(&self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidUrl | ErrorCode::PrivateHostRejected | ErrorCode::DnsResolutionFailed
        )
    }

    /// HTTP status an API layer reports for this code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidUrl | ErrorCode::PrivateHostRejected => 400,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::UnsupportedContentType => 415,
            ErrorCode::DnsResolutionFailed
            | ErrorCode::UpstreamFetchFailed
            | ErrorCode::EmptyPayload => 422,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "invalid_url",
            ErrorCode::PrivateHostRejected => "private_host_rejected",
            ErrorCode::DnsResolutionFailed => "dns_resolution_failed",
            ErrorCode::UpstreamFetchFailed => "upstream_fetch_failed",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::UnsupportedContentType => "unsupported_content_type",
            ErrorCode::EmptyPayload => "empty_payload",
        }
    }
}

/// Error details as key-value pairs.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetails(pub Vec<(String, String)>);

/// Timeout phase for detailed error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPhase {
    /// Timeout during DNS resolution.
    Dns,
    /// Timeout connecting or waiting for response headers.
    Request,
    /// Timeout while reading response body.
    Response,
    /// Budget exhausted across the redirect chain.
    Redirect,
}

impl TimeoutPhase {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            TimeoutPhase::Dns => "dns",
            TimeoutPhase::Request => "request",
            TimeoutPhase::Response => "response",
            TimeoutPhase::Redirect => "redirect",
        }
    }
}
