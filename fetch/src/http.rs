//! Bounded HTTP fetching.
//!
//! This module implements:
//! - Pinned connections to the host guard's validated addresses
//! - Manual redirect handling with URL validation and host guard at each hop
//! - Content-Length pre-check and streaming byte-cap enforcement
//! - Content-Type allow-list and magic-byte verification
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, LOCATION};
use reqwest::redirect::Policy;
use tokio::time::timeout;
use url::{Host, Url};

use crate::guard::{self, Resolve};
use crate::resolved::ResolvedConfig;
use crate::types::{ContentTypeSource, ErrorCode, FetchError, Payload, TimeoutPhase};
use crate::validate::FetchTarget;

/// Leading-byte signatures of the supported image formats.
const IMAGE_SIGNATURES: &[(&[u8], &str)] = &[
    (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"RIFF", "image/webp"),
    (b"BM", "image/bmp"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
];

/// Fetch a validated target.
///
/// The whole operation, including every hop's host guard, shares `deadline`.
pub(crate) async fn fetch(
    target: FetchTarget,
    config: &ResolvedConfig,
    resolver: &dyn Resolve,
    deadline: Instant,
) -> Result<Payload, FetchError> {
    let mut current = target;
    let mut current_ips = guard::check_host(&current, config, resolver, deadline).await?;
    let mut redirect_count = 0u32;

    loop {
        let response = send_with_pinning(&current, &current_ips, config, deadline).await?;
        let status = response.status();

        if matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308) {
            redirect_count += 1;
            if redirect_count > config.max_redirects {
                return Err(FetchError::new(
                    ErrorCode::UpstreamFetchFailed,
                    "redirect limit exceeded",
                    false,
                )
                .with_detail("count", redirect_count.to_string())
                .with_detail("max", config.max_redirects.to_string()));
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if location.is_empty() {
                return Err(FetchError::new(
                    ErrorCode::UpstreamFetchFailed,
                    "redirect missing Location header",
                    false,
                )
                .with_detail("status", status.as_u16().to_string()));
            }

            let next_url = current.url().join(location).map_err(|_| {
                FetchError::new(
                    ErrorCode::InvalidUrl,
                    "redirect Location could not be resolved",
                    false,
                )
                .with_detail("location", location)
            })?;

            let raw_for_validation = if Url::parse(location).is_ok() {
                location.to_string()
            } else {
                next_url.to_string()
            };

            tracing::debug!(
                from = %current.url(),
                to = %next_url,
                hop = redirect_count,
                "following redirect"
            );

            current = FetchTarget::from_url(&raw_for_validation, next_url)?;
            current_ips = guard::check_host(&current, config, resolver, deadline).await?;
            continue;
        }

        if !status.is_success() {
            return Err(status_error(status));
        }

        return read_payload(response, current.into_url(), config, deadline).await;
    }
}

async fn read_payload(
    response: reqwest::Response,
    final_url: Url,
    config: &ResolvedConfig,
    deadline: Instant,
) -> Result<Payload, FetchError> {
    let max_bytes = config.max_download_bytes;

    if let Some(len) = response.content_length()
        && len > max_bytes
    {
        return Err(too_large_error(len, max_bytes));
    }

    let declared = declared_media_type(response.headers());
    if let Some(ref media_type) = declared
        && !config.allows_content_type(media_type)
    {
        return Err(unsupported_type_error(media_type));
    }

    let mut body: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(config.timeout_error(TimeoutPhase::Response));
        }
        let next = timeout(remaining, stream.next())
            .await
            .map_err(|_| config.timeout_error(TimeoutPhase::Response))?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| {
            FetchError::new(
                ErrorCode::UpstreamFetchFailed,
                format!("response stream error: {e}"),
                true,
            )
            .with_detail("error", e.to_string())
        })?;

        let total = body.len() as u64 + chunk.len() as u64;
        if total > max_bytes {
            tracing::warn!(url = %final_url, max_bytes, "aborting oversized response stream");
            return Err(too_large_error(total, max_bytes));
        }

        body.extend_from_slice(&chunk);
    }

    if body.is_empty() {
        return Err(FetchError::new(
            ErrorCode::EmptyPayload,
            "fetched payload is empty",
            false,
        )
        .with_detail("url", final_url.as_str()));
    }

    let (content_type, content_type_source) = match declared {
        Some(media_type) => (media_type, ContentTypeSource::Declared),
        None => {
            let sniffed = sniff_image_type(&body)
                .filter(|media_type| config.allows_content_type(media_type))
                .ok_or_else(|| {
                    FetchError::new(
                        ErrorCode::UnsupportedContentType,
                        "payload does not match a supported format signature",
                        false,
                    )
                    .with_detail("content_type", "sniffed:unknown")
                })?;
            (sniffed.to_string(), ContentTypeSource::Sniffed)
        }
    };

    tracing::debug!(
        url = %final_url,
        bytes = body.len(),
        content_type = %content_type,
        "fetch complete"
    );

    Ok(Payload {
        bytes: body,
        content_type,
        content_type_source,
        final_url,
    })
}

async fn send_with_pinning(
    target: &FetchTarget,
    ips: &[IpAddr],
    config: &ResolvedConfig,
    deadline: Instant,
) -> Result<reqwest::Response, FetchError> {
    let pin_dns = matches!(target.host(), Host::Domain(_));
    let max_attempts = config.max_connect_attempts as usize;

    let mut first_error: Option<String> = None;
    let mut attempted = Vec::new();

    for ip in ips.iter().take(max_attempts) {
        attempted.push(ip.to_string());
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(config.timeout_error(TimeoutPhase::Redirect));
        }

        let client = build_client(config, target, *ip, pin_dns)?;
        let send_future = client.get(target.url().clone()).send();
        let response = match timeout(remaining, send_future).await {
            Ok(res) => res,
            Err(_) => return Err(config.timeout_error(TimeoutPhase::Request)),
        };

        match response {
            Ok(resp) => return Ok(resp),
            Err(err) => {
                tracing::debug!(ip = %ip, error = %err, "connection attempt failed");
                if first_error.is_none() {
                    first_error = Some(err.to_string());
                }
                if err.is_timeout() {
                    return Err(config.timeout_error(TimeoutPhase::Request));
                }
            }
        }
    }

    Err(FetchError::new(
        ErrorCode::UpstreamFetchFailed,
        "all connection attempts failed",
        true,
    )
    .with_detail("error", first_error.unwrap_or_else(|| "unknown".into()))
    .with_detail("attempted_ips", attempted.join(",")))
}

fn build_client(
    config: &ResolvedConfig,
    target: &FetchTarget,
    ip: IpAddr,
    pin_dns: bool,
) -> Result<reqwest::Client, FetchError> {
    // Proxies would connect on our behalf and bypass the pinned addresses.
    let mut builder = reqwest::Client::builder()
        .redirect(Policy::none())
        .no_proxy()
        .user_agent(&config.user_agent);

    if pin_dns {
        builder = builder.resolve(target.host_str(), SocketAddr::new(ip, target.port()));
    }

    builder.build().map_err(|e| {
        FetchError::new(
            ErrorCode::UpstreamFetchFailed,
            format!("failed to build HTTP client: {e}"),
            false,
        )
    })
}

/// Media type from the `Content-Type` header, lowercased without parameters.
/// An absent or blank header yields `None`.
fn declared_media_type(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let media_type = header.split(';').next().unwrap_or("").trim();
    if media_type.is_empty() {
        None
    } else {
        Some(media_type.to_ascii_lowercase())
    }
}

fn sniff_image_type(body: &[u8]) -> Option<&'static str> {
    IMAGE_SIGNATURES
        .iter()
        .find(|(signature, _)| body.starts_with(signature))
        .map(|(_, media_type)| *media_type)
}

fn status_error(status: StatusCode) -> FetchError {
    let retryable = status.is_server_error() || matches!(status.as_u16(), 408 | 429);
    FetchError::new(
        ErrorCode::UpstreamFetchFailed,
        format!("HTTP {}", status.as_u16()),
        retryable,
    )
    .with_detail("status", status.as_u16().to_string())
    .with_detail(
        "status_text",
        status.canonical_reason().unwrap_or("").to_string(),
    )
}

fn too_large_error(size: u64, max_bytes: u64) -> FetchError {
    FetchError::new(
        ErrorCode::PayloadTooLarge,
        "response exceeds size limit",
        false,
    )
    .with_detail("size", size.to_string())
    .with_detail("max_bytes", max_bytes.to_string())
}

fn unsupported_type_error(media_type: &str) -> FetchError {
    FetchError::new(
        ErrorCode::UnsupportedContentType,
        format!("unsupported content type: {media_type}"),
        false,
    )
    .with_detail("content_type", media_type)
}
