//! Safe remote fetching for untrusted URLs.
//!
//! This crate retrieves remote content on behalf of untrusted callers. It
//! implements SSRF protection and hard resource bounds so that a hostile URL
//! can neither reach internal services nor exhaust memory.
//!
//! # Pipeline
//!
//! 1. **URL validation** - http/https only, non-empty host, no userinfo,
//!    zone ids, or non-canonical numeric hosts
//! 2. **Host guard** - resolves every address of the host and rejects the host
//!    if any address is private, loopback, link-local, multicast, unspecified,
//!    or reserved
//! 3. **Bounded fetch** - connects only to the validated addresses, re-runs
//!    steps 1-2 on every redirect hop, enforces the byte cap while streaming,
//!    and verifies the content type (declared or by magic bytes)
//!
//! One deadline covers all three steps. When it expires the in-flight request
//! is dropped, which aborts the connection.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Configuration, payload, structured errors |
//! | `validate` | URL validator producing [`FetchTarget`] |
//! | `guard` | Address classification, [`Resolve`] seam, host guard |
//! | `http` | Pinned HTTP client, redirects, streaming byte cap |
//! | `resolved` | Internal: config resolution eliminating Option handling |
//!
//! # Usage
//!
//! ```ignore
//! use entityx_fetch::{FetchConfig, Fetcher};
//!
//! let fetcher = Fetcher::new(&FetchConfig::default())?;
//! match fetcher.fetch("https://example.com/cat.png").await {
//!     Ok(payload) => println!("{} bytes of {}", payload.bytes.len(), payload.content_type),
//!     Err(e) if e.code.is_request_terminal() => return Err(e),
//!     Err(e) => tracing::warn!("fetch failed, continuing without content: {e}"),
//! }
//! ```

mod guard;
mod http;
mod resolved;
pub mod types;
mod validate;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use resolved::ResolvedConfig;

pub use guard::{AddressClass, Resolve, ResolveFut, ResolvedAddress, SystemResolver, classify_ip};
pub use types::{
    ContentTypeSource, ErrorCode, ErrorDetails, FetchConfig, FetchConfigError, FetchError,
    Payload, SecurityConfig, TimeoutPhase,
};
pub use validate::FetchTarget;

/// SSRF-guarded, size-bounded fetcher.
///
/// Holds no per-request state; share one instance (behind `Arc` if needed)
/// across concurrent requests. Host checks are never cached between calls.
#[derive(Clone)]
pub struct Fetcher {
    config: ResolvedConfig,
    resolver: Arc<dyn Resolve>,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchConfigError> {
        Ok(Self {
            config: ResolvedConfig::from_config(config)?,
            resolver: Arc::new(SystemResolver),
        })
    }

    /// Replace the DNS resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Fetch `raw_url`, returning the full payload or a typed failure.
    pub async fn fetch(&self, raw_url: &str) -> Result<Payload, FetchError> {
        let deadline = Instant::now() + self.config.timeout;
        let target = FetchTarget::parse(raw_url)?;
        let result = http::fetch(target, &self.config, self.resolver.as_ref(), deadline).await;
        if let Err(ref e) = result {
            tracing::debug!(url = raw_url, code = e.code.as_str(), "fetch failed: {e}");
        }
        result
    }

    /// Run only URL validation and the host guard.
    ///
    /// Returns the validated addresses the fetch would be pinned to.
    pub async fn check_host(&self, raw_url: &str) -> Result<Vec<ResolvedAddress>, FetchError> {
        let deadline = Instant::now() + self.config.timeout;
        let target = FetchTarget::parse(raw_url)?;
        let ips: Vec<IpAddr> =
            guard::check_host(&target, &self.config, self.resolver.as_ref(), deadline).await?;
        Ok(ips
            .into_iter()
            .map(|ip| guard::evaluate_ip(ip, &self.config))
            .collect())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    #[must_use]
    pub fn max_download_bytes(&self) -> u64 {
        self.config.max_download_bytes
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
