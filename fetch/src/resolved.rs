//! Invariant-safe configuration resolution.
//!
//! This module transforms optional boundary-level configuration ([`FetchConfig`])
//! into a concrete internal [`ResolvedConfig`] with no `Option` fields. Optional
//! configuration is resolved once, when the fetcher is built, and the fetch path
//! operates on types where all invariants already hold.
use std::env;
use std::time::Duration;

use crate::guard::Cidr;
use crate::types::{
    ErrorCode, FetchConfig, FetchConfigError, FetchError, SecurityConfig, TimeoutPhase,
};

pub(crate) const DEFAULT_USER_AGENT: &str = "EntityXMonitor/0.1";
pub(crate) const ENV_ALLOW_INSECURE_OVERRIDES: &str = "ENTITYX_FETCH_ALLOW_INSECURE_OVERRIDES";

#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: u32,
    pub max_download_bytes: u64,
    pub max_connect_attempts: u32,
    pub allowed_content_types: Vec<String>,
    pub security: ResolvedSecurityConfig,
}

impl ResolvedConfig {
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchConfigError> {
        let user_agent = config
            .user_agent
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let timeout = Duration::from_secs(u64::from(config.timeout_seconds()));
        let max_connect_attempts = config
            .max_connect_attempts
            .unwrap_or(FetchConfig::DEFAULT_MAX_CONNECT_ATTEMPTS)
            .max(1);

        let allowed_content_types = match &config.allowed_content_types {
            Some(types) if !types.is_empty() => types
                .iter()
                .map(|raw| normalize_media_type(raw))
                .collect::<Result<Vec<_>, _>>()?,
            _ => FetchConfig::DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
        };

        let security = ResolvedSecurityConfig::from_config(config.security.as_ref())?;

        Ok(Self {
            user_agent,
            timeout,
            max_redirects: config.max_redirects(),
            max_download_bytes: config.max_download_bytes(),
            max_connect_attempts,
            allowed_content_types,
            security,
        })
    }

    pub fn allows_content_type(&self, media_type: &str) -> bool {
        self.allowed_content_types.iter().any(|t| t == media_type)
    }

    pub fn timeout_error(&self, phase: TimeoutPhase) -> FetchError {
        let timeout_ms = self.timeout.as_millis() as u64;
        FetchError::new(ErrorCode::UpstreamFetchFailed, "request timed out", true)
            .with_detail("timeout_ms", timeout_ms.to_string())
            .with_detail("phase", phase.label())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedSecurityConfig {
    pub blocked_cidrs: Vec<Cidr>,
    pub allow_insecure_overrides: bool,
}

impl ResolvedSecurityConfig {
    fn from_config(security: Option<&SecurityConfig>) -> Result<Self, FetchConfigError> {
        let blocked_cidrs = security
            .and_then(|s| s.blocked_cidrs.as_ref())
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| {
                        Cidr::parse(entry).ok_or_else(|| FetchConfigError::InvalidCidr(entry.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let requested_insecure_overrides = security.is_some_and(|s| s.allow_insecure_overrides);
        let insecure_overrides_opt_in = env_opt_in_enabled(ENV_ALLOW_INSECURE_OVERRIDES);

        if requested_insecure_overrides && !insecure_overrides_opt_in {
            tracing::warn!(
                "fetch allow_insecure_overrides requested in config but disabled: set {}=1 to opt in",
                ENV_ALLOW_INSECURE_OVERRIDES
            );
        }
        if requested_insecure_overrides && insecure_overrides_opt_in {
            tracing::warn!("fetch insecure overrides enabled: loopback targets are reachable");
        }

        Ok(Self {
            blocked_cidrs,
            allow_insecure_overrides: requested_insecure_overrides && insecure_overrides_opt_in,
        })
    }
}

fn normalize_media_type(raw: &str) -> Result<String, FetchConfigError> {
    let media_type = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if media_type.is_empty() || !media_type.contains('/') {
        return Err(FetchConfigError::InvalidContentType(raw.to_string()));
    }
    Ok(media_type)
}

fn env_opt_in_enabled(name: &str) -> bool {
    is_truthy_env(env::var(name).ok().as_deref())
}

fn is_truthy_env(value: Option<&str>) -> bool {
    value.is_some_and(|raw| {
        matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
