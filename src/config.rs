//! Defaults and the per-client configuration struct.

use std::time::Duration;

pub const BASE_URL: &str = "https://ultraocr.apis.nuveo.ai/v2";
pub const AUTH_BASE_URL: &str = "https://auth.apis.nuveo.ai/v2";

/// Seconds between status checks
pub const POLLING_INTERVAL: u64 = 1;
/// Seconds before a wait gives up
pub const API_TIMEOUT: u64 = 30;
/// Token lifetime requested from the auth server, in minutes
pub const DEFAULT_EXPIRATION_TIME: u64 = 60;

pub const STATUS_DONE: &str = "done";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_WAITING: &str = "waiting";
pub const STATUS_PROCESSING: &str = "processing";

pub const APPLICATION_JSON: &str = "application/json";
pub const BEARER_PREFIX: &str = "Bearer ";

// upload url roles as the server names them in `urls`
pub const KEY_DOCUMENT: &str = "document";
pub const KEY_SELFIE: &str = "selfie";
pub const KEY_EXTRA_URL: &str = "extra_document";

// query flags / single-step body keys
pub const KEY_FACEMATCH: &str = "facematch";
pub const KEY_EXTRA: &str = "extra-document";
pub const BASE64_ATTRIBUTE: &str = "base64";
pub const FLAG_TRUE: &str = "true";

pub const RETURN_ATTRIBUTE: &str = "return";
pub const RETURN_REQUEST: &str = "request";
pub const RETURN_STORAGE: &str = "storage";

/// Everything an outgoing call reads. Owned by the client, changed through its setters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub auth_base_url: String,
    /// How long a wait keeps polling before `JobTimeout`
    pub timeout: Duration,
    /// Sleep between two status checks
    pub interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            auth_base_url: AUTH_BASE_URL.to_string(),
            timeout: Duration::from_secs(API_TIMEOUT),
            interval: Duration::from_secs(POLLING_INTERVAL),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `ULTRAOCR_*` environment variables where set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with the variables read through `lookup`.
    /// Numbers that fail to parse fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let seconds = |key: &str, default: u64| {
            Duration::from_secs(
                lookup(key)
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(default),
            )
        };

        Self {
            base_url: lookup("ULTRAOCR_BASE_URL")
                .map(|url| normalize_url(&url))
                .unwrap_or(defaults.base_url),
            auth_base_url: lookup("ULTRAOCR_AUTH_BASE_URL")
                .map(|url| normalize_url(&url))
                .unwrap_or(defaults.auth_base_url),
            timeout: seconds("ULTRAOCR_TIMEOUT", API_TIMEOUT),
            interval: seconds("ULTRAOCR_POLL_INTERVAL", POLLING_INTERVAL),
        }
    }
}

/// Drops trailing slashes so paths can be appended with a single `/`
pub fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
