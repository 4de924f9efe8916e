use std::path::PathBuf;
use std::time::Duration;

/// Locates the query service for one connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectParams {
    /// URL scheme, normally `https`.
    pub protocol: String,
    /// Account identifier; forms the default hostname when no host override
    /// is given.
    pub account: String,
    /// Optional host override. When set, the account-derived domain is not
    /// used.
    pub host: Option<String>,
    /// Optional port override.
    pub port: Option<u16>,
    /// Pre-encoded extra URL parameters appended to every request, e.g.
    /// externally signed query parameters.
    pub extra_url_params: Option<String>,
}

impl ConnectParams {
    /// Account-based parameters with no host or port override.
    pub fn for_account(account: impl Into<String>) -> Self {
        Self {
            protocol: "https".to_owned(),
            account: account.into(),
            host: None,
            port: None,
            extra_url_params: None,
        }
    }

    /// Reads connection parameters from environment variables.
    ///
    /// Reads:
    /// - `GLACIERDB_ACCOUNT` — account identifier (required)
    /// - `GLACIERDB_HOST` — host override (optional)
    /// - `GLACIERDB_PORT` — port override (optional)
    /// - `GLACIERDB_PROTOCOL` — URL scheme, defaults to `https`
    pub fn from_env() -> Result<Self, String> {
        let account = std::env::var("GLACIERDB_ACCOUNT")
            .map_err(|_| "missing GLACIERDB_ACCOUNT environment variable".to_owned())?;
        if account.trim().is_empty() {
            return Err("GLACIERDB_ACCOUNT is set but empty".to_owned());
        }
        let port = match std::env::var("GLACIERDB_PORT") {
            Ok(raw) => Some(
                raw.parse::<u16>()
                    .map_err(|_| format!("GLACIERDB_PORT is not a valid port: {raw}"))?,
            ),
            Err(_) => None,
        };
        Ok(Self {
            protocol: std::env::var("GLACIERDB_PROTOCOL").unwrap_or_else(|_| "https".to_owned()),
            account: account.trim().to_owned(),
            host: std::env::var("GLACIERDB_HOST").ok().filter(|h| !h.is_empty()),
            port,
            extra_url_params: None,
        })
    }
}

/// Configures timeout, TLS, and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt network timeout.
    pub network_timeout: Duration,
    /// Maximum number of retries after the initial attempt of a single
    /// transport call.
    pub max_retries: usize,
    /// Backoff lower bound in milliseconds.
    pub backoff_base_ms: u64,
    /// Backoff upper bound in milliseconds.
    pub backoff_cap_ms: u64,
    /// Maximum number of follow-up requests while a long-running operation
    /// reports in-progress.
    pub max_poll_iterations: usize,
    /// Disables peer certificate verification and revocation checking.
    pub insecure_mode: bool,
    /// Optional CA bundle in PEM format used instead of system roots.
    pub ca_bundle_path: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            network_timeout: Duration::from_secs(60),
            max_retries: 7,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 16_000,
            max_poll_iterations: 1_000,
            insecure_mode: false,
            ca_bundle_path: None,
        }
    }
}

/// Application-level status codes consumed by the session layer.
///
/// The literal values are server-defined constants, so they are supplied by
/// the embedding driver rather than hardcoded here.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusCodes {
    /// Session token expired; a renewal is required.
    pub session_expired: String,
    /// Query still running, synchronous variant.
    pub in_progress: String,
    /// Query still running, asynchronous variant.
    pub in_progress_async: String,
}

impl StatusCodes {
    pub fn new(
        session_expired: impl Into<String>,
        in_progress: impl Into<String>,
        in_progress_async: impl Into<String>,
    ) -> Self {
        Self {
            session_expired: session_expired.into(),
            in_progress: in_progress.into(),
            in_progress_async: in_progress_async.into(),
        }
    }

    /// True when `code` is either in-progress variant.
    pub(crate) fn is_in_progress(&self, code: &str) -> bool {
        code == self.in_progress || code == self.in_progress_async
    }
}
