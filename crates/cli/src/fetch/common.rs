//! HTTP plumbing shared by the Plex client.
//!
//! `FetchClient` owns retry, backoff and status classification:
//! - 401/403: auth failure, no retry
//! - other 4xx (not 429): rejected, no retry
//! - 429, 5xx, network errors: retried with exponential backoff
//!
//! Every failure surfaces as `ReconError::DataSource`, so a failed fetch
//! never reaches the writer.

use std::thread;
use std::time::Duration;

use reelsync_recon::ReconError;
use tracing::{debug, warn};

// ── Constants ───────────────────────────────────────────────────────

pub(super) const MAX_RETRIES: u32 = 3;
pub(super) const USER_AGENT: &str = concat!("reelsync/", env!("CARGO_PKG_VERSION"));

// ── FetchClient ─────────────────────────────────────────────────────

pub(super) struct FetchClient {
    pub(super) http: reqwest::blocking::Client,
    source_name: String,
    backoff: Duration,
}

impl FetchClient {
    pub(super) fn new(source_name: &str, timeout: Duration) -> Result<Self, ReconError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ReconError::DataSource(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            source_name: source_name.to_string(),
            backoff: Duration::from_secs(1),
        })
    }

    /// Initial backoff; doubled after each retry.
    #[cfg(test)]
    pub(super) fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Make a GET request with retry + exponential backoff and parse the
    /// JSON body.
    ///
    /// `build_request` is called once per attempt and must return a fully
    /// configured `RequestBuilder` (URL, auth, headers, query params).
    pub(super) fn request_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, ReconError> {
        let mut backoff = self.backoff;

        for attempt in 0..=MAX_RETRIES {
            match build_request(&self.http).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 401 || status == 403 {
                        return Err(ReconError::DataSource(format!(
                            "{} auth failed ({status}): check plex.token",
                            self.source_name,
                        )));
                    }

                    if (400..500).contains(&status) && status != 429 {
                        let body = resp.text().unwrap_or_default();
                        return Err(ReconError::DataSource(format!(
                            "{} request rejected ({status}): {}",
                            self.source_name,
                            body.trim().chars().take(200).collect::<String>(),
                        )));
                    }

                    if status == 429 || status >= 500 {
                        if attempt == MAX_RETRIES {
                            return Err(ReconError::DataSource(format!(
                                "{} {} after {} attempts ({status})",
                                self.source_name,
                                if status == 429 { "rate limited" } else { "upstream error" },
                                MAX_RETRIES,
                            )));
                        }

                        // Respect Retry-After for 429
                        let wait = if status == 429 {
                            resp.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.parse::<u64>().ok())
                                .map(Duration::from_secs)
                                .unwrap_or(backoff)
                        } else {
                            backoff
                        };

                        warn!(
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            wait_ms = wait.as_millis() as u64,
                            status,
                            "retrying {}",
                            self.source_name
                        );
                        thread::sleep(wait);
                        backoff *= 2;
                        continue;
                    }

                    let text = resp.text().map_err(|e| {
                        ReconError::DataSource(format!(
                            "failed to read {} response body: {e}",
                            self.source_name,
                        ))
                    })?;
                    let trimmed = text.trim_start_matches('\u{feff}');
                    debug!(bytes = trimmed.len(), "{} response", self.source_name);
                    return serde_json::from_str(trimmed).map_err(|e| {
                        ReconError::DataSource(format!(
                            "failed to parse {} JSON response: {e} (body: {})",
                            self.source_name,
                            trimmed.chars().take(200).collect::<String>(),
                        ))
                    });
                }
                Err(e) => {
                    if attempt == MAX_RETRIES {
                        return Err(ReconError::DataSource(format!(
                            "{} unreachable after {} attempts: {e}",
                            self.source_name, MAX_RETRIES,
                        )));
                    }

                    warn!(
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        wait_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying {}",
                        self.source_name
                    );
                    thread::sleep(backoff);
                    backoff *= 2;
                }
            }
        }

        Err(ReconError::DataSource(format!(
            "{} request failed",
            self.source_name
        )))
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Resolve the server token: flag (or its env var) > config file.
pub(crate) fn resolve_token(flag: Option<String>, configured: Option<&str>) -> Option<String> {
    flag.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            configured
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_token_flag_priority() {
        assert_eq!(resolve_token(Some(" abc ".into()), Some("cfg")).as_deref(), Some("abc"));
    }

    #[test]
    fn test_resolve_token_empty_flag_falls_back() {
        assert_eq!(resolve_token(Some("  ".into()), Some("cfg")).as_deref(), Some("cfg"));
    }

    #[test]
    fn test_resolve_token_missing() {
        assert_eq!(resolve_token(None, None), None);
        assert_eq!(resolve_token(None, Some("")), None);
    }
}
