//! Adaptive scan throttling for web reconnaissance probes.
//!
//! [`SmartScanManager`] owns per-target health state and a scan-intensity
//! policy. It performs exactly one network probe itself (the initial
//! reconnaissance HEAD request); the actual request loop belongs to the
//! caller, which reads the recommended payload count and inter-batch delay,
//! reports every observed response back through
//! [`SmartScanManager::record_response`], and re-checks
//! [`SmartScanManager::should_continue_scan`] before each batch.
//!
//! Failures never escape the public operations: an unreachable target is
//! reported through [`ReconReport::can_proceed`], and a degraded target is a
//! throttling signal, not an error.

mod history;
mod policy;

pub use history::{RequestHistory, RequestSample};
pub use policy::{ParseModeError, ScanMode, ScanPolicy};

use history::{ERROR_WINDOW, LATENCY_WINDOW};
use std::fmt;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Default scanner-identifying user agent for the recon probe.
pub const DEFAULT_USER_AGENT: &str = "ABSpider/1.0 (Security Scanner)";

/// Presence of any of these marks the target as rate limiting; values are
/// not inspected.
const RATE_LIMIT_HEADERS: [&str; 4] =
    ["x-ratelimit-limit", "x-ratelimit-remaining", "retry-after", "x-rate-limit-limit"];

const SECURITY_HEADERS: [&str; 4] = [
    "x-frame-options",
    "content-security-policy",
    "x-xss-protection",
    "strict-transport-security",
];

const MIN_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 10_000;

/// Observed state of the scan target, updated by every recorded response.
#[derive(Debug, Clone)]
pub struct TargetProfile {
    pub identifier: String,
    pub last_response_time_ms: Option<u64>,
    pub last_status_code: Option<u16>,
    pub server_banner: Option<String>,
    pub response_size_bytes: Option<u64>,
    pub rolling_error_rate: f64,
}

/// Health classification derived fresh from recent latency and error-rate
/// statistics on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetHealth {
    Healthy,
    Stressed,
    Overloaded,
}

impl fmt::Display for TargetHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetHealth::Healthy => write!(f, "healthy"),
            TargetHealth::Stressed => write!(f, "stressed"),
            TargetHealth::Overloaded => write!(f, "overloaded"),
        }
    }
}

/// Outcome of the initial reconnaissance probe.
#[derive(Debug, Clone)]
pub struct ReconReport {
    pub can_proceed: bool,
    pub recommendations: Vec<String>,
}

/// Snapshot of the pacing parameters the caller should apply to its next
/// batch.
#[derive(Debug, Clone)]
pub struct ScanParams {
    pub payload_count: u32,
    pub delay_ms: u64,
    pub mode: ScanMode,
    pub target_health: TargetHealth,
    pub recommendations: Vec<String>,
}

#[derive(Debug)]
struct ReconObservation {
    latency_ms: u64,
    status: u16,
    server_banner: Option<String>,
    content_length: Option<u64>,
    rate_limited: bool,
    security_headers: usize,
}

/// Feedback controller that tunes probe volume and pacing to what the
/// target can absorb.
pub struct SmartScanManager {
    mode: ScanMode,
    policy: ScanPolicy,
    profile: TargetProfile,
    history: RequestHistory,
    payload_count: u32,
    delay_ms: u64,
    user_agent: String,
    probe_timeout: Option<Duration>,
}

impl SmartScanManager {
    /// Create a manager for `target` (assumed to be a valid HTTP(S) URL;
    /// validation is the caller's responsibility) in the given mode.
    pub fn new(target: impl Into<String>, mode: ScanMode) -> Self {
        let policy = mode.policy();
        SmartScanManager {
            mode,
            policy,
            profile: TargetProfile {
                identifier: target.into(),
                last_response_time_ms: None,
                last_status_code: None,
                server_banner: None,
                response_size_bytes: None,
                rolling_error_rate: 0.0,
            },
            history: RequestHistory::new(),
            payload_count: policy.initial_payload_count,
            delay_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            probe_timeout: None,
        }
    }

    /// Override the user agent sent on the recon probe.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Cap the recon probe round trip. The manager enforces no timeout of
    /// its own; without this, the probe waits as long as the runtime lets it.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn policy(&self) -> &ScanPolicy {
        &self.policy
    }

    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    /// One lightweight HEAD probe against the target, followed by a pass of
    /// posture heuristics over the response. This is the component's only
    /// direct network I/O. An unreachable target is reported through
    /// `can_proceed = false`, never raised.
    pub async fn perform_initial_recon(&mut self) -> ReconReport {
        let obs = match self.probe_target().await {
            Ok(obs) => obs,
            Err(err) => {
                warn!(target_url = %self.profile.identifier, error = %err, "initial recon probe failed");
                return ReconReport {
                    can_proceed: false,
                    recommendations: vec![
                        "target unreachable or blocking requests - aborting scan".to_string(),
                    ],
                };
            }
        };
        let recommendations = self.apply_recon_heuristics(&obs);
        info!(
            target_url = %self.profile.identifier,
            latency_ms = obs.latency_ms,
            status = obs.status,
            payload_count = self.payload_count,
            delay_ms = self.delay_ms,
            "initial recon complete"
        );
        ReconReport { can_proceed: true, recommendations }
    }

    async fn probe_target(&self) -> Result<ReconObservation, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(self.user_agent.clone());
        if let Some(timeout) = self.probe_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        let started = Instant::now();
        let resp = client.head(&self.profile.identifier).send().await?;
        let latency_ms = started.elapsed().as_millis() as u64;
        let headers = resp.headers();
        let server_banner = headers
            .get(reqwest::header::SERVER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let rate_limited = RATE_LIMIT_HEADERS.iter().any(|h| headers.contains_key(*h));
        let security_headers =
            SECURITY_HEADERS.iter().filter(|h| headers.contains_key(**h)).count();
        Ok(ReconObservation {
            latency_ms,
            status: resp.status().as_u16(),
            server_banner,
            content_length: resp.content_length(),
            rate_limited,
            security_headers,
        })
    }

    fn apply_recon_heuristics(&mut self, obs: &ReconObservation) -> Vec<String> {
        self.profile.last_response_time_ms = Some(obs.latency_ms);
        self.profile.last_status_code = Some(obs.status);
        self.profile.server_banner = obs.server_banner.clone();
        self.profile.response_size_bytes = obs.content_length;

        let mut notes = Vec::new();
        if obs.latency_ms > 5000 {
            self.payload_count = (self.payload_count / 2).max(self.policy.min_payload_count);
            self.delay_ms = 3000;
            notes.push("slow target, reducing payload count".to_string());
        } else if obs.latency_ms < 500 && self.mode == ScanMode::Adaptive {
            let scaled = (self.payload_count as f64 * 1.5) as u32;
            self.payload_count = scaled.min(self.policy.max_payload_count);
            notes.push("fast target, can handle more payloads".to_string());
        }
        if obs.rate_limited {
            self.delay_ms = 5000;
            self.payload_count = self.payload_count.min(5);
            warn!(target_url = %self.profile.identifier, "rate limiting headers present");
            notes.push("rate limiting detected".to_string());
        }
        if obs.security_headers >= 3 {
            self.delay_ms = self.delay_ms.max(2000);
            notes.push("strong security headers, using stealth approach".to_string());
        }
        if let Some(banner) = &self.profile.server_banner {
            let banner = banner.to_ascii_lowercase();
            if banner.contains("cloudflare") {
                self.delay_ms = self.delay_ms.max(1500);
                notes.push("cloudflare in front of target, pacing for challenge pages".to_string());
            }
            if banner.contains("nginx") {
                notes.push("nginx server detected".to_string());
            }
            if banner.contains("apache") {
                notes.push("apache server detected".to_string());
            }
        }
        notes
    }

    /// Record one observed probe outcome. Pure state mutation; in adaptive
    /// mode the payload-count and delay passes each run against their own
    /// thresholds once a full latency window has accumulated.
    pub fn record_response(&mut self, response_time_ms: u64, success: bool, status_code: Option<u16>) {
        self.history.push(RequestSample {
            recorded_at: OffsetDateTime::now_utc(),
            response_time_ms,
            success,
        });
        self.profile.last_response_time_ms = Some(response_time_ms);
        if let Some(code) = status_code {
            self.profile.last_status_code = Some(code);
        }
        self.profile.rolling_error_rate = self.history.error_rate(ERROR_WINDOW);

        if !self.policy.adaptive_adjustment || self.history.len() < LATENCY_WINDOW {
            return;
        }
        self.adjust_payload_count();
        self.adjust_delay();
    }

    fn adjust_payload_count(&mut self) {
        let Some(avg) = self.history.latency_avg_ms(LATENCY_WINDOW) else { return };
        let err = self.profile.rolling_error_rate;
        let threshold = self.policy.response_time_threshold_ms as f64;
        let before = self.payload_count;
        if avg > threshold || err > self.policy.error_rate_threshold {
            self.payload_count =
                ((self.payload_count as f64 * 0.8) as u32).max(self.policy.min_payload_count);
        } else if avg < 0.5 * threshold && err < 0.5 * self.policy.error_rate_threshold {
            self.payload_count =
                ((self.payload_count as f64 * 1.2) as u32).min(self.policy.max_payload_count);
        }
        if self.payload_count != before {
            debug!(
                from = before,
                to = self.payload_count,
                avg_latency_ms = avg,
                error_rate = err,
                "payload count adjusted"
            );
        }
    }

    fn adjust_delay(&mut self) {
        let Some(avg) = self.history.latency_avg_ms(LATENCY_WINDOW) else { return };
        let err = self.profile.rolling_error_rate;
        let threshold = self.policy.response_time_threshold_ms as f64;
        let before = self.delay_ms;
        if avg > threshold || err > self.policy.error_rate_threshold {
            self.delay_ms = ((self.delay_ms as f64 * 1.5) as u64).min(MAX_DELAY_MS);
        } else if avg < 0.3 * threshold && err < 0.05 {
            self.delay_ms = ((self.delay_ms as f64 * 0.8) as u64).max(MIN_DELAY_MS);
        }
        if self.delay_ms != before {
            debug!(
                from = before,
                to = self.delay_ms,
                avg_latency_ms = avg,
                error_rate = err,
                "inter-batch delay adjusted"
            );
        }
    }

    /// Health from the current windowed statistics; never cached.
    pub fn target_health(&self) -> TargetHealth {
        let err = self.history.error_rate(ERROR_WINDOW);
        let avg = self.history.latency_avg_ms(LATENCY_WINDOW).unwrap_or(0.0);
        let threshold = self.policy.response_time_threshold_ms as f64;
        if err > self.policy.error_rate_threshold || avg > threshold {
            TargetHealth::Overloaded
        } else if err > 0.5 * self.policy.error_rate_threshold || avg > 0.7 * threshold {
            TargetHealth::Stressed
        } else {
            TargetHealth::Healthy
        }
    }

    /// Gate consumed by the caller's loop before each batch; only aggressive
    /// mode keeps going against an overloaded target.
    pub fn should_continue_scan(&self) -> bool {
        match self.target_health() {
            TargetHealth::Healthy | TargetHealth::Stressed => true,
            TargetHealth::Overloaded => self.mode == ScanMode::Aggressive,
        }
    }

    /// Milliseconds the caller should sleep between request batches.
    pub fn adaptive_delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn current_scan_params(&self) -> ScanParams {
        let health = self.target_health();
        ScanParams {
            payload_count: self.payload_count,
            delay_ms: self.delay_ms,
            mode: self.mode,
            target_health: health,
            recommendations: health_advisories(health),
        }
    }
}

fn health_advisories(health: TargetHealth) -> Vec<String> {
    match health {
        TargetHealth::Healthy => vec!["target responding normally".to_string()],
        TargetHealth::Stressed => {
            vec!["target showing elevated latency or errors, throttling down".to_string()]
        }
        TargetHealth::Overloaded => vec!["target overloaded, pausing recommended".to_string()],
    }
}
