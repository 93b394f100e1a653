use std::fmt;
use std::str::FromStr;

/// Scan posture selected at construction. Conservative and aggressive hold
/// their posture for the whole session; adaptive responds to live latency
/// and error-rate feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Conservative,
    Adaptive,
    Aggressive,
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Adaptive
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Conservative => write!(f, "conservative"),
            ScanMode::Adaptive => write!(f, "adaptive"),
            ScanMode::Aggressive => write!(f, "aggressive"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown scan mode: {0} (expected conservative, adaptive or aggressive)")]
pub struct ParseModeError(String);

impl FromStr for ScanMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(ScanMode::Conservative),
            "adaptive" => Ok(ScanMode::Adaptive),
            "aggressive" => Ok(ScanMode::Aggressive),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Per-mode volume bounds and stress thresholds, fixed once selected.
#[derive(Debug, Clone, Copy)]
pub struct ScanPolicy {
    pub initial_payload_count: u32,
    pub max_payload_count: u32,
    pub min_payload_count: u32,
    pub response_time_threshold_ms: u64,
    pub error_rate_threshold: f64,
    pub adaptive_adjustment: bool,
}

impl ScanMode {
    pub const fn policy(self) -> ScanPolicy {
        match self {
            ScanMode::Conservative => ScanPolicy {
                initial_payload_count: 3,
                max_payload_count: 10,
                min_payload_count: 1,
                response_time_threshold_ms: 2000,
                error_rate_threshold: 0.10,
                adaptive_adjustment: false,
            },
            ScanMode::Adaptive => ScanPolicy {
                initial_payload_count: 10,
                max_payload_count: 50,
                min_payload_count: 3,
                response_time_threshold_ms: 3000,
                error_rate_threshold: 0.15,
                adaptive_adjustment: true,
            },
            ScanMode::Aggressive => ScanPolicy {
                initial_payload_count: 25,
                max_payload_count: 100,
                min_payload_count: 10,
                response_time_threshold_ms: 5000,
                error_rate_threshold: 0.25,
                adaptive_adjustment: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitive() {
        assert_eq!("adaptive".parse::<ScanMode>().unwrap(), ScanMode::Adaptive);
        assert_eq!("Conservative".parse::<ScanMode>().unwrap(), ScanMode::Conservative);
        assert!("stealth".parse::<ScanMode>().is_err());
    }

    #[test]
    fn only_adaptive_adjusts() {
        assert!(ScanMode::Adaptive.policy().adaptive_adjustment);
        assert!(!ScanMode::Conservative.policy().adaptive_adjustment);
        assert!(!ScanMode::Aggressive.policy().adaptive_adjustment);
    }

    #[test]
    fn bounds_are_ordered() {
        for mode in [ScanMode::Conservative, ScanMode::Adaptive, ScanMode::Aggressive] {
            let p = mode.policy();
            assert!(p.min_payload_count <= p.initial_payload_count);
            assert!(p.initial_payload_count <= p.max_payload_count);
        }
    }
}
