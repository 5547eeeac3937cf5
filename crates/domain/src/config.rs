use std::{env, str::FromStr, time::Duration};

/// Face-stability gating for biometric slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerConfig {
    pub tick_interval: Duration,
    /// Consecutive single-face ticks before a capture fires
    pub stability_threshold: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            stability_threshold: 15,
        }
    }
}

impl AnalyzerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_interval: Duration::from_millis(env_where(
                "ANALYZER_TICK_MS",
                defaults.tick_interval.as_millis() as u64,
                |ms| *ms > 0,
            )),
            stability_threshold: env_or(
                "ANALYZER_STABILITY_THRESHOLD",
                defaults.stability_threshold,
            )
            .max(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrollmentConfig {
    /// Biometric attachments the downstream verifier expects
    pub min_biometric_samples: usize,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self { min_biometric_samples: 3 }
    }
}

impl EnrollmentConfig {
    pub fn from_env() -> Self {
        Self {
            min_biometric_samples: env_or(
                "ENROLLMENT_MIN_BIOMETRIC",
                Self::default().min_biometric_samples,
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Pause between a successful add-item and the verifying re-read
    pub consistency_delay: Duration,
    pub require_enrollment: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            consistency_delay: Duration::from_millis(800),
            require_enrollment: false,
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            consistency_delay: Duration::from_millis(env_or(
                "WORKFLOW_CONSISTENCY_DELAY_MS",
                defaults.consistency_delay.as_millis() as u64,
            )),
            require_enrollment: env_or("WORKFLOW_REQUIRE_ENROLLMENT", defaults.require_enrollment),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_where(key, default, |_| true)
}

fn env_where<T: FromStr>(key: &str, default: T, valid: impl Fn(&T) -> bool) -> T {
    parse_setting(key, env::var(key).ok().as_deref(), default, valid)
}

/// Unset keeps the default; unparsable or rejected values warn and keep it.
fn parse_setting<T: FromStr>(
    key: &str,
    raw: Option<&str>,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            tracing::warn!("Ignoring invalid value for {}: {}", key, raw);
            default
        }
    }
}
