use std::{env, time::Duration};

use domain::ports::AuthProvider;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("BOOKING_API_URL").unwrap_or(DEFAULT_BASE_URL.to_string());
        let token = env::var("BOOKING_API_TOKEN").ok().filter(|t| !t.trim().is_empty());
        Self { base_url, token, ..Self::default() }
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }
}

/// Bearer token fixed at startup.
#[derive(Clone, Debug, Default)]
pub struct StaticToken(pub Option<String>);

impl AuthProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}
