use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment. Destructive maintenance operations and the
/// development identity are only available in `Development`, which must be
/// chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Service-level configuration for collection operations.
///
/// Controls the environment gate on `clear` and how long a single hook
/// emission may take before the operation fails.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,
    /// Upper bound for one emission step (all listeners of one scope and
    /// phase). `None` waits indefinitely.
    pub listener_timeout: Option<Duration>,
}

impl ApiConfig {
    /// Whether `clear` may run in this environment.
    #[must_use]
    pub fn allow_clear(&self) -> bool {
        self.environment != Environment::Production
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            listener_timeout: Some(Duration::from_secs(30)),
        }
    }
}
