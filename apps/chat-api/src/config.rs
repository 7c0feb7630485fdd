/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Symmetric secret used to derive the message content key.
    pub secret_key: String,
    /// HS256 secret for access tokens. When unset, socket identities are
    /// accepted as asserted by the client.
    pub jwt_secret: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Allowed CORS origin. `None` allows any origin.
    pub cors_origin: Option<String>,
    /// FCM server key. Push notifications are only logged when unset.
    pub fcm_server_key: Option<String>,
    /// FCM send endpoint.
    pub fcm_endpoint: String,
    /// Seconds of client silence before a socket is closed.
    pub heartbeat_timeout_secs: u64,
}

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 60;

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            secret_key: required_var("SECRET_KEY"),
            jwt_secret: optional_var("JWT_SECRET"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            cors_origin: optional_var("CORS_ORIGIN"),
            fcm_server_key: optional_var("FCM_SERVER_KEY"),
            fcm_endpoint: optional_var("FCM_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_FCM_ENDPOINT.to_string()),
            heartbeat_timeout_secs: heartbeat_timeout(
                std::env::var("HEARTBEAT_TIMEOUT_SECS").ok().as_deref(),
            ),
        }
    }
}

/// Parse the liveness timeout. Missing, unparsable, or zero values fall back
/// to 60 seconds.
fn heartbeat_timeout(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT_SECS)
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_timeout_defaults_when_unset_or_invalid() {
        assert_eq!(heartbeat_timeout(None), 60);
        assert_eq!(heartbeat_timeout(Some("soon")), 60);
        assert_eq!(heartbeat_timeout(Some("-5")), 60);
    }

    #[test]
    fn heartbeat_timeout_rejects_zero() {
        assert_eq!(heartbeat_timeout(Some("0")), 60);
    }

    #[test]
    fn heartbeat_timeout_accepts_positive_values() {
        assert_eq!(heartbeat_timeout(Some("15")), 15);
        assert_eq!(heartbeat_timeout(Some(" 90 ")), 90);
    }
}
