use std::net::SocketAddr;

/// Runtime configuration, collected once at startup from the environment
/// (`.env` files are honored via dotenv).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Shared secret for the legacy header/query credential scheme.
    /// When unset, every protected request fails with 500 rather than
    /// silently letting traffic through.
    pub chat_access_key: Option<String>,
    /// HMAC key for bearer-token validation. When unset, the bearer
    /// authenticator abstains and callers fall back to the shared secret.
    pub jwt_secret: Option<String>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = dotenv::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()?;

        Ok(Self {
            database_url: dotenv::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://ipd-chat.db?mode=rwc".to_string()),
            bind_addr,
            chat_access_key: dotenv::var("CHAT_ACCESS_KEY").ok(),
            jwt_secret: dotenv::var("JWT_SECRET").ok(),
            jwt_issuer: dotenv::var("JWT_ISSUER")
                .unwrap_or_else(|_| "ipd-portal".to_string()),
            jwt_audience: dotenv::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "ipd-portal-clients".to_string()),
        })
    }
}
