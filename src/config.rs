use std::time::Duration;

use jsonwebtoken::Algorithm;

/// Development-only vault key. Refused when `CALLHUB_ENV=production`.
pub const PLACEHOLDER_MASTER_KEY: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";
pub const PLACEHOLDER_JWT_SECRET: &str = "CHANGE_ME_JWT_SECRET";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// 64 hex chars; see `vault::CredentialVault`.
    pub master_key: String,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    /// Frontend origin. The OAuth redirect is `{frontend_url}/oauth/callback`.
    pub frontend_url: String,
    /// Base URL the tool bridge calls back into. Defaults to this server.
    pub integrations_api_url: String,
    pub vendor_timeout: Duration,
    pub default_timezone: String,
    pub environment: String,
}

impl Config {
    /// Environment-free defaults with placeholder secrets.
    pub fn local() -> Self {
        Config {
            port: 8080,
            database_url: String::new(),
            master_key: PLACEHOLDER_MASTER_KEY.into(),
            jwt_secret: PLACEHOLDER_JWT_SECRET.into(),
            jwt_algorithm: Algorithm::HS256,
            frontend_url: "http://localhost:3000".into(),
            integrations_api_url: default_api_url(8080),
            vendor_timeout: Duration::from_secs(30),
            default_timezone: "Asia/Kolkata".into(),
            environment: "development".into(),
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/oauth/callback", self.frontend_url.trim_end_matches('/'))
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Bridge target for a server listening on `port`, unless configured explicitly.
    pub fn with_port(mut self, port: u16) -> Self {
        if std::env::var("CALLHUB_INTEGRATIONS_API_URL").is_err() {
            self.integrations_api_url = default_api_url(port);
        }
        self.port = port;
        self
    }
}

fn default_api_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api/v1", port)
}

fn parse_algorithm(raw: &str) -> anyhow::Result<Algorithm> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => anyhow::bail!("unsupported JWT_ALGORITHM '{}': use HS256, HS384 or HS512", other),
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let environment = std::env::var("CALLHUB_ENV").unwrap_or_default();
    let production = environment == "production";

    let master_key =
        std::env::var("CALLHUB_MASTER_KEY").unwrap_or_else(|_| PLACEHOLDER_MASTER_KEY.into());
    if master_key == PLACEHOLDER_MASTER_KEY {
        if production {
            anyhow::bail!(
                "CALLHUB_MASTER_KEY is still the insecure placeholder. \
                 Set a proper 64-char hex key before running in production."
            );
        }
        tracing::warn!("CALLHUB_MASTER_KEY is not set, using insecure placeholder");
    }

    let jwt_secret =
        std::env::var("JWT_SECRET_KEY").unwrap_or_else(|_| PLACEHOLDER_JWT_SECRET.into());
    if jwt_secret == PLACEHOLDER_JWT_SECRET {
        if production {
            anyhow::bail!("JWT_SECRET_KEY must be set in production");
        }
        tracing::warn!("JWT_SECRET_KEY is not set, using insecure placeholder");
    }

    let port = std::env::var("CALLHUB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    Ok(Config {
        port,
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/callhub".into()),
        master_key,
        jwt_secret,
        jwt_algorithm: parse_algorithm(
            &std::env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".into()),
        )?,
        frontend_url: std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
        integrations_api_url: std::env::var("CALLHUB_INTEGRATIONS_API_URL")
            .unwrap_or_else(|_| default_api_url(port)),
        vendor_timeout: Duration::from_secs(
            std::env::var("CALLHUB_VENDOR_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(30),
        ),
        default_timezone: std::env::var("CALLHUB_DEFAULT_TIMEZONE")
            .unwrap_or_else(|_| "Asia/Kolkata".into()),
        environment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("hs256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm("HS512").unwrap(), Algorithm::HS512);
        assert!(parse_algorithm("RS256").is_err());
    }

    #[test]
    fn test_placeholder_key_is_valid_hex() {
        assert!(crate::vault::CredentialVault::new(PLACEHOLDER_MASTER_KEY).is_ok());
    }
}
