use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Whether to set the `Secure` flag on cookies.
    /// If `None`, the application may infer this from `frontend_url` (e.g. `https` -> true).
    /// Read from env var `COOKIE_SECURE` (accepted values: "true"/"false", "1"/"0", "yes"/"no").
    pub cookie_secure: Option<bool>,
    /// Preferred SameSite value for cookies. Read from env var `COOKIE_SAMESITE`
    /// (accepted values: "Lax", "Strict", "None").
    pub cookie_same_site: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Shared committee password ("intranet password"). There are no per-user accounts.
    pub intranet_password: String,
    /// Server-side secret mixed into the session token hash.
    pub session_secret: String,
    /// Allow-list of committee member display names accepted at login.
    pub members: Vec<String>,
    /// Lifetime of both session cookies, in days.
    pub cookie_max_age_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the login endpoint
    pub login_per_second: u32,
    /// Burst size for the login endpoint
    pub login_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                cookie_secure: match env::var("COOKIE_SECURE") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "1" | "true" | "yes" => Some(true),
                        "0" | "false" | "no" => Some(false),
                        _ => None,
                    },
                    Err(_) => None,
                },
                cookie_same_site: env::var("COOKIE_SAMESITE").ok(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/fiestas.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            session: SessionConfig {
                intranet_password: env::var("INTRANET_PASS")
                    .map_err(|_| ConfigError::MissingEnv("INTRANET_PASS".to_string()))?,
                session_secret: env::var("SESSION_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("SESSION_SECRET".to_string()))?,
                members: env::var("COMMISSION_MEMBERS")
                    .map(|v| {
                        v.split(',')
                            .map(|m| m.trim().to_string())
                            .filter(|m| !m.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                cookie_max_age_days: env::var("SESSION_COOKIE_DAYS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            rate_limit: RateLimitConfig {
                login_per_second: env::var("RATE_LIMIT_LOGIN_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                login_burst: env::var("RATE_LIMIT_LOGIN_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
                cookie_secure: None,
                cookie_same_site: None,
            },
            database: DatabaseConfig {
                url: "sqlite://data/fiestas.db".to_string(),
                max_connections: 5,
            },
            session: SessionConfig {
                intranet_password: "fiestas2025".to_string(),
                session_secret: "dev-secret".to_string(),
                members: vec![
                    "Alba".to_string(),
                    "Carles".to_string(),
                    "Maria".to_string(),
                    "Pau".to_string(),
                ],
                cookie_max_age_days: 30,
            },
            rate_limit: RateLimitConfig {
                login_per_second: 3,
                login_burst: 10,
            },
        }
    }
}
