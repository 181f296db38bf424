//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables; no other code
//! reads the raw environment.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Deployment environment, gating dev-only behavior such as the
/// queue-signature bypass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(anyhow::anyhow!(
                "NODE_ENV must be one of development, production, test (got '{}')",
                other
            )),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL (PostgreSQL)
    pub database_url: String,

    /// Key/value store connection URL (counters, leases, idempotency)
    pub redis_url: String,

    /// Queue bus credentials and signing keys
    pub qstash_url: String,
    pub qstash_token: String,
    pub qstash_current_signing_key: String,
    pub qstash_next_signing_key: String,

    /// HMAC secret for bearer tokens; must be at least 32 characters
    pub auth_secret: String,

    /// Generator provider credentials
    pub openai_api_key: String,
    pub anthropic_api_key: String,

    /// Self URL embedded in the queue's delivery target
    pub app_url: String,

    /// Deployment environment
    pub environment: Environment,

    /// CORS allow-list
    pub allowed_origins: Vec<String>,

    /// Backend selection (dev convenience; production uses redis + qstash)
    pub limit_store: String,
    pub dispatcher: String,

    /// Runtime configuration
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("redis_url", &"[REDACTED]")
            .field("qstash_url", &self.qstash_url)
            .field("qstash_token", &"[REDACTED]")
            .field("qstash_current_signing_key", &"[REDACTED]")
            .field("qstash_next_signing_key", &"[REDACTED]")
            .field("auth_secret", &"[REDACTED]")
            .field("openai_api_key", &"[REDACTED]")
            .field("anthropic_api_key", &"[REDACTED]")
            .field("app_url", &self.app_url)
            .field("environment", &self.environment)
            .field("allowed_origins", &self.allowed_origins)
            .field("limit_store", &self.limit_store)
            .field("dispatcher", &self.dispatcher)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let environment = Environment::parse(
            &env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string()),
        )?;

        let auth_secret =
            env::var("AUTH_SECRET").map_err(|_| anyhow::anyhow!("AUTH_SECRET is required"))?;
        if auth_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "AUTH_SECRET must be at least 32 characters"
            ));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,

            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            qstash_url: env::var("QSTASH_URL")
                .unwrap_or_else(|_| "https://qstash.upstash.io".to_string()),
            qstash_token: env::var("QSTASH_TOKEN").unwrap_or_default(),
            qstash_current_signing_key: env::var("QSTASH_CURRENT_SIGNING_KEY")
                .unwrap_or_default(),
            qstash_next_signing_key: env::var("QSTASH_NEXT_SIGNING_KEY").unwrap_or_default(),

            auth_secret,

            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),

            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),

            environment,
            allowed_origins,

            limit_store: env::var("LIMIT_STORE").unwrap_or_else(|_| match environment {
                Environment::Production => "redis".to_string(),
                _ => "memory".to_string(),
            }),
            dispatcher: env::var("DISPATCHER").unwrap_or_else(|_| match environment {
                Environment::Production => "qstash".to_string(),
                _ => "local".to_string(),
            }),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
        };

        // Production refuses to run without bus credentials; a silent local
        // dispatcher in production would strand admissions.
        if config.environment == Environment::Production {
            if config.qstash_token.is_empty() {
                return Err(anyhow::anyhow!("QSTASH_TOKEN is required in production"));
            }
            if config.qstash_current_signing_key.is_empty() {
                return Err(anyhow::anyhow!(
                    "QSTASH_CURRENT_SIGNING_KEY is required in production"
                ));
            }
        }

        Ok(config)
    }
}
