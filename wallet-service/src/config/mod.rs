use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageBackend,
    pub mongodb: Option<MongoConfig>,
    pub jwt: JwtConfig,
    pub paystack: PaystackConfig,
    pub wallet: WalletSettings,
    pub api_keys: ApiKeyConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    /// Non-secret prefix on every API key minted in this environment.
    pub fn api_key_prefix(&self) -> &'static str {
        match self {
            Environment::Prod => "sk_live_",
            Environment::Dev => "sk_test_",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 secret shared with the identity service.
    pub secret: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    /// API secret key. Also the webhook signing secret.
    pub secret_key: Secret<String>,
    pub base_url: String,
    pub callback_url: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct WalletSettings {
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct ApiKeyConfig {
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
}

impl WalletConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let environment: Environment = get_env("ENVIRONMENT", Some("dev"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let storage: StorageBackend = get_env("STORAGE_BACKEND", Some("mongo"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let mongodb = match storage {
            StorageBackend::Mongo => Some(MongoConfig {
                uri: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                database: get_env("MONGODB_DATABASE", Some("wallet_db"), is_prod)?,
            }),
            StorageBackend::Memory => None,
        };

        let config = WalletConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("wallet-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            storage,
            mongodb,
            jwt: JwtConfig {
                secret: Secret::new(get_env("JWT_SECRET", None, is_prod)?),
            },
            paystack: PaystackConfig {
                secret_key: Secret::new(get_env("PAYSTACK_SECRET_KEY", None, is_prod)?),
                base_url: get_env("PAYSTACK_BASE_URL", Some("https://api.paystack.co"), false)?
                    .trim_end_matches('/')
                    .to_string(),
                callback_url: env::var("PAYSTACK_CALLBACK_URL")
                    .ok()
                    .filter(|s| !s.is_empty()),
                timeout_seconds: parse_env("PAYSTACK_TIMEOUT_SECONDS", "10")?,
            },
            wallet: WalletSettings {
                currency: get_env("WALLET_CURRENCY", Some("NGN"), false)?,
            },
            api_keys: ApiKeyConfig {
                hash_memory_kib: parse_env("API_KEY_HASH_MEMORY_KIB", "19456")?,
                hash_iterations: parse_env("API_KEY_HASH_ITERATIONS", "2")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.paystack.timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PAYSTACK_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.environment == Environment::Prod && self.storage == StorageBackend::Memory {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "In-memory storage is not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, required_in_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if required_in_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}
