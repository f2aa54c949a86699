//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::vtu::types::ServiceKind;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` runs on the in-memory stores.
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub gateways: GatewayConfig,
    pub vtu: VtuConfig,
    pub workers: WorkerConfig,
    pub admin: AdminConfig,
    /// Skip the database and outbound clients entirely (local development).
    pub skip_externals: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Secret and endpoint for one payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub secret_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct MonnifyConfig {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub contract_code: Option<String>,
    pub base_url: String,
}

/// Payment gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub paystack: GatewayCredentials,
    pub monnify: MonnifyConfig,
    pub payrant: GatewayCredentials,
    pub vtstack: GatewayCredentials,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Where Paystack sends the customer after card checkout.
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VtpassConfig {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct TokenProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

/// Flat fee added to each purchase, per service.
#[derive(Debug, Clone)]
pub struct ServiceFees {
    pub airtime: Decimal,
    pub data: Decimal,
    pub cable: Decimal,
    pub electricity: Decimal,
    pub exam_pin: Decimal,
}

impl ServiceFees {
    pub fn for_service(&self, service: ServiceKind) -> Decimal {
        match service {
            ServiceKind::Airtime => self.airtime,
            ServiceKind::Data => self.data,
            ServiceKind::Cable => self.cable,
            ServiceKind::Electricity => self.electricity,
            ServiceKind::ExamPin => self.exam_pin,
        }
    }
}

impl Default for ServiceFees {
    fn default() -> Self {
        Self {
            airtime: Decimal::ZERO,
            data: Decimal::ZERO,
            cable: Decimal::from(100),
            electricity: Decimal::from(100),
            exam_pin: Decimal::ZERO,
        }
    }
}

/// Upstream VTU provider configuration
#[derive(Debug, Clone)]
pub struct VtuConfig {
    pub default_provider: String,
    pub request_timeout: u64, // seconds
    pub vtpass: VtpassConfig,
    pub topupmate: TokenProviderConfig,
    pub smeplug: TokenProviderConfig,
    pub fees: ServiceFees,
}

/// Background worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub pending_reconciler_enabled: bool,
    pub pending_reconciler_interval: u64, // seconds
    /// Age a pending purchase must reach before it is re-queried.
    pub pending_grace_period: u64, // seconds
    pub pending_batch_size: i64,
}

/// Admin surface configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Bearer token for `/admin`; the routes refuse every request when unset.
    pub api_token: Option<String>,
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn url_var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn check_url(name: &str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be a valid URL",
            name
        )));
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let skip_externals = parse_var::<bool>("SKIP_EXTERNALS", "false")?;

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: if skip_externals {
                None
            } else {
                DatabaseConfig::from_env()?
            },
            logging: LoggingConfig::from_env()?,
            gateways: GatewayConfig::from_env()?,
            vtu: VtuConfig::from_env()?,
            workers: WorkerConfig::from_env()?,
            admin: AdminConfig::from_env(),
            skip_externals,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.gateways.validate()?;
        self.vtu.validate()?;
        self.workers.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// `Ok(None)` when `DATABASE_URL` is not set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(url) = optional_var("DATABASE_URL") else {
            return Ok(None);
        };

        Ok(Some(DatabaseConfig {
            url,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
            run_migrations: parse_var("DB_RUN_MIGRATIONS", "true")?,
        }))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            paystack: GatewayCredentials {
                secret_key: optional_var("PAYSTACK_SECRET_KEY"),
                base_url: url_var("PAYSTACK_BASE_URL", "https://api.paystack.co"),
            },
            monnify: MonnifyConfig {
                api_key: optional_var("MONNIFY_API_KEY"),
                secret_key: optional_var("MONNIFY_SECRET_KEY"),
                contract_code: optional_var("MONNIFY_CONTRACT_CODE"),
                base_url: url_var("MONNIFY_BASE_URL", "https://sandbox.monnify.com"),
            },
            payrant: GatewayCredentials {
                secret_key: optional_var("PAYRANT_SECRET_KEY"),
                base_url: url_var("PAYRANT_BASE_URL", "https://api-core.payrant.com"),
            },
            vtstack: GatewayCredentials {
                secret_key: optional_var("VTSTACK_SECRET_KEY"),
                base_url: url_var("VTSTACK_BASE_URL", "https://api.vtstack.com.ng"),
            },
            timeout_secs: parse_var("GATEWAY_TIMEOUT_SECS", "30")?,
            max_retries: parse_var("GATEWAY_MAX_RETRIES", "3")?,
            callback_url: optional_var("PAYSTACK_CALLBACK_URL"),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("PAYSTACK_BASE_URL", &self.paystack.base_url)?;
        check_url("MONNIFY_BASE_URL", &self.monnify.base_url)?;
        check_url("PAYRANT_BASE_URL", &self.payrant.base_url)?;
        check_url("VTSTACK_BASE_URL", &self.vtstack.base_url)?;

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("GATEWAY_TIMEOUT_SECS".to_string()));
        }

        Ok(())
    }
}

impl VtuConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ServiceFees::default();
        let fee = |name: &str, default: Decimal| -> Result<Decimal, ConfigError> {
            parse_var(name, &default.to_string())
        };

        Ok(VtuConfig {
            default_provider: env::var("VTU_DEFAULT_PROVIDER")
                .unwrap_or_else(|_| "vtpass".to_string()),
            request_timeout: parse_var("VTU_REQUEST_TIMEOUT", "45")?,
            vtpass: VtpassConfig {
                api_key: optional_var("VTPASS_API_KEY"),
                secret_key: optional_var("VTPASS_SECRET_KEY"),
                base_url: url_var("VTPASS_BASE_URL", "https://sandbox.vtpass.com"),
            },
            topupmate: TokenProviderConfig {
                api_key: optional_var("TOPUPMATE_API_KEY"),
                base_url: url_var("TOPUPMATE_BASE_URL", "https://connect.topupmate.com"),
            },
            smeplug: TokenProviderConfig {
                api_key: optional_var("SMEPLUG_API_KEY"),
                base_url: url_var("SMEPLUG_BASE_URL", "https://smeplug.ng"),
            },
            fees: ServiceFees {
                airtime: fee("FEE_AIRTIME", defaults.airtime)?,
                data: fee("FEE_DATA", defaults.data)?,
                cable: fee("FEE_CABLE", defaults.cable)?,
                electricity: fee("FEE_ELECTRICITY", defaults.electricity)?,
                exam_pin: fee("FEE_EXAM_PIN", defaults.exam_pin)?,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue("VTU_REQUEST_TIMEOUT".to_string()));
        }

        check_url("VTPASS_BASE_URL", &self.vtpass.base_url)?;
        check_url("TOPUPMATE_BASE_URL", &self.topupmate.base_url)?;
        check_url("SMEPLUG_BASE_URL", &self.smeplug.base_url)?;

        let fees = [
            self.fees.airtime,
            self.fees.data,
            self.fees.cable,
            self.fees.electricity,
            self.fees.exam_pin,
        ];
        if fees.iter().any(|f| f.is_sign_negative()) {
            return Err(ConfigError::ValidationFailed(
                "service fees cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WorkerConfig {
            pending_reconciler_enabled: parse_var("PENDING_RECONCILER_ENABLED", "true")?,
            pending_reconciler_interval: parse_var("PENDING_RECONCILER_INTERVAL_SECS", "120")?,
            pending_grace_period: parse_var("PENDING_GRACE_PERIOD_SECS", "300")?,
            pending_batch_size: parse_var("PENDING_BATCH_SIZE", "50")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pending_reconciler_interval == 0 {
            return Err(ConfigError::InvalidValue(
                "PENDING_RECONCILER_INTERVAL_SECS".to_string(),
            ));
        }
        if self.pending_batch_size <= 0 {
            return Err(ConfigError::InvalidValue("PENDING_BATCH_SIZE".to_string()));
        }
        Ok(())
    }
}

impl AdminConfig {
    pub fn from_env() -> Self {
        AdminConfig {
            api_token: optional_var("ADMIN_API_TOKEN"),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_connections_above_max_is_rejected() {
        let config = DatabaseConfig {
            url: "postgres://localhost/vtu".to_string(),
            max_connections: 2,
            min_connections: 5,
            connection_timeout: 30,
            idle_timeout: None,
            run_migrations: false,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fee_lookup_by_service() {
        let fees = ServiceFees::default();
        assert_eq!(fees.for_service(ServiceKind::Cable), Decimal::from(100));
        assert_eq!(fees.for_service(ServiceKind::Airtime), Decimal::ZERO);
    }

    #[test]
    fn test_invalid_log_level() {
        let config = LoggingConfig {
            level: "LOUD".to_string(),
            format: LogFormat::Plain,
        };
        assert!(config.validate().is_err());
    }
}
