use serde::Deserialize;
use std::env;
use ryde_booking::BookingRules;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub paystack: PaystackConfig,
    pub business_rules: BusinessRules,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub cancellation_cutoff_hours: i64,
    pub payment_timeout_minutes: i64,
    pub conflict_window_hours: i64,
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String { "NGN".to_string() }

impl BusinessRules {
    pub fn to_rules(&self) -> BookingRules {
        BookingRules {
            cancellation_cutoff: chrono::Duration::hours(self.cancellation_cutoff_hours),
            payment_timeout: chrono::Duration::minutes(self.payment_timeout_minutes),
            conflict_window: chrono::Duration::hours(self.conflict_window_hours),
            currency: self.currency.clone(),
        }
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaystackConfig {
    /// Also the webhook signing key
    pub secret_key: String,
    #[serde(default = "default_paystack_url")]
    pub base_url: String,
    pub callback_url: String,
    pub success_redirect_url: String,
}

fn default_paystack_url() -> String { crate::paystack::DEFAULT_BASE_URL.to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests: i64,
    pub window_seconds: i64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `RYDE__PAYSTACK__SECRET_KEY=sk_live_...`
            .add_source(config::Environment::with_prefix("RYDE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    const SAMPLE: &str = r#"
        [server]
        port = 8080
        [database]
        url = "postgres://localhost/ryde"
        [redis]
        url = "redis://localhost"
        [kafka]
        brokers = "localhost:9092"
        enabled = true
        [auth]
        jwt_secret = "secret"
        [paystack]
        secret_key = "sk_test"
        callback_url = "http://localhost/payment/callback"
        success_redirect_url = "http://localhost/done"
        [business_rules]
        cancellation_cutoff_hours = 12
        payment_timeout_minutes = 15
        conflict_window_hours = 2
        sweep_interval_seconds = 30
        [rate_limit]
        requests = 10
        window_seconds = 60
    "#;

    #[test]
    fn test_defaults_and_rules() {
        let cfg: Config = config::Config::builder()
            .add_source(File::from_str(SAMPLE, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.database.max_connections, 5);
        assert!(!cfg.redis.enabled);
        assert!(cfg.kafka.enabled);
        assert_eq!(cfg.paystack.base_url, "https://api.paystack.co");

        let rules = cfg.business_rules.to_rules();
        assert_eq!(rules.payment_timeout, chrono::Duration::minutes(15));
        assert_eq!(rules.currency, "NGN");
        assert_eq!(cfg.business_rules.sweep_interval().as_secs(), 30);
    }
}
