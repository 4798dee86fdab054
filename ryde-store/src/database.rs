use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};
use serde_json::Value;
use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Rules stored in the `business_rules` table win over the configured ones.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            apply_override(&mut rules, &key, &value);
        }
        Ok(rules)
    }
}

/// Expected format: `{"value": <number|string>}`
fn apply_override(rules: &mut BusinessRules, key: &str, raw: &Value) {
    let Some(v) = raw.get("value") else {
        warn!(rule = key, "Business rule override without a value, ignoring");
        return;
    };
    match key {
        "cancellation_cutoff_hours" => {
            if let Some(n) = v.as_i64() {
                rules.cancellation_cutoff_hours = n;
            }
        }
        "payment_timeout_minutes" => {
            if let Some(n) = v.as_i64() {
                rules.payment_timeout_minutes = n;
            }
        }
        "conflict_window_hours" => {
            if let Some(n) = v.as_i64() {
                rules.conflict_window_hours = n;
            }
        }
        "sweep_interval_seconds" => {
            if let Some(n) = v.as_u64() {
                rules.sweep_interval_seconds = n;
            }
        }
        "currency" => {
            if let Some(s) = v.as_str() {
                rules.currency = s.to_string();
            }
        }
        other => warn!(rule = other, "Unknown business rule override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overrides() {
        let mut rules = BusinessRules {
            cancellation_cutoff_hours: 12,
            payment_timeout_minutes: 30,
            conflict_window_hours: 2,
            sweep_interval_seconds: 60,
            currency: "NGN".into(),
        };

        apply_override(&mut rules, "payment_timeout_minutes", &json!({"value": 15}));
        apply_override(&mut rules, "cancellation_cutoff_hours", &json!({"value": "six"}));
        apply_override(&mut rules, "conflict_window_hours", &json!(3));

        assert_eq!(rules.payment_timeout_minutes, 15);
        assert_eq!(rules.cancellation_cutoff_hours, 12);
        assert_eq!(rules.conflict_window_hours, 2);
    }
}
