use serde::Deserialize;
use std::env;
use tally_order::EngineSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BusinessRules {
    /// Days after which a Speed Post order is taken as delivered
    #[serde(default = "default_auto_delivery_days")]
    pub auto_delivery_days: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_true")]
    pub sweep_on_list: bool,
}

fn default_auto_delivery_days() -> i64 { 3 }
fn default_sweep_interval() -> u64 { 300 }
fn default_true() -> bool { true }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            auto_delivery_days: default_auto_delivery_days(),
            sweep_interval_seconds: default_sweep_interval(),
            sweep_on_list: true,
        }
    }
}

impl BusinessRules {
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl From<&BusinessRules> for EngineSettings {
    fn from(rules: &BusinessRules) -> Self {
        EngineSettings {
            auto_delivery_after: chrono::Duration::days(rules.auto_delivery_days.max(0)),
            sweep_on_list: rules.sweep_on_list,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `TALLY_DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
