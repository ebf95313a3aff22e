// 7.0 config.rs: all settings in one place. tick timing, wallet, liquidation, pricing, logging.
// 7.1 presets at the bottom. a file only needs the fields it changes, the rest fall back to defaults.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use crate::ledger::LedgerParams;
use crate::liquidation::LiquidationParams;
use crate::pricing::PricingParams;
use crate::types::{Leverage, Quote};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // how often market probabilities move
    pub tick_interval_ms: u64,
    // virtual grant for a new wallet
    pub starting_balance: Decimal,
    // credited per recharge
    pub recharge_amount: Decimal,
    // leverage choices offered to traders
    pub leverage_options: Vec<u32>,
    pub liquidation: LiquidationParams,
    pub pricing: PricingParams,
    pub logging: LoggingConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3000,
            starting_balance: dec!(10),
            recharge_amount: dec!(10),
            leverage_options: vec![1, 2, 3, 5, 10],
            liquidation: LiquidationParams::default(),
            pricing: PricingParams::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SimConfig {
    // slower drift, smaller crowd pressure
    pub fn calm() -> Self {
        let mut config = Self::default();
        config.pricing.max_step = dec!(0.5);
        config.pricing.bias_weight = dec!(0.1);
        config
    }

    // fast ticks, wide steps, up to 20x
    pub fn volatile() -> Self {
        let mut config = Self::default();
        config.tick_interval_ms = 1000;
        config.pricing.max_step = dec!(3);
        config.leverage_options = vec![1, 2, 3, 5, 10, 20];
        config
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTiming {
                reason: "tick interval must be positive".to_string(),
            });
        }

        if self.starting_balance < Decimal::ZERO || self.recharge_amount <= Decimal::ZERO {
            return Err(ConfigError::InvalidWallet {
                reason: "starting balance must be >= 0 and recharge amount > 0".to_string(),
            });
        }

        if self.leverage_options.is_empty() || self.leverage_options.contains(&0) {
            return Err(ConfigError::InvalidWallet {
                reason: "leverage options must be non-empty and all >= 1".to_string(),
            });
        }

        let liq = &self.liquidation;
        if liq.threshold <= Decimal::ZERO || liq.warning_threshold <= Decimal::ZERO {
            return Err(ConfigError::InvalidLiquidation {
                reason: "thresholds must be positive".to_string(),
            });
        }
        if liq.warning_threshold > liq.threshold {
            return Err(ConfigError::InvalidLiquidation {
                reason: "warning threshold must not exceed liquidation threshold".to_string(),
            });
        }

        let p = &self.pricing;
        if p.floor <= Decimal::ZERO || p.ceiling > dec!(100) || p.floor >= p.ceiling {
            return Err(ConfigError::InvalidPricing {
                reason: "need 0 < floor < ceiling <= 100".to_string(),
            });
        }
        if p.max_step < Decimal::ZERO || p.bias_factor < Decimal::ZERO || p.bias_weight < Decimal::ZERO {
            return Err(ConfigError::InvalidPricing {
                reason: "step and bias parameters must be non-negative".to_string(),
            });
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            starting_balance: Quote::new(self.starting_balance),
            recharge_amount: Quote::new(self.recharge_amount),
        }
    }

    pub fn allows_leverage(&self, leverage: Leverage) -> bool {
        self.leverage_options.contains(&leverage.get())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("cannot parse config: {0}")]
    Parse(String),

    #[error("invalid timing: {reason}")]
    InvalidTiming { reason: String },

    #[error("invalid wallet settings: {reason}")]
    InvalidWallet { reason: String },

    #[error("invalid liquidation settings: {reason}")]
    InvalidLiquidation { reason: String },

    #[error("invalid pricing settings: {reason}")]
    InvalidPricing { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Demo,
    Calm,
    Volatile,
}

impl Preset {
    pub fn config(&self) -> SimConfig {
        match self {
            Preset::Demo => SimConfig::default(),
            Preset::Calm => SimConfig::calm(),
            Preset::Volatile => SimConfig::volatile(),
        }
    }
}

// 7.2: logging. RUST_LOG wins over the configured level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    // "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        // a second init (tests, embedding) is harmless
        let result = match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).try_init(),
            _ => fmt().with_env_filter(filter).try_init(),
        };
        if result.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_secs(3));
        assert_eq!(config.liquidation.threshold, dec!(80));
        assert_eq!(config.pricing.bias_factor, dec!(0.65));
    }

    #[test]
    fn test_presets_valid() {
        assert!(Preset::Demo.config().validate().is_ok());
        assert!(Preset::Calm.config().validate().is_ok());
        assert!(Preset::Volatile.config().validate().is_ok());
        assert!(SimConfig::volatile().allows_leverage(Leverage::new(20).unwrap()));
        assert!(!SimConfig::default().allows_leverage(Leverage::new(20).unwrap()));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            tick_interval_ms = 500
            leverage_options = [1, 2]

            [liquidation]
            threshold = "90"
            warning_threshold = "70"
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_interval_ms, 500);
        assert_eq!(config.leverage_options, vec![1, 2]);
        assert_eq!(config.liquidation.threshold, dec!(90));
        assert_eq!(config.starting_balance, dec!(10));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_liquidation() {
        let mut config = SimConfig::default();
        config.liquidation.warning_threshold = dec!(95);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLiquidation { .. })));
    }

    #[test]
    fn test_invalid_pricing_bounds() {
        let mut config = SimConfig::default();
        config.pricing.floor = dec!(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPricing { .. })));
    }

    #[test]
    fn test_zero_leverage_rejected() {
        let mut config = SimConfig::default();
        config.leverage_options = vec![0, 2];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWallet { .. })));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            SimConfig::from_toml_str("tick_interval_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
