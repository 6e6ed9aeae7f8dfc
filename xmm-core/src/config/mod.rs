//! Strategy configuration
//!
//! The strategy config is one YAML document; the binary is pointed at
//! it through a small JSON launcher file. Secrets are carried in the
//! config but redacted from any logged rendering.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{parse_price_round_mode, parse_size_round_mode, PriceRoundMode, SizeRoundMode};

/// Launcher file handed to the binary: where the YAML lives and where
/// logs go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub strategy_config_path: PathBuf,
    pub strategy_log_dir: PathBuf,
}

impl LauncherConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read launcher file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("could not parse launcher file {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub trading_control: TradingControl,
    pub markets: Markets,
    pub exchange_stability: ExchangeStability,
    pub quote_position: PositionLimits,
    pub hedge_position: PositionLimits,
    pub quote_recon: ReconIntervals,
    pub hedge_recon: ReconIntervals,
    pub quoting_reference_price: ReferencePrice,
    pub quoting: Quoting,
    pub hedging: Hedging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingControl {
    pub live_trading_enabled: bool,
    pub strategy_ready_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Markets {
    pub quote: MarketConfig,
    pub hedge: MarketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Instrument name, `exchange_market_base_quote`.
    pub name: String,
    pub tick_sizes: TickSizes,
    pub number_of_orders_to_track: usize,
    /// Contracts-to-base-units factor for venue-reported sizes.
    #[serde(default = "default_contract_multiplier")]
    pub contract_multiplier: f64,
    pub exchange_keys: ExchangeKeys,
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSizes {
    pub price: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeKeys {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub api_passphrase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    pub market_data_ws: String,
    pub order_ws: String,
    pub rest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeStability {
    #[serde(default = "default_retry_limit")]
    pub ws_reconnection_retry_limit: u32,
    #[serde(default = "default_heartbeat_ms")]
    pub websocket_heartbeat_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLimits {
    #[serde(default)]
    pub max_position: f64,
    #[serde(default)]
    pub base_position: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconIntervals {
    #[serde(default = "default_tolerable_threshold")]
    pub tolerable_threshold: f64,
    #[serde(default = "default_max_mismatch_cnt")]
    pub max_mismatch_cnt: u32,
    #[serde(default = "default_max_failure_query_cnt")]
    pub max_failure_query_cnt: u32,
    #[serde(default = "default_retry_on_failure_ms")]
    pub retry_interval_on_failure_ms: u64,
    #[serde(default = "default_normal_recon_ms")]
    pub normal_recon_interval_ms: u64,
    #[serde(default = "default_retry_on_mismatch_ms")]
    pub retry_interval_on_mismatch_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePrice {
    /// Instrument id on the reference venue.
    pub source: String,
    pub ws_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderRung {
    /// Fractional distance from the offset base.
    pub offset: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteMidShift {
    #[serde(default)]
    pub use_const_shift: bool,
    #[serde(default)]
    pub const_shift_ratio: f64,
    #[serde(default)]
    pub use_position_shift: bool,
    #[serde(default)]
    pub shift_ratio_per_position: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quoting {
    pub ask_orders: Vec<LadderRung>,
    pub bid_orders: Vec<LadderRung>,
    pub price_round_mode: String,
    pub size_round_mode: String,
    /// `mid` or `touch`.
    pub offset_base: String,
    #[serde(default)]
    pub enable_touch_price: bool,
    #[serde(default)]
    pub ticks_from_touch: f64,
    #[serde(default)]
    pub enable_postable_price: bool,
    #[serde(default)]
    pub ticks_from_postable: f64,
    #[serde(default)]
    pub quote_mid: QuoteMidShift,
    #[serde(default = "default_order_health_min_distance")]
    pub order_health_min_distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hedging {
    pub min_hedge_size: f64,
    pub stale_threshold_ns: u64,
    pub max_spread: f64,
}

impl Default for QuoteMidShift {
    fn default() -> Self {
        Self {
            use_const_shift: false,
            const_shift_ratio: 0.0,
            use_position_shift: false,
            shift_ratio_per_position: 0.0,
        }
    }
}

fn default_contract_multiplier() -> f64 {
    1.0
}
fn default_retry_limit() -> u32 {
    10
}
fn default_heartbeat_ms() -> u64 {
    10_000
}
fn default_tolerable_threshold() -> f64 {
    1.0
}
fn default_max_mismatch_cnt() -> u32 {
    3
}
fn default_max_failure_query_cnt() -> u32 {
    5
}
fn default_retry_on_failure_ms() -> u64 {
    2_000
}
fn default_normal_recon_ms() -> u64 {
    5_000
}
fn default_retry_on_mismatch_ms() -> u64 {
    3_000
}
fn default_order_health_min_distance() -> f64 {
    0.0
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(raw).context("could not parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (label, market) in [("quote", &self.markets.quote), ("hedge", &self.markets.hedge)] {
            if market.name.is_empty() {
                bail!("markets.{label}.name must not be empty");
            }
            if market.tick_sizes.price <= 0.0 || market.tick_sizes.quantity <= 0.0 {
                bail!("markets.{label}.tick_sizes must be positive");
            }
            if market.number_of_orders_to_track == 0 {
                bail!("markets.{label}.number_of_orders_to_track must be positive");
            }
            if market.contract_multiplier <= 0.0 {
                bail!("markets.{label}.contract_multiplier must be positive");
            }
        }
        for (label, recon) in [("quote", &self.quote_recon), ("hedge", &self.hedge_recon)] {
            if recon.normal_recon_interval_ms == 0
                || recon.retry_interval_on_failure_ms == 0
                || recon.retry_interval_on_mismatch_ms == 0
            {
                bail!("{label}_recon intervals must be positive");
            }
            if recon.max_mismatch_cnt == 0 || recon.max_failure_query_cnt == 0 {
                bail!("{label}_recon counters must be positive");
            }
        }
        for rung in self.quoting.ask_orders.iter().chain(&self.quoting.bid_orders) {
            if rung.offset <= 0.0 {
                bail!("quoting offsets must be positive");
            }
            if rung.size <= 0.0 {
                bail!("quoting sizes must be positive");
            }
        }
        self.price_round_mode()?;
        self.size_round_mode()?;
        if self.quoting.offset_base != "mid" && self.quoting.offset_base != "touch" {
            bail!(
                "quoting.offset_base must be 'mid' or 'touch', got '{}'",
                self.quoting.offset_base
            );
        }
        if self.quoting.quote_mid.use_position_shift
            && self.quoting.quote_mid.shift_ratio_per_position < 0.0
        {
            bail!("quoting.quote_mid.shift_ratio_per_position must be non-negative");
        }
        if self.hedging.min_hedge_size <= 0.0 {
            bail!("hedging.min_hedge_size must be positive");
        }
        Ok(())
    }

    pub fn price_round_mode(&self) -> Result<PriceRoundMode> {
        parse_price_round_mode(&self.quoting.price_round_mode)
    }

    pub fn size_round_mode(&self) -> Result<SizeRoundMode> {
        parse_size_round_mode(&self.quoting.size_round_mode)
    }

    /// YAML rendering with key material redacted, safe to log.
    pub fn sanitized_yaml(&self) -> String {
        let mut copy = self.clone();
        for market in [&mut copy.markets.quote, &mut copy.markets.hedge] {
            market.exchange_keys.api_key = "<redacted>".into();
            market.exchange_keys.api_secret = "<redacted>".into();
            if !market.exchange_keys.api_passphrase.is_empty() {
                market.exchange_keys.api_passphrase = "<redacted>".into();
            }
        }
        serde_yaml::to_string(&copy).unwrap_or_else(|_| String::from("<unserializable>"))
    }
}

#[cfg(test)]
pub fn example_yaml() -> &'static str {
    r#"
trading_control:
  live_trading_enabled: false
  strategy_ready_timeout_seconds: 30
markets:
  quote:
    name: quotex_perp_doge_usdt
    tick_sizes: { price: 0.00001, quantity: 1.0 }
    number_of_orders_to_track: 100
    exchange_keys: { api_key: qk, api_secret: qs }
    endpoints:
      market_data_ws: wss://quotex.example/md
      order_ws: wss://quotex.example/trade
      rest: https://quotex.example
  hedge:
    name: hedgex_perp_doge_usdt
    tick_sizes: { price: 0.00001, quantity: 0.1 }
    number_of_orders_to_track: 100
    contract_multiplier: 1000.0
    exchange_keys: { api_key: hk, api_secret: hs, api_passphrase: hp }
    endpoints:
      market_data_ws: wss://hedgex.example/md
      order_ws: wss://hedgex.example/trade
      rest: https://hedgex.example
exchange_stability:
  ws_reconnection_retry_limit: 3
  websocket_heartbeat_ms: 10000
quote_position: { max_position: 50000.0, base_position: 0.0 }
hedge_position: { max_position: 50000.0, base_position: 0.0 }
quote_recon:
  tolerable_threshold: 0.5
  max_mismatch_cnt: 3
  max_failure_query_cnt: 5
  retry_interval_on_failure_ms: 2000
  normal_recon_interval_ms: 5000
  retry_interval_on_mismatch_ms: 3000
hedge_recon:
  tolerable_threshold: 0.5
  max_mismatch_cnt: 3
  max_failure_query_cnt: 5
  retry_interval_on_failure_ms: 2000
  normal_recon_interval_ms: 5000
  retry_interval_on_mismatch_ms: 3000
quoting_reference_price:
  source: refx_perp_doge_usdt
  ws_uri: wss://refx.example/md
quoting:
  ask_orders:
    - { offset: 0.0001, size: 100.0 }
    - { offset: 0.0002, size: 100.0 }
  bid_orders:
    - { offset: 0.0001, size: 100.0 }
    - { offset: 0.0002, size: 100.0 }
  price_round_mode: away
  size_round_mode: floor
  offset_base: mid
  enable_touch_price: true
  ticks_from_touch: 1.0
  enable_postable_price: false
  ticks_from_postable: 0.0
  quote_mid:
    use_const_shift: false
    const_shift_ratio: 0.0
    use_position_shift: true
    shift_ratio_per_position: 0.0000001
  order_health_min_distance: 0.0001
hedging:
  min_hedge_size: 10.0
  stale_threshold_ns: 5000000000
  max_spread: 0.001
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example_config() {
        let config = Config::from_yaml(example_yaml()).unwrap();
        assert!(!config.trading_control.live_trading_enabled);
        assert_eq!(config.markets.quote.name, "quotex_perp_doge_usdt");
        assert_eq!(config.markets.hedge.contract_multiplier, 1000.0);
        assert_eq!(config.markets.quote.contract_multiplier, 1.0);
        assert_eq!(config.exchange_stability.ws_reconnection_retry_limit, 3);
        assert_eq!(config.quoting.ask_orders.len(), 2);
        assert_eq!(config.price_round_mode().unwrap(), PriceRoundMode::Away);
        assert_eq!(config.size_round_mode().unwrap(), SizeRoundMode::Floor);
    }

    #[test]
    fn test_defaults_fill_in() {
        let trimmed = example_yaml().replace("  websocket_heartbeat_ms: 10000\n", "");
        let config = Config::from_yaml(&trimmed).unwrap();
        assert_eq!(config.exchange_stability.websocket_heartbeat_ms, 10_000);
    }

    #[test]
    fn test_validation_rejects_bad_tick_size() {
        let bad = example_yaml().replace(
            "tick_sizes: { price: 0.00001, quantity: 1.0 }",
            "tick_sizes: { price: 0.0, quantity: 1.0 }",
        );
        assert!(Config::from_yaml(&bad).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_round_mode() {
        let bad = example_yaml().replace("price_round_mode: away", "price_round_mode: sideways");
        assert!(Config::from_yaml(&bad).is_err());
    }

    #[test]
    fn test_validation_rejects_negative_offset() {
        let bad = example_yaml().replace(
            "- { offset: 0.0001, size: 100.0 }",
            "- { offset: -0.0001, size: 100.0 }",
        );
        assert!(Config::from_yaml(&bad).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_offset_base() {
        let bad = example_yaml().replace("offset_base: mid", "offset_base: middle");
        assert!(Config::from_yaml(&bad).is_err());
    }

    #[test]
    fn test_sanitized_yaml_redacts_secrets() {
        let config = Config::from_yaml(example_yaml()).unwrap();
        let sanitized = config.sanitized_yaml();
        assert!(!sanitized.contains("qs"));
        assert!(!sanitized.contains("hp"));
        assert!(sanitized.contains("<redacted>"));
        // Non-secret content survives
        assert!(sanitized.contains("quotex_perp_doge_usdt"));
    }

    #[test]
    fn test_launcher_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launch.json");
        std::fs::write(
            &path,
            r#"{"strategy_config_path":"/etc/xmm/config.yaml","strategy_log_dir":"/var/log/xmm"}"#,
        )
        .unwrap();
        let launcher = LauncherConfig::from_file(&path).unwrap();
        assert_eq!(
            launcher.strategy_config_path,
            PathBuf::from("/etc/xmm/config.yaml")
        );
        assert_eq!(launcher.strategy_log_dir, PathBuf::from("/var/log/xmm"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file(Path::new("/nonexistent/config.yaml")).is_err());
        assert!(LauncherConfig::from_file(Path::new("/nonexistent/launch.json")).is_err());
    }
}
