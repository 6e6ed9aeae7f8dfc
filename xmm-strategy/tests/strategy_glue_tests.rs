//! Strategy wiring smoke tests against unreachable venues: readiness
//! gating, the stop-trading path and idempotent shutdown all have to
//! behave with every connection refused.

use std::time::{Duration, Instant};

use xmm_core::config::Config;
use xmm_strategy::Strategy;

fn offline_config() -> Config {
    // Everything points at closed local ports so sends fail fast
    Config::from_yaml(
        r#"
trading_control:
  live_trading_enabled: false
  strategy_ready_timeout_seconds: 1
markets:
  quote:
    name: quotex_perp_doge_usdt
    tick_sizes: { price: 0.00001, quantity: 1.0 }
    number_of_orders_to_track: 10
    exchange_keys: { api_key: k, api_secret: s }
    endpoints:
      market_data_ws: ws://127.0.0.1:1/md
      order_ws: ws://127.0.0.1:1/trade
      rest: http://127.0.0.1:1
  hedge:
    name: hedgex_perp_doge_usdt
    tick_sizes: { price: 0.00001, quantity: 0.1 }
    number_of_orders_to_track: 10
    exchange_keys: { api_key: k, api_secret: s, api_passphrase: p }
    endpoints:
      market_data_ws: ws://127.0.0.1:1/md
      order_ws: ws://127.0.0.1:1/trade
      rest: http://127.0.0.1:1
exchange_stability:
  ws_reconnection_retry_limit: 1
  websocket_heartbeat_ms: 10000
quote_position: { max_position: 1000.0, base_position: 0.0 }
hedge_position: { max_position: 1000.0, base_position: 0.0 }
quote_recon:
  retry_interval_on_failure_ms: 50
  normal_recon_interval_ms: 50
  retry_interval_on_mismatch_ms: 50
hedge_recon:
  retry_interval_on_failure_ms: 50
  normal_recon_interval_ms: 50
  retry_interval_on_mismatch_ms: 50
quoting_reference_price:
  source: refx_perp_doge_usdt
  ws_uri: ws://127.0.0.1:1/md
quoting:
  ask_orders:
    - { offset: 0.0001, size: 100.0 }
  bid_orders:
    - { offset: 0.0001, size: 100.0 }
  price_round_mode: away
  size_round_mode: floor
  offset_base: mid
  enable_touch_price: true
  ticks_from_touch: 1.0
hedging:
  min_hedge_size: 10.0
  stale_threshold_ns: 5000000000
  max_spread: 0.001
"#,
    )
    .unwrap()
}

#[test]
fn test_offline_strategy_is_not_ready() {
    let strategy = Strategy::new(offline_config()).unwrap();
    // No market data, no position warmup: readiness must gate trading
    assert!(!strategy.is_trading_ready());
    assert!(!strategy.wait_until_ready(Duration::from_millis(300)));
    strategy.shutdown();
}

#[test]
fn test_stop_trading_event_raises_halt() {
    let strategy = Strategy::new(offline_config()).unwrap();
    strategy.start_trading();

    strategy.request_stop("test_stop");

    let deadline = Instant::now() + Duration::from_secs(10);
    while !strategy.is_halted() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(strategy.is_halted());
    strategy.shutdown();
}

#[test]
fn test_shutdown_is_idempotent_and_prompt() {
    let strategy = Strategy::new(offline_config()).unwrap();
    let begun = Instant::now();
    strategy.shutdown();
    strategy.shutdown();
    assert!(begun.elapsed() < Duration::from_secs(10));
}
