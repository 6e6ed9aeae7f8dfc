//! xmm - cross-exchange market maker
//!
//! One positional argument: the JSON launcher file naming the strategy
//! YAML and the log directory. SIGINT and SIGTERM request a graceful
//! shutdown; a terminal condition raised by the strategy itself (failed
//! recon, intolerable position gap, dead websocket) does the same.
//!
//! Exit codes: 0 clean shutdown, 1 argument error, 2 configuration
//! error, 3 unexpected error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use xmm_core::config::{Config, LauncherConfig};
use xmm_core::utils::init_logger;
use xmm_strategy::Strategy;

#[derive(Debug, Parser)]
#[command(name = "xmm", about = "cross-exchange market maker")]
struct Args {
    /// Path to the JSON launcher file with `strategy_config_path` and
    /// `strategy_log_dir`.
    launcher: PathBuf,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    let config = match load_configuration(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            error!(action = "load_configuration", result = "fail", error = %err);
            return ExitCode::from(2);
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("unexpected error: {err:#}");
            error!(action = "run_strategy", result = "fail", error = %err);
            ExitCode::from(3)
        }
    }
}

fn load_configuration(args: &Args) -> Result<Config> {
    let launcher = LauncherConfig::from_file(&args.launcher)?;
    let log_file = init_logger(&launcher.strategy_log_dir, &launcher.strategy_config_path)?;
    info!(
        action = "init_logger",
        log_file = %log_file.display(),
        config_path = %launcher.strategy_config_path.display(),
    );

    let config = Config::from_file(&launcher.strategy_config_path)?;
    info!(action = "load_configuration", content = %config.sanitized_yaml());
    Ok(config)
}

fn run(config: Config) -> Result<()> {
    let ready_timeout = Duration::from_secs(config.trading_control.strategy_ready_timeout_seconds);
    let strategy = Strategy::new(config).context("strategy construction failed")?;

    if !strategy.wait_until_ready(ready_timeout) {
        strategy.shutdown();
        anyhow::bail!("strategy not ready within {ready_timeout:?}");
    }
    strategy.start_trading();

    wait_for_shutdown(&strategy).context("signal handling failed")?;

    info!(action = "shutdown", state = "begin");
    strategy.shutdown();
    info!(action = "shutdown", state = "complete");
    Ok(())
}

/// Block until SIGINT/SIGTERM arrives or the strategy halts itself.
fn wait_for_shutdown(strategy: &Strategy) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;

    runtime.block_on(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("installing SIGTERM handler")?;
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("waiting for SIGINT")?;
                    info!(action = "signal_received", signal = "SIGINT");
                    return Ok(());
                }
                _ = sigterm.recv() => {
                    info!(action = "signal_received", signal = "SIGTERM");
                    return Ok(());
                }
                _ = tokio::time::sleep(Duration::from_millis(250)) => {
                    if strategy.is_halted() {
                        warn!(action = "strategy_halted", reason = "terminal_condition");
                        return Ok(());
                    }
                }
            }
        }
    })
}
