/*!
 * KMA Replay - Main Entry Point
 *
 * Replays an allocation trace against one strategy and prints the report:
 *
 *   kma-replay <buddy|free-list|resource-map> <trace> [config.json]
 */

use anyhow::{bail, Context, Result};
use kma::{init_tracing, replay, KmaConfig, ReplayOptions, StrategyKind, Trace};
use tracing::info;

const USAGE: &str = "usage: kma-replay <buddy|free-list|resource-map> <trace> [config.json]";

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (kind, trace_path, config_path) = match args.as_slice() {
        [kind, trace] => (kind, trace, None),
        [kind, trace, config] => (kind, trace, Some(config)),
        _ => bail!(USAGE),
    };

    let kind: StrategyKind = kind.parse()?;

    let config = match config_path {
        Some(path) => KmaConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => KmaConfig::default(),
    }
    .with_env_overrides()?;

    let trace = Trace::from_file(trace_path)
        .with_context(|| format!("reading trace {}", trace_path))?;
    info!(strategy = %kind, ops = trace.len(), "replaying trace");

    let options = ReplayOptions {
        check_invariants: std::env::var("KMA_CHECK_INVARIANTS").is_ok_and(|v| v == "1" || v == "true"),
    };

    let report = replay(&trace, kind, &config, options)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
