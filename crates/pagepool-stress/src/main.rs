//! pagepool-stress: hammer a page pool from many threads.

use anyhow::Result;
use pagepool_stress::{app, config};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let config = config::StressConfig::parse();
    let report = app::run(&config)?;
    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }
    Ok(())
}
