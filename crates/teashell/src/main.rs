//! # teashell
//!
//! Runs a supervised terminal program on the local terminal.
//!
//! ## Usage
//!
//! ```text
//! teashell [--config <path>]
//! teashell --print-schema
//! ```

use std::time::Duration;

use teashell_core::ServerConfig;

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--print-schema") {
        let schema = ServerConfig::json_schema()?;
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let config = match args.iter().position(|arg| arg == "--config") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
            ServerConfig::from_file(path)?
        }
        None => ServerConfig::default(),
    };

    // Initialize logging
    teashell::logging::init(&config.server.log_level)?;
    tracing::info!("teashell v{} starting", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(teashell::run_local(config));

    // stdin reads block a worker thread; don't wait on them.
    runtime.shutdown_timeout(Duration::from_millis(100));

    tracing::info!("teashell shutting down");
    result
}
