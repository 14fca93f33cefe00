//! Modbus RTU register map configurator.

use anyhow::{Context, Result};
use clap::Parser;
use regmap_common::{LoggingConfig, ToolConfig};
use regmap_tool::cli::Cli;
use regmap_tool::commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load tool configuration
    let tool = ToolConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: cli
            .log_level
            .clone()
            .unwrap_or_else(|| tool.logging.level.clone()),
        format: tool.logging.format,
    };
    regmap_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::run(&cli.command, &tool, &mut out)
}
