//! `taskmate serve`: start the HTTP API gateway.

use anyhow::Context;
use taskmate_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Taskmate gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Users:     {}", config.gateway.tokens.len());

    taskmate_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("gateway stopped: {e}"))
}
