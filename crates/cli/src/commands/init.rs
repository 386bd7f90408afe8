//! `taskmate init`: write a default config file.

use anyhow::Context;
use taskmate_config::AppConfig;

pub fn run(force: bool) -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("failed to create {}", config_dir.display()))?;
    std::fs::write(&config_path, AppConfig::default_toml())
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!("Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set OPENROUTER_API_KEY (or api_key in the file)");
    println!("   2. Run: taskmate chat");
    Ok(())
}
