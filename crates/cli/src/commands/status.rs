//! `tryon status`: show the effective configuration.

use tryon_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let storage = &config.storage;

    println!("Try-on Status");
    println!("=============");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Ledger:         {}", storage.ledger_backend);
    if storage.ledger_backend == "sqlite" {
        println!("  SQLite:         {}", storage.sqlite_path);
    }
    println!("  Input images:   {}", storage.input_dir.display());
    println!("  Input meta:     {}", storage.input_metadata_dir.display());
    println!("  Output images:  {}", storage.output_dir.display());
    println!("  Output meta:    {}", storage.output_metadata_dir.display());
    println!(
        "  Chat history:   {}",
        if config.chat_history.enabled {
            storage.chat_history_dir.display().to_string()
        } else {
            "disabled".into()
        }
    );
    println!(
        "  Fetch:          {} attempts, {}s each",
        config.fetch.max_attempts, config.fetch.attempt_timeout_secs
    );
    println!(
        "  Fetch auth:     {}",
        if config.fetch.username.is_some() { "basic" } else { "none" }
    );
    println!(
        "  Compositor:     {} ({}s timeout)",
        config.composition.backend, config.composition.timeout_secs
    );
    if let Some(endpoint) = &config.composition.endpoint {
        println!("  Endpoint:       {endpoint}");
    }
    println!("  Gateway:        {}:{}", config.gateway.host, config.gateway.port);
    println!("  Public URL:     {}", config.gateway.public_base_url);

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file, run `tryon onboard` first");
    }

    Ok(())
}
