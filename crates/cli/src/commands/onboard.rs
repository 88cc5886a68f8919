//! `tryon onboard`: first-time setup.

use tryon_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Try-on Bot First-Time Setup");
    println!("===========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let storage = &config.storage;
    for dir in [
        &storage.input_dir,
        &storage.input_metadata_dir,
        &storage.output_dir,
        &storage.output_metadata_dir,
        &storage.chat_history_dir,
    ] {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("Created {}", dir.display());
        }
    }

    println!("\nNext steps:");
    println!("   1. Set TWILIO_ACCOUNT_ID / TWILIO_AUTH_TOKEN for media downloads");
    println!("   2. Point composition.endpoint at a model server, or keep the merge preview");
    println!("   3. Run: tryon chat   (or `tryon gateway`)\n");

    Ok(())
}
