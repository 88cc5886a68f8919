//! `tryon gateway`: start the HTTP webhook server.

use tryon_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Try-on Gateway");
    println!("   Listening:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Public URL:  {}", config.gateway.public_base_url);
    println!("   Compositor:  {}", config.composition.backend);

    tryon_gateway::start(config).await?;

    Ok(())
}
