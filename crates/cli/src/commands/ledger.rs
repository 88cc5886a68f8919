//! `tryon ledger`: inspect one user's records and compositions.

use tryon_config::AppConfig;
use tryon_core::UserId;

pub async fn run(user: String, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let ledger = tryon_ledger::build_from_config(&config).await?;
    let user = UserId::new(user);

    let records = ledger.records(&user).await?;
    let compositions = ledger.compositions(&user).await?;

    if json {
        let out = serde_json::json!({
            "user": user,
            "records": records,
            "compositions": compositions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Ledger for {user} ({})", ledger.name());
    println!("========================================");

    if records.is_empty() {
        println!("  No attachments.");
    } else {
        println!("  Attachments ({}):", records.len());
        for r in &records {
            println!(
                "    {} {:<12} {:<8} {}",
                r.created_at.format("%Y-%m-%d %H:%M:%S"),
                r.declared_type.as_str(),
                if r.consumed { "used" } else { "unused" },
                r.local_path.display()
            );
        }
    }

    if compositions.is_empty() {
        println!("\n  No compositions.");
    } else {
        println!("\n  Compositions ({}):", compositions.len());
        for c in &compositions {
            println!(
                "    {} {}",
                c.created_at.format("%Y-%m-%d %H:%M:%S"),
                c.output_image.display()
            );
        }
    }

    Ok(())
}
