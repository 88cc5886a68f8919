//! `tryon chat`: drive the session engine from the terminal.
//!
//! Each line is one inbound message. A token starting with `@` attaches a
//! local file or URL; everything else is the message text.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tryon_config::AppConfig;
use tryon_core::{InboundEvent, UserId};

pub async fn run(user: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let fetcher = tryon_backends::build_fetcher(&config)?;
    let state = tryon_gateway::build_state(&config, fetcher).await?;
    let user = UserId::new(user);

    println!("Try-on Bot (local chat)");
    println!("   User:        {user}");
    println!("   Ledger:      {}", state.engine.ledger().name());
    println!("   Compositor:  {}", config.composition.backend);
    println!("   Attach an image with @path, e.g. `garment @shirt.png`");
    println!("   Type 'exit' or Ctrl+D to quit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let reply = state.engine.handle(parse_line(&user, line)).await;
        println!("Bot > {}", reply.text);
        if let Some(artifact) = reply.artifact {
            println!("      -> {}", artifact.display());
        }
        println!();
    }

    println!("Bye.");
    Ok(())
}

/// Split a chat line into message text and an optional `@` attachment.
fn parse_line(user: &UserId, line: &str) -> InboundEvent {
    let mut attachment = None;
    let mut words = Vec::new();
    for token in line.split_whitespace() {
        match token.strip_prefix('@') {
            Some(path) if attachment.is_none() && !path.is_empty() => {
                attachment = Some(path.to_string());
            }
            _ => words.push(token),
        }
    }

    let text = words.join(" ");
    match attachment {
        Some(path) => InboundEvent::with_attachment(user.clone(), text, path),
        None => InboundEvent::text(user.clone(), text),
    }
}
