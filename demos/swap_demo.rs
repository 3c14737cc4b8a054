//! Trades Bulbasaur for Squirtle between two trainers and prints who owns what.
//!
//! Usage: `cargo run --example swap_demo [config.toml]`. A config path that
//! does not exist yet is created with the defaults. Without one the in-memory
//! store is used. `TRADEPOST_*` environment variables apply either way.

use anyhow::Context;
use tradepost::config::AppConfig;
use tradepost::logging::init_tracing;
use tradepost::{ExchangeService, OwnedItem};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            AppConfig::load_or_create(&path).with_context(|| format!("loading {}", path))?
        }
        None => AppConfig::default(),
    };
    config.apply_env_overrides()?;
    init_tracing(&config.logging)?;

    let service = ExchangeService::from_config(&config)
        .await
        .context("starting exchange service")?;

    let inventory = service.inventory();
    inventory
        .deposit(
            "ash",
            OwnedItem::new(1, "Bulbasaur", "ash")
                .with_image_url("https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/1.png"),
        )
        .await?;
    inventory
        .deposit(
            "misty",
            OwnedItem::new(7, "Squirtle", "misty")
                .with_image_url("https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/7.png"),
        )
        .await?;

    let id = service.create_exchange_request("ash", "misty", 1, 7).await?;
    println!("Created exchange {}", id);

    match service.execute_exchange(&id).await {
        Ok(()) => println!("Exchange {} completed", id),
        Err(e) => println!("Exchange {} failed: {}", id, e.user_message()),
    }

    let request = service.get_exchange_by_id(&id).await?;
    println!("Status: {}", request.status);
    for party in ["ash", "misty"] {
        let names: Vec<String> = inventory
            .items_of(party)
            .await?
            .into_iter()
            .map(|item| format!("#{} {}", item.item_id, item.name))
            .collect();
        println!("{} owns: {}", party, names.join(", "));
    }

    Ok(())
}
