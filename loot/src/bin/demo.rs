//! Aether Loot Demo
//!
//! Runs one full ticket cycle against the in-memory lottery chain:
//! - Registering a tier and a blueprint (owner writes)
//! - Connecting the wallet and loading the inventory
//! - Buying tickets at the validated price
//! - Declaring maturity and redeeming
//! - Listing the owned items
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=aetherloot=debug cargo run --bin loot-demo
//! ```

use aetherloot::mocks::{LootOutcome, MockLotteryChain};
use aetherloot::units::format_ether;
use aetherloot::{Blueprint, LootConfig, LootSession, Tier};
use alloy::primitives::U256;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = LootConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n============================================");
    println!("   Aether Loot - Live Demo");
    println!("============================================\n");

    let chain = MockLotteryChain::new()
        .with_chain_id(config.chain_id)
        .with_price(U256::from(1_000_000_000_000_000u64));
    let session = Arc::new(
        LootSession::open(config, Arc::new(chain.clone()), Arc::new(chain.clone())).await?,
    );

    // Step 1: catalog
    println!("1. Registering tier and blueprint...");
    let connected = chain.clone().connected();
    let owner = connected.gateway();
    owner
        .add_tier(&Tier {
            name: "Rare".to_string(),
            modulo_target: U256::from(10),
            rarity_id: U256::from(3),
        })
        .await?;
    owner
        .add_blueprint(&Blueprint {
            tier_rarity_id: U256::from(3),
            name: "Aether Blade".to_string(),
            max_supply: U256::from(100),
        })
        .await?;
    println!("   Tier 'Rare' with blueprint 'Aether Blade'\n");

    // Step 2: connect
    println!("2. Connecting wallet...");
    let account = session.connect().await?;
    let watcher = session.watch_wallet();
    println!("   Account: {account}");
    println!(
        "   Ticket price: {} ETH",
        session.display_price().await.unwrap_or_else(|| "?".to_string())
    );
    println!("   Owned items: {}\n", session.inventory().await.len());

    // Step 3: buy
    let seed = session.snapshot().await.seed;
    println!("3. Buying 3 tickets with seed {seed}...");
    let state = session.buy(seed, 3).await?;
    if let Some(ticket) = &state.ticket {
        println!(
            "   Paid {} ETH, target block {}",
            ticket.payment_wei.map_or_else(|| "?".to_string(), format_ether),
            ticket.target_block.unwrap_or_default()
        );
    }
    println!("   Balance left: {} ETH\n", format_ether(chain.balance()));

    // Step 4: mature and redeem
    println!("4. Waiting for maturity and redeeming...");
    chain.mine_blocks(1);
    chain.script_outcome(LootOutcome::mint("Rare", "Aether Blade"));
    session.advance().await?;
    let state = session.redeem().await?;
    match &state.last_result {
        Some(result) if result.matched => println!(
            "   Minted {} ({})\n",
            result.blueprint_name.as_deref().unwrap_or("?"),
            result.tier_name.as_deref().unwrap_or("?")
        ),
        Some(_) => println!("   No item this time\n"),
        None => println!("   No result\n"),
    }

    // Step 5: inventory
    println!("5. Inventory:");
    for item in session.inventory().await {
        println!("   - {} / {} [{}]", item.tier_name, item.blueprint_name, item.mint_id);
    }

    session.shutdown(Duration::from_secs(5)).await?;
    watcher.abort();

    println!("\n============================================");
    println!("   Demo complete");
    println!("============================================\n");
    Ok(())
}
