//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p isle_client --bin client -- [--url ws://localhost:8081/ws]
//!       [--config client.json] [--identity .isle_identity.json] [--reconnect-ms 5000]
//!
//! The client connects to the server, joins with the persisted player id,
//! and prints state changes as they arrive.
//!
//! Console commands:
//!   w | a | s | d        - Move one tile
//!   move <dir>           - Move up, down, left or right
//!   fish                 - Cast a line (must face water)
//!   catch                - Strike while a fish is on the line
//!   cancel               - Reel in before a bite
//!   ack                  - Close the fishing result
//!   sell <name>          - Sell a whole stack
//!   buy <name> <price>   - Buy an item
//!   inventory            - List inventory
//!   status               - Show client status
//!   quit                 - Exit client

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use isle_client::{
    connection::{ConnectionManager, WsConnector},
    ClientEvent, GameClient, Runtime,
};
use isle_shared::{
    config::ClientConfig,
    identity::{FileIdentityStore, IdentityStore},
};
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    // The config file is read first so other flags override it.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ClientConfig::load(&args[i + 1])?,
        _ => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--url" if i + 1 < args.len() => {
                cfg.server_url = args[i + 1].clone();
                i += 2;
            }
            "--identity" if i + 1 < args.len() => {
                cfg.identity_path = args[i + 1].clone();
                i += 2;
            }
            "--reconnect-ms" if i + 1 < args.len() => {
                cfg.reconnect_delay_ms = args[i + 1]
                    .parse()
                    .with_context(|| format!("parse --reconnect-ms {}", args[i + 1]))?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Connected => println!("Connected."),
        ClientEvent::Disconnected => println!("Disconnected, will reconnect."),
        ClientEvent::MapReplaced { width, height } => println!("Map loaded ({width}x{height})."),
        ClientEvent::PlayersChanged { count } => println!("Players online: {count}"),
        ClientEvent::InventoryChanged => println!("Inventory changed. Type 'inventory' to list."),
        ClientEvent::BalanceChanged { balance } => println!("Balance: ${balance}"),
        ClientEvent::Fishing { to, fish, .. } => match fish {
            Some(fish) => println!(
                "You caught a {} ({}, ${})! Type 'ack' to continue.",
                fish.name,
                fish.tier(),
                fish.value
            ),
            None => println!("Fishing: {to}"),
        },
        ClientEvent::TradeSettled { kind, item } => {
            println!("Trade settled: {kind} {} x{}", item.name, item.quantity)
        }
        ClientEvent::Notice(text) => println!("! {text}"),
        ClientEvent::Output(line) => println!("{line}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    let mut identities = FileIdentityStore::new(&cfg.identity_path);
    let player_id = identities
        .get_or_create(&cfg.player_key)
        .context("load player identity")?;
    info!(server = %cfg.server_url, player = %player_id, "Starting client");

    let client = GameClient::new(player_id, &cfg);
    let conn = ConnectionManager::new(WsConnector::new(&cfg.server_url), cfg.reconnect_delay());
    let runtime = Runtime::new(client, conn, &cfg);

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    let (event_tx, mut event_rx) = mpsc::channel::<ClientEvent>(256);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Type 'status' for info, 'quit' to exit.");
    println!();

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    runtime.run(console_rx, event_tx).await;
    printer.await.context("event printer")?;
    Ok(())
}
