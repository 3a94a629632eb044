//! SkinMe live CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{bail, Context, Result};
use clap::Parser;
use skinme_live::{BrokerConfig, LocalBroker};
use skinme_live_client::{ConnectionState, Notification, Payload, Session};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Demo => demo(&cli).await,
        Commands::Reconnect { failures } => reconnect(&cli, *failures).await,
    }
}

fn broker_for(cli: &Cli) -> LocalBroker {
    let config = BrokerConfig {
        endpoint: cli.endpoint.clone(),
        ..BrokerConfig::default()
    };

    LocalBroker::with_responder(config, |query: &str| {
        Some(format!(
            "For \"{}\", start with a gentle cleanser and a fragrance-free moisturizer.",
            query
        ))
    })
}

fn printer(label: &'static str) -> impl Fn(Payload) + Send + Sync + 'static {
    move |payload| match payload {
        Payload::Structured(value) => println!("[{}] {}", label, value),
        Payload::Raw(text) => println!("[{}] (raw) {}", label, text),
    }
}

async fn demo(cli: &Cli) -> Result<()> {
    let broker = broker_for(cli);
    let session = Session::new(cli.session_config(), broker.connector());

    session.connect(
        |frame| {
            let user = frame.headers.get("user-name").map(String::as_str).unwrap_or("?");
            info!(user = user, "Connected to broker");
        },
        |err| error!(error = %err, "Giving up on broker"),
    );

    let state = session.settled().await;
    if state != ConnectionState::Connected {
        bail!("session did not connect (state {:?})", state);
    }

    session.subscribe_to_chat(printer("chat"));
    session.subscribe_to_user("/topic/chat", printer("assistant"));
    session.subscribe_to_notifications(printer("notification"));
    session.subscribe_to_orders(printer("orders"));
    session.subscribe_to_products(printer("products"));
    session.subscribe_to_inventory(printer("inventory"));

    session.send_chat_message(&cli.login, "Hello from the demo", Some("demo-conversation"));
    session.send_chat_query(&cli.login, "dry skin in winter", Some("demo-conversation"));
    session.send_order_update("order-42", "CREATED", &serde_json::json!({"total": 59.9, "items": 3}));
    session.send_product_update("product-7", "PRICE_CHANGED", &serde_json::json!({"price": 19.5}));
    session.send_inventory_update("product-7", "STOCK_LOW", &serde_json::json!({"stock": 4}));

    broker
        .send_user_notification(
            &cli.login,
            Notification::new("Order confirmed", "Order order-42 is being prepared"),
        )
        .context("Failed to push user notification")?;

    // Let the broker drain its delivery queues
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = serde_json::to_string_pretty(&session.status()).context("Failed to encode status")?;
    println!("{}", status);

    session.shutdown().await;
    Ok(())
}

async fn reconnect(cli: &Cli, failures: u32) -> Result<()> {
    let broker = broker_for(cli);
    broker.fail_next_connects(failures);

    let session = Session::new(cli.session_config(), broker.connector());
    let mut state_rx = session.state_receiver();

    info!(
        failures = failures,
        max_reconnect_attempts = cli.max_reconnect_attempts,
        delay_ms = cli.reconnect_delay_ms,
        "Connecting through refused attempts"
    );

    session.connect(
        |_| info!("Connected"),
        |err| error!(error = %err, "Reconnect budget exhausted"),
    );

    loop {
        if state_rx.changed().await.is_err() {
            break;
        }

        let state = *state_rx.borrow_and_update();
        println!("state: {:?} (reconnect attempts: {})", state, session.status().reconnect_attempts);

        if matches!(
            state,
            ConnectionState::Connected | ConnectionState::Failed | ConnectionState::Disconnected
        ) {
            break;
        }
    }

    let status = serde_json::to_string_pretty(&session.status()).context("Failed to encode status")?;
    println!("{}", status);

    session.shutdown().await;
    Ok(())
}
