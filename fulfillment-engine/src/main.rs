use actix_web::{middleware, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use fulfillment_engine::{
    config::Config,
    dead_letter::NatsDeadLetterPublisher,
    handlers,
    ledger_client::HttpLedgerClient,
    nats_consumer::{start_consumers, FulfillmentConsumer, FulfillmentSettings},
};
use message_bus::{NatsClient, Publisher};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .json()
        .init();

    info!("Starting Fulfillment Engine...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!("Configuration loaded successfully");

    // NATS + streams
    let nats = NatsClient::connect(&config.nats.client_config())
        .await
        .context("Failed to connect to NATS")?;
    nats.ensure_stream(&config.nats.inbound_stream_spec())
        .await
        .context("Failed to provision inbound stream")?;
    nats.ensure_stream(&config.nats.dead_letter_stream_spec())
        .await
        .context("Failed to provision dead letter stream")?;

    info!("NATS connected, streams ready");

    let dead_letters = Arc::new(NatsDeadLetterPublisher::new(
        Publisher::new(nats.clone(), config.nats.publisher_config()),
        config.nats.dead_letter_subject.clone(),
    ));

    let ledger = Arc::new(HttpLedgerClient::new(&config.ledger).context("Failed to create ledger client")?);

    info!(
        "Ledger client ready (record: {}, commit: {})",
        config.ledger.post_transaction_url, config.ledger.commit_reservation_url
    );

    let handler = Arc::new(FulfillmentConsumer::new(
        ledger,
        dead_letters,
        FulfillmentSettings::from(&config.fulfillment),
    ));

    let consumers = start_consumers(nats.clone(), config.nats.subscriber_configs(), handler);
    info!("✅ {} fulfillment consumer(s) started", consumers.len());

    let server_config = config.server.clone();
    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    let served = HttpServer::new(|| {
        App::new()
            .wrap(middleware::Logger::default())
            .configure(handlers::configure_routes)
    })
    .bind((server_config.host, server_config.port))?
    .run()
    .await;

    info!("Shutting down fulfillment consumers");
    for consumer in &consumers {
        consumer.abort();
    }
    if let Err(e) = nats.flush().await {
        error!("Failed to flush NATS connection: {}", e);
    }

    served.context("HTTP server failed")
}
