use bifrost::backend::{KeySchema, KeyValueGateway, RedisGateway};
use bifrost::config::DnsConfig;
use bifrost::dispatcher::QueryDispatcher;
use bifrost::server::{DnsServer, Refuse};
use bifrost::zone::{AnswerSynthesizer, TransferEngine, ZoneCache};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Authoritative DNS server backed by Redis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File holding a `redis { ... }` block; BIFROST_* variables are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on for UDP and TCP
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let block = std::fs::read_to_string(path)?;
            DnsConfig::from_block(&block)?.with_overrides(|key| std::env::var(key).ok())?
        }
        None => DnsConfig::from_env()?,
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.validate()?;

    info!("Starting bifrost authoritative DNS server");
    info!(
        "Backend {} (database {}), zone cache TTL {}s",
        config.redis.address, config.redis.database, config.redis.ttl
    );

    let gateway = match RedisGateway::connect(&config.redis).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to connect to Redis: {}", e);
            return Err(e.into());
        }
    };
    if let Err(e) = gateway.ping().await {
        error!("Redis did not answer PING: {}", e);
        return Err(e.into());
    }
    let gateway: Arc<dyn KeyValueGateway> = Arc::new(gateway);

    let cache = Arc::new(ZoneCache::new(
        gateway,
        KeySchema::new(config.redis.prefix.clone(), config.redis.suffix.clone()),
        Duration::from_secs(config.redis.ttl as u64),
    ));
    let dispatcher = Arc::new(QueryDispatcher::new(
        cache,
        AnswerSynthesizer::new(config.redis.ttl),
        TransferEngine::new(
            config.transfer_max_bytes,
            config.transfer_channel_capacity,
            config.redis.ttl,
        ),
    ));
    let server = Arc::new(DnsServer::new(dispatcher, Arc::new(Refuse)));

    let (shutdown_tx, _) = broadcast::channel(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                let _ = signal_tx.send(());
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    server.run(config.bind_addr, &shutdown_tx).await?;
    info!("Server stopped");
    Ok(())
}
