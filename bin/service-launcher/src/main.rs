use anyhow::Result;
use clap::Parser;
use mesh_broker::BrokerConnector;
use mesh_core::ServiceRegistry;
use mesh_factory::{CreateOptions, ServiceFactory, ServiceKind};
use mesh_runtime::shutdown_signal;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::init as tracing_init;

mod gateway;

/// Launch one mesh service in this process
#[derive(Parser, Debug)]
#[command(name = "service-launcher")]
struct Args {
    /// Service type to launch (api, otp, gateway)
    #[arg(short = 's', long = "service")]
    service: String,

    /// Listen/registration port; defaults per service type
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Deployment environment tag
    #[arg(short = 'e', long = "environment", default_value = "development")]
    environment: String,

    /// Service version tag
    #[arg(short = 'v', long = "service-version")]
    version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();
    let args = Args::parse();

    info!("Starting service-launcher (service={}, env={})", args.service, args.environment);

    let broker_url = std::env::var("BROKER_URL")
        .unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".to_string());
    let host = std::env::var("SERVICE_HOST").unwrap_or_else(|_| "localhost".to_string());
    let otp_ttl = std::env::var("OTP_TTL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(300));

    let registry = Arc::new(ServiceRegistry::new());
    let sweeper = registry.spawn_sweeper();
    info!("Service registry initialized");

    let connector = Arc::new(BrokerConnector::new(broker_url));
    let factory = ServiceFactory::new(
        Arc::clone(&connector),
        Arc::clone(&registry),
        args.environment.clone(),
    )
    .with_otp_ttl(otp_ttl);

    let instance = factory
        .create_service(
            &args.service,
            CreateOptions {
                port: args.port,
                host: Some(host),
                version: args.version,
            },
        )
        .await?;
    instance.service.start().await?;
    info!("Service instance {} started", instance.id);

    // The gateway additionally exposes the registry read API over HTTP.
    if instance.kind == ServiceKind::Gateway {
        let port = instance.service.base().config().port;
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let registry = factory.registry();
        tokio::spawn(async move {
            if let Err(e) = gateway::serve(addr, registry).await {
                warn!("Gateway read API stopped: {}", e);
            }
        });
    }

    shutdown_signal().await;

    instance.service.stop().await?;
    factory.connector().close().await;
    sweeper.abort();
    info!("Shutdown complete");
    Ok(())
}
