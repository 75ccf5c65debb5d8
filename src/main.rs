use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use relayhub::config::Cli;
use relayhub::hub::HubServer;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let bind_addr = cli.listen_addr();

    println!("   Relay Hub");
    println!("   Binding to {}", bind_addr);
    println!("   Press Ctrl+C to stop\n");

    let server = HubServer::bind(bind_addr, cli.server_config()).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
