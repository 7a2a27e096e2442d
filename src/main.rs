//! Push Agent CLI - receives and decrypts WebPush notifications.
//!
//! This is the main binary entry point. See the `push_agent` library
//! for the core functionality.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use push_agent::{
    AppServerClient, Config, Credentials, EndpointRegistration, NotificationDispatcher,
    PushServiceClient, WebSocketDialer, WriterSink,
};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "push-agent")]
#[command(version)]
#[command(about = "WebPush user agent that prints decrypted notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a channel and print every notification it receives
    Listen {
        /// Application server key blob (overrides config)
        #[arg(long)]
        server_key: Option<String>,
        /// Do not hand the push endpoint to the application server
        #[arg(long)]
        skip_app_server: bool,
    },
    /// Print the effective configuration
    Config,
}

/// Logs go to stderr, or to `PUSH_AGENT_LOG_FILE` when set.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    if let Ok(path) = std::env::var("PUSH_AGENT_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

async fn listen(config: Config, server_key: Option<String>, skip_app_server: bool) -> Result<()> {
    let server_key = server_key.unwrap_or_else(|| config.server_key.clone());

    let mut client = PushServiceClient::new(
        WebSocketDialer,
        config.service_endpoint(),
        config.retry_policy(),
    );
    client.connect().await?;

    let subscription = client.register(&server_key).await?;
    let registration = EndpointRegistration::for_subscription(subscription)?;
    log::info!("Push endpoint: {}", registration.endpoint);

    if skip_app_server {
        log::info!("Skipping application server registration");
    } else {
        let credentials = Credentials::from_env()?;
        let app_server = AppServerClient::login(config.app_server.clone(), &credentials).await?;
        app_server
            .register_endpoint(&registration)
            .await
            .context("Failed to register push endpoint with the application server")?;
    }

    let mut dispatcher = NotificationDispatcher::new(WriterSink::stdout());
    client.receive_loop(&mut dispatcher).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Listen {
            server_key,
            skip_app_server,
        } => listen(config, server_key, skip_app_server).await?,
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}
