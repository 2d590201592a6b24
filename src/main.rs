use clap::Parser;
use signal_relay::cli::{Cli, Commands};
use signal_relay::error::Result;
use signal_relay::logging::{init_logging, LoggingConfig};
use signal_relay::signaling::SignalingServer;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LoggingConfig::from_args(cli.quiet, cli.verbose > 0, cli.json)
        .with_file_output(cli.log_file.clone());

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli).await {
        signal_relay::log_error!(e, "signal-relay");
        let error_response = e.to_error_response();
        match serde_json::to_string_pretty(&error_response) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("{}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Serve(args) => {
            let config = args.server_config()?;
            tracing::info!(
                host = %config.host,
                port = config.port,
                origins = ?config.allowed_origins,
                heartbeat_secs = config.heartbeat_interval.as_secs(),
                "Starting signaling relay"
            );
            SignalingServer::new(config).run().await?;
        },
    }

    Ok(())
}
