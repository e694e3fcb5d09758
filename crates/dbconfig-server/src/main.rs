//! Main entry point for the dbconfig server.
//!
//! Without a subcommand (or with `serve`) this starts the HTTP API; `dump`
//! and `rekey` run once against the configured store and exit.

use std::sync::Arc;

use clap::Parser;
use tracing::{Level, error, info};

use dbconfig_common::ValueCodec;
use dbconfig_server::{
    command,
    model::{AppState, Cli, Command, Configuration},
    startup::{self, LoggingConfig},
};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let configuration = Configuration::new(&cli)?;

    match cli.command {
        None | Some(Command::Serve) => serve(configuration).await,
        Some(Command::Dump(args)) => {
            let _logging_guard = startup::init_logging(&LoggingConfig::console_only(Level::WARN))?;
            let store = startup::init_store(&configuration).await?;
            let engine = startup::build_engine(&configuration, store);
            let dump = command::dump(&engine, &args).await?;
            println!("{}", serde_json::to_string_pretty(&dump)?);
            Ok(())
        }
        Some(Command::Rekey(args)) => {
            let _logging_guard = startup::init_logging(&LoggingConfig::console_only(Level::INFO))?;
            let store = startup::init_store(&configuration).await?;
            let engine = startup::build_engine_with_codec(
                &configuration,
                store,
                ValueCodec::new(&args.new_prefix, configuration.encrypt_gzip()),
            );
            let reports = command::rekey(&engine, &args).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
            Ok(())
        }
    }
}

async fn serve(configuration: Configuration) -> Result<(), Box<dyn std::error::Error>> {
    let _logging_guard = startup::init_logging(&LoggingConfig::from_env())?;

    let server_address = configuration.server_address();
    let server_port = configuration.server_port();
    let context_path = configuration.server_context_path();

    let store = startup::init_store(&configuration).await?;
    let engine = startup::build_engine(&configuration, store);
    let app_state = Arc::new(AppState::new(configuration, engine));

    info!(
        "Starting dbconfig server on {}:{}{}",
        server_address, server_port, context_path
    );
    let server = startup::api_server(app_state, context_path, server_address, server_port)?;

    if let Err(e) = server.await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("dbconfig server shutdown complete");
    Ok(())
}
