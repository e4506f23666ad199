//! dossier-flow CLI entry point.

use clap::Parser;

use dossier_flow::cli::{commands, handle_error, Cli, Commands};
use dossier_flow::infrastructure::config::ConfigLoader;
use dossier_flow::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load_with(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, config, cli.json).await,
        Commands::Template(args) => commands::template::execute(args, config, cli.json).await,
        Commands::Dossier(args) => commands::dossier::execute(args, config, cli.json).await,
        Commands::Step(args) => commands::step::execute(args, config, cli.json).await,
        Commands::Transfer(args) => commands::transfer::execute(args, config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
