use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use trello_mirror::config::MirrorConfig;
use trello_mirror::integrations::webhooks::{
    register_board_webhook, serve, AppState, RegistrationOutcome,
};
use trello_mirror::integrations::{BoardTracker, TrelloClient};
use trello_mirror::logging::{init_logging, LoggingConfig};
use trello_mirror::mirror::MirrorEngine;

#[derive(Parser, Debug)]
#[command(name = "trello-mirror")]
#[command(version)]
#[command(about = "Mirror master-list Trello cards into one list per label")]
struct Cli {
    /// Path to a TOML configuration file [default: trello-mirror.toml if present]
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Suppress all log output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, conflicts_with = "quiet", global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server (default)
    Serve,

    /// Register the webhook callback with Trello
    RegisterWebhook {
        /// Callback URL; overrides `callback_url` from configuration
        #[arg(long)]
        callback_url: Option<String>,
    },

    /// Push a master card's name and description to its mirrors
    Sync {
        /// ID of the master card
        card_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if !cli.quiet {
        if let Err(e) = init_logging(LoggingConfig::from_verbosity(cli.verbose)) {
            eprintln!("Warning: failed to initialize logging: {}", e);
        }
    }

    let mut config = match MirrorConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    if let Some(Commands::RegisterWebhook {
        callback_url: Some(url),
    }) = &cli.command
    {
        config.callback_url = Some(url.clone());
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return Ok(ExitCode::from(2));
    }

    let client: Arc<dyn BoardTracker> = Arc::new(TrelloClient::new(config.trello_config())?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(&config, client).await,
        Commands::RegisterWebhook { .. } => register_webhook(&config, client.as_ref()).await,
        Commands::Sync { card_id } => sync_card(&config, client, &card_id).await,
    }
}

async fn run_server(
    config: &MirrorConfig,
    client: Arc<dyn BoardTracker>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let engine = Arc::new(MirrorEngine::new(client, config.engine_config()));

    tracing::info!(
        board_id = %config.board_id,
        master_list_id = %config.master_list_id,
        "Starting mirror service"
    );

    serve(&config.webhook_config(), AppState::new(engine)).await?;
    Ok(ExitCode::SUCCESS)
}

async fn register_webhook(
    config: &MirrorConfig,
    client: &dyn BoardTracker,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let callback_url = match config.require_callback_url() {
        Ok(url) => url,
        Err(e) => {
            eprintln!("Error: {} (set WEBHOOK_URL or pass --callback-url)", e);
            return Ok(ExitCode::from(2));
        }
    };

    match register_board_webhook(client, &config.board_id, callback_url).await {
        Ok(RegistrationOutcome::Registered(webhook)) => {
            println!("Webhook registered: {}", webhook.id);
            println!("Callback URL: {}", callback_url);
            Ok(ExitCode::SUCCESS)
        }
        Ok(RegistrationOutcome::AlreadyExists) => {
            println!("Webhook already exists for {}", callback_url);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error registering webhook: {}", e);
            Ok(ExitCode::from(1))
        }
    }
}

async fn sync_card(
    config: &MirrorConfig,
    client: Arc<dyn BoardTracker>,
    card_id: &str,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let engine = MirrorEngine::new(client, config.engine_config());

    match engine.resync(card_id).await {
        Ok(outcome) => {
            println!("Master card: {}", outcome.master.name);
            println!("Mirrors updated: {}", outcome.summary.total);
            println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
            if outcome.summary.all_successful() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
        Err(e) => {
            eprintln!("Error syncing card {}: {}", card_id, e);
            Ok(ExitCode::from(1))
        }
    }
}
