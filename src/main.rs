use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use riptide::auth::{self, UserType};
use riptide::chat::StreamRegistry;
use riptide::config::Config;
use riptide::provider::ModelRouter;
use riptide::server::{self, AppState};
use riptide::store::db::{create_pool, run_migrations};
use riptide::store::ConversationStore;

#[derive(Parser)]
#[command(name = "riptide", version, about = "Streaming chat server with tool-calling models")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create a user and print a session token
    CreateUser {
        email: String,
        /// Grant the admin tier
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    let pool = create_pool(&config.database_url()).await?;
    run_migrations(&pool).await?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            let store = ConversationStore::new(pool);

            let tool_db = match config.tool_database_url() {
                Some(url) => Some(create_pool(&url).await?),
                None => {
                    info!("no tool database configured, query tool disabled");
                    None
                }
            };

            let registry = config
                .resume_buffer_events()
                .map(|cap| Arc::new(StreamRegistry::new(Some(cap))));

            let state = AppState {
                store,
                tool_db,
                router: Arc::new(ModelRouter::from_config(&config)),
                registry,
            };

            server::run(state, port.unwrap_or_else(|| config.port())).await
        }
        Command::CreateUser { email, admin } => {
            let tier = if admin {
                UserType::Admin
            } else {
                UserType::Regular
            };
            let (user_id, token) = auth::provision_user(&pool, &email, tier).await?;
            println!("user id: {user_id}");
            println!("token:   {token}");
            Ok(())
        }
    }
}
