use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use sapporo_core::domain::user::validate_username;
use sapporo_core::UserDraft;
use sapporo_server::auth::{hash_password, validate_password};
use sapporo_server::config::ServerConfig;
use sapporo_state_postgres::PostgresConnection;

#[derive(Debug, Parser)]
#[command(name = "sapporo-web", version, about = "Web front end for GA4GH WES services")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve HTTP (default)
    Serve,
    /// Apply pending PostgreSQL migrations
    Migrate,
    /// Create a staff superuser
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long, env = "SAPPORO_SUPERUSER_PASSWORD")]
        password: String,
    },
    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration from environment variables
    let config = ServerConfig::load().context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            sapporo_server::run(config).await.context("Server error")?;
        }
        Command::Migrate => {
            sapporo_server::init_logging(&config);
            let conn = PostgresConnection::new(&config.postgres)
                .await
                .context("Failed to connect to PostgreSQL")?;
            let applied = conn.run_migrations().await.context("Migration failed")?;
            println!("Applied {} migration(s)", applied.len());
        }
        Command::CreateSuperuser { username, password } => {
            sapporo_server::init_logging(&config);
            if config.debug {
                bail!("create-superuser needs DEBUG=false: the in-memory store is dropped on exit");
            }
            validate_username(&username).context("Invalid username")?;
            let problems = validate_password(&password, &username);
            if !problems.is_empty() {
                bail!("Invalid password: {}", problems.join(" "));
            }

            let repos = sapporo_server::create_repositories(&config)
                .await
                .context("Failed to open the state store")?;
            let user = repos
                .users
                .insert(UserDraft::superuser(username, hash_password(&password)))
                .await
                .context("Failed to create the superuser")?;
            println!("Superuser '{}' created (id {})", user.username, user.id);
        }
        Command::CheckConfig => {
            let mut shown = config.clone();
            shown.postgres.password = "********".to_string();
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}
