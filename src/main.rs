use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use todo_api::{config::Config, database};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Multi-user to-do list HTTP service")]
struct Args {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
    /// Clear every table and create the admin account
    InitDb {
        #[arg(long, default_value = "admin")]
        admin_username: String,
        #[arg(long, default_value = "123")]
        admin_password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("todo_api=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }

    let sqlite_pool = database::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let bind_addr: SocketAddr = match bind {
                Some(bind) => bind.parse().context("invalid --bind address")?,
                None => config.bind_addr,
            };
            let listener = TcpListener::bind(bind_addr)
                .await
                .with_context(|| format!("failed to bind {bind_addr}"))?;
            todo_api::serve(listener, sqlite_pool).await?;
        }
        Command::InitDb {
            admin_username,
            admin_password,
        } => {
            database::reset(&sqlite_pool, &admin_username, &admin_password).await?;
            tracing::info!("initialized the database");
        }
    }
    Ok(())
}
