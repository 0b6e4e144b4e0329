use colored::Colorize;
use foodhub::api::{self, AppState};
use foodhub::cli::{self, CLI};
use foodhub::config::AppConfig;
use foodhub::database::sqlite::SqliteDatabase;
use foodhub::errors::Result;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().flatten_event(true))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        eprintln!("{}", format!("Application error: {}", e).red());
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("serve");

    if command == "help" {
        CLI::print_help();
        return Ok(());
    }

    let config = AppConfig::load()?;
    if command == "serve" {
        return api::start_http_server(config).await;
    }

    let database = Arc::new(SqliteDatabase::new(&config.database_path).await?);
    let state = AppState::new(database, config);
    let rest = &args[2..];

    match command {
        "create-admin" => cli::handle_create_admin_command(&state, rest).await?,
        "orders" => cli::handle_orders_command(&state, rest).await?,
        "settlements" => cli::handle_settlements_command(&state, rest).await?,
        "sweep" => cli::handle_sweep_command(&state).await?,
        _ => {
            println!("{}", "Unknown command. Use 'help' to see available commands.".red());
        }
    }

    Ok(())
}
