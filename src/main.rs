// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use clap::Subcommand;
use std::net::SocketAddr;
use std::path::PathBuf;

mod database;
mod error;
mod meal_plan;
mod recipes;
mod routes;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
#[command(version, about = "Recipe catalog and meal planning HTTP API")]
struct Args {
    /// SQLite database to use instead of the one in the user data directory.
    #[arg(long)]
    database: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:5000")]
        listen: SocketAddr,
    },
    /// Print how many recipes are stored.
    Statistics,
}

/// This is where the database lives on-disk by default. On Linux it should be like:
/// `~/.local/share/recipe_planner/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or("failed to get user home directory")?;
    let path = dirs.data_dir().join("recipe_planner");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

fn serve(database: database::Database, listen: SocketAddr) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(listen).await?;
        log::info!("listening on http://{}", listener.local_addr()?);
        axum::serve(listener, routes::router(database)).await?;
        Ok::<_, Error>(())
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level)
        .init()?;

    let path = match args.database {
        Some(path) => path,
        None => data_path()?.join("recipes.sqlite"),
    };
    let database = database::Database::open(path)?;

    match args.commands {
        Commands::Serve { listen } => serve(database, listen)?,
        Commands::Statistics => {
            let count = database.run_blocking(recipes::recipe_count)?;
            println!("{count}");
        }
    }
    Ok(())
}
