//! Exports persisted quotes to CSV.
//!
//! Reads quotes generated in the last `--since-days` days from Postgres and
//! writes them oldest first, one row per quote.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cover_quote_engine::persistence::{PostgresPersistence, QuoteStore, write_quotes_csv};

#[derive(Parser)]
#[command(name = "export-quotes")]
#[command(about = "Export stored cover quotes as CSV")]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// How many days back to export
    #[arg(long, default_value_t = 7)]
    since_days: u32,

    /// Output file, `-` for stdout. Defaults to a timestamped file name.
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let store = PostgresPersistence::connect(&cli.database_url, 2, 1, Duration::from_secs(10))
        .await
        .context("connecting to database")?;

    let to = Utc::now();
    let from = to - chrono::Duration::days(i64::from(cli.since_days));
    let quotes = store.load_quotes_between(from, to).await?;

    let path = cli
        .output
        .unwrap_or_else(|| format!("quote_export_{}.csv", to.format("%m-%d-%H-%M-%S")));
    let out: Box<dyn Write> = if path == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(File::create(&path).with_context(|| format!("creating {path}"))?)
    };
    write_quotes_csv(&quotes, BufWriter::new(out)).context("writing CSV")?;

    tracing::info!(count = quotes.len(), output = %path, "quotes exported");
    Ok(())
}
