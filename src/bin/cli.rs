use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use easybets::{build_cache, Config, ScoringEngine};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "easybets", about = "Scrape bookmaker odds and score predictions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape one snapshot and print it
    Scrape {
        /// Write the snapshot to a JSON file instead of stdout
        #[arg(long)]
        out: Option<String>,
    },
    /// Scrape one snapshot and print a prediction per fixture
    Predict,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let cache = build_cache(&config);

    // One-shot runs always want fresh data
    let snapshot = cache
        .get_snapshot(Duration::ZERO)
        .await
        .context("Failed to capture odds snapshot")?;

    match cli.command {
        Command::Scrape { out } => {
            let json = serde_json::to_string_pretty(&*snapshot)
                .context("Failed to serialize snapshot")?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json).context("Failed to write snapshot file")?;
                    println!(
                        "Saved {} fixtures ({} rejected) to {}",
                        snapshot.entries.len(),
                        snapshot.rejected,
                        path
                    );
                }
                None => println!("{json}"),
            }
        }
        Command::Predict => {
            let engine = ScoringEngine::global(config.model_path.as_deref())
                .context("Failed to load prediction model")?;
            println!("Model: {}\n", engine.model_version());

            for entry in &snapshot.entries {
                let name = format!("{} vs {}", entry.fixture.home_team, entry.fixture.away_team);
                match engine.score(&entry.fixture, Some(&entry.odds)) {
                    Ok(prediction) => {
                        let p = &prediction.probabilities;
                        println!(
                            "{name}: home {:.1}%, draw {:.1}%, away {:.1}%",
                            p.home_win * 100.0,
                            p.draw * 100.0,
                            p.away_win * 100.0
                        );
                    }
                    Err(e) => println!("{name}: no prediction ({e})"),
                }
            }
            if snapshot.entries.is_empty() {
                println!("No fixtures in snapshot.");
            }
        }
    }

    Ok(())
}
