use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SimulationSpec;
use crate::headless::{simulate, SimulationReport};
use crate::state::LoadStatus;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace tags in a scene document and run the controller headless
    Simulate {
        /// Simulation spec JSON (scene path, tags, data snapshot, schedule)
        #[arg(long)]
        spec: PathBuf,
    },

    /// Run the development relay server
    #[cfg(feature = "dev-relay")]
    Relay {
        /// Port to listen on
        #[arg(long, default_value_t = 3001)]
        port: u16,

        /// Origin used for paths without an encoded host
        #[arg(long, default_value = crate::relay::DEFAULT_FALLBACK)]
        fallback: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { spec } => {
            let spec = SimulationSpec::from_file(&spec)
                .with_context(|| format!("Failed to load simulation spec {:?}", spec))?;
            let report = simulate(&spec)?;
            print_report(&report);
        }
        #[cfg(feature = "dev-relay")]
        Commands::Relay { port, fallback } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(crate::relay::serve(port, fallback))?;
        }
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    match report.activated_at {
        Some(poll) => println!(
            "Controller {:?} after poll {} ({} frames)",
            report.state,
            poll + 1,
            report.frames
        ),
        None => println!(
            "Controller still {:?}: scene never finished loading ({} frames)",
            report.state, report.frames
        ),
    }

    for object in &report.objects {
        let status = match &object.load_status {
            LoadStatus::Unloaded => "loading".to_string(),
            LoadStatus::Loaded => "loaded".to_string(),
            LoadStatus::Failed(reason) => format!("failed: {}", reason),
        };
        println!(
            "  {:<20} {:<24} state='{}'{}",
            object.name,
            status,
            object.state,
            if object.visible { "" } else { " (hidden)" }
        );
    }
}
