use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use ecg_clinic::config::Config;
use ecg_clinic::shell::{Flow, Shell};
use ecg_clinic::Dashboard;

/// Terminal clinic dashboard: patients, ECG images and review notes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.ecgclinic/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Login service base URL, overriding the config file
    #[arg(long)]
    api_url: Option<String>,

    /// Never fall back to the demo credentials
    #[arg(long)]
    no_demo_fallback: bool,

    /// Write the effective config back to the config file and exit
    #[arg(long)]
    save_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = match args.config {
        Some(ref path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_or_default(&config_path);
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if args.no_demo_fallback {
        config.demo_fallback = false;
    }

    if args.save_config {
        config.save(&config_path)?;
        println!("Config written to {:?}", config_path);
        return Ok(());
    }

    info!("Config: {:?}", config_path);
    info!("Login service: {}", config.api_base_url);

    let dashboard = Dashboard::from_config(&config).context("Failed to start dashboard")?;
    let mut shell = Shell::new(dashboard).with_progress(|notice| println!("{}", notice));
    print!("{}", shell.banner());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", shell.prompt());
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };

        let output = shell.execute(&line).await;
        if !output.text.is_empty() {
            println!("{}", output.text.trim_end());
        }
        if output.flow == Flow::Quit {
            break;
        }
        if output.session_changed {
            println!("[{}]", shell.status_line());
        }
    }

    info!(
        "Dashboard closed with {} patient(s) in memory (not saved)",
        shell.dashboard().registry().len()
    );
    Ok(())
}
