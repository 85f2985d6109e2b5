// Copyright 2026 Dropcart Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use dropcart_runtime::cli;

#[derive(Parser)]
#[command(
    name = "dropcart",
    about = "Dropcart: storefront checkout automation",
    version,
    after_help = "Run 'dropcart <command> --help' for details on each command."
)]
struct Cli {
    /// Output results and logs as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Log level filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Config file (defaults to $DROPCART_CONFIG, ./dropcart.json, ~/.dropcart/config.json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start task groups and feed automations
    Run {
        /// Only start these groups (repeatable; default all)
        #[arg(long = "group")]
        groups: Vec<String>,
        /// Read feed messages from stdin, one JSON object per line
        #[arg(long)]
        feed_stdin: bool,
        /// Print task events to stdout as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Validate the config file and summarize it
    Check,
    /// Show how monitor inputs are interpreted
    Classify {
        /// Variant ids, product URLs or keyword expressions
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Product title to test keyword expressions against
        #[arg(long)]
        title: Option<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(json: bool, level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::output::set_json(cli.json);
    init_tracing(cli.json, &cli.log_level);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run {
            groups,
            feed_stdin,
            events,
        } => cli::run_cmd::run(config, &groups, feed_stdin, events).await,
        Commands::Check => cli::check_cmd::run(config).await,
        Commands::Classify { inputs, title } => {
            cli::classify_cmd::run(&inputs, title.as_deref()).await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "dropcart", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
