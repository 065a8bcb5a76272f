use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use stencil_cli::{LOG_ENV, WatchOptions, check_cmd, render_cmd, watch_cmd};

#[derive(Parser)]
#[command(name = "stencil", version, about = "Stencil template CLI")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); STENCIL_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template against a JSON scope and print the HTML.
    Render {
        template: PathBuf,
        /// JSON file with the scope object
        #[arg(long)]
        scope: Option<PathBuf>,
        /// Directive attribute prefix (default `*`)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Compile a template and print its instruction outline.
    Check {
        template: PathBuf,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Re-render whenever the scope file changes.
    Watch {
        template: PathBuf,
        #[arg(long)]
        scope: PathBuf,
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 200)]
        interval: u64,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
        #[arg(long)]
        prefix: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Render {
            template,
            scope,
            prefix,
        } => println!("{}", render_cmd(&template, scope.as_deref(), prefix.as_deref())?),
        Commands::Check { template, prefix } => {
            print!("{}", check_cmd(&template, prefix.as_deref())?)
        }
        Commands::Watch {
            template,
            scope,
            interval,
            duration,
            prefix,
        } => {
            let opts = WatchOptions {
                interval: Duration::from_millis(interval),
                duration: duration.map(Duration::from_secs),
                prefix,
            };
            let renders = watch_cmd(&template, &scope, &opts, &mut std::io::stdout())?;
            tracing::info!(renders, "watch finished");
        }
    }
    Ok(())
}
