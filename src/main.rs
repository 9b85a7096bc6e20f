use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transitq::cli::commands;
use transitq::cli::{CommandContext, OutputFormat};

#[derive(Parser)]
#[command(name = "transitq")]
#[command(
    version,
    about = "Ask questions about a GTFS transit schedule in plain language"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Extra config file merged after the project config
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question about the schedule
    Ask {
        #[arg(help = "Chat message")]
        message: String,
        #[arg(long, help = "JSON file with prior turns [{role, content}]")]
        history: Option<PathBuf>,
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Generate and print the agent schema
    Schema {
        #[arg(long, help = "Regenerate even if a cached schema is fresh")]
        refresh: bool,
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Create the GTFS tables in the configured database
    Init {
        #[arg(long, help = "Load the bundled sample feed into an empty database")]
        sample: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show configuration file paths
    Path,
    /// Write a default configuration file
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mtransitq encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let load_context = || CommandContext::load(cli.config.as_deref());

    match &cli.command {
        Commands::Ask {
            message,
            history,
            format,
        } => {
            let ctx = load_context()?;
            let rt = Runtime::new()?;
            rt.block_on(commands::ask::run(
                &ctx,
                message,
                history.as_deref(),
                *format,
            ))?;
        }
        Commands::Schema { refresh, format } => {
            let ctx = load_context()?;
            let rt = Runtime::new()?;
            rt.block_on(commands::schema::run(&ctx, *refresh, *format))?;
        }
        Commands::Init { sample } => {
            let ctx = load_context()?;
            commands::init::run(&ctx, *sample)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                let ctx = load_context()?;
                commands::config::show(&ctx, *format)?;
            }
            ConfigAction::Path => commands::config::path()?,
            ConfigAction::Init { global, force } => commands::config::init(*global, *force)?,
        },
    }

    Ok(())
}
