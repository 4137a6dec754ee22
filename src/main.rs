//! CLI entry point for `mail2fax`.
//!
//! Reads one raw mail message from stdin, assembles fax pages and spools
//! them. Designed to sit behind procmail: exit code 0 means the message was
//! handled (including "nothing to fax"), anything else is a failure.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::error;

use mail2fax::config::{self, Settings};
use mail2fax::dispatch::FaxSpool;
use mail2fax::pipeline::{Pipeline, RunOutcome};
use mail2fax::render::{CommandRenderer, TiffSplitter};

#[derive(Parser)]
#[command(
    name = "mail2fax",
    version,
    about = "E-mail to fax relay for procmail and mgetty-fax"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Fax profile selecting the destination settings
    #[arg(value_name = "PROFILE")]
    profile: Option<String>,

    /// Configuration file
    #[arg(long, value_name = "FILE", env = "MAIL2FAX_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            cmd_completions(shell);
            return ExitCode::SUCCESS;
        }
        Some(Commands::Manpage) => {
            if let Err(e) = cmd_manpage() {
                eprintln!("mail2fax: {e:#}");
                return ExitCode::FAILURE;
            }
            return ExitCode::SUCCESS;
        }
        None => {}
    }

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    setup_logging(log_level);

    let file = config::load_config(cli.config.as_ref());
    let settings = Settings::resolve(&file, cli.profile.as_deref().unwrap_or(""));

    let renderer = CommandRenderer;
    let splitter = TiffSplitter;
    let dispatcher = FaxSpool;
    let pipeline = Pipeline::new(&settings, &renderer, &splitter, &dispatcher);

    match pipeline.run_from_reader(std::io::stdin().lock()) {
        Ok(RunOutcome::Dispatched { pages }) => {
            tracing::debug!(pages, "Done");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::NothingToFax) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Relay run failed");
            ExitCode::FAILURE
        }
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mail2fax.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn cmd_completions(shell: clap_complete::Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}

fn cmd_manpage() -> anyhow::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    std::io::stdout().write_all(&buffer)?;
    Ok(())
}
