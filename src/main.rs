use anyhow::Result;
use clap::{CommandFactory, Parser};
use narrate::app::{apply_cli_overrides, load_config, print_summary, print_voices, run_generation};
use narrate::cli::{Cli, Commands};
use narrate::config::Config;
use narrate::diagnostics::run_checks;
use narrate::error::NarrateError;
use owo_colors::OwoColorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Exit status after Ctrl+C, as shells report for SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // A missing .env is fine; the credential may come from the environment
    dotenv::dotenv().ok();
    init_tracing(cli.quiet, cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if matches!(
                e.downcast_ref::<NarrateError>(),
                Some(NarrateError::Interrupted)
            ) {
                eprintln!("{}", "Interrupted, temporary files removed".yellow());
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            eprintln!("{} {e:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "narrate",
                &mut std::io::stdout(),
            );
        }
        Some(Commands::Check) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let loaded =
                load_config(cli.config.as_deref()).map(|config| apply_cli_overrides(config, &cli));
            if !run_checks(loaded, &path) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Some(Commands::Voices) => {
            let config = apply_cli_overrides(load_config(cli.config.as_deref())?, &cli);
            print_voices(&config);
        }
        None | Some(Commands::Whole | Commands::Stitch | Commands::Chunks) => {
            let config = apply_cli_overrides(load_config(cli.config.as_deref())?, &cli);
            let report = run_generation(config).await?;
            print_summary(&report);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Map `-q` / `-v` / `-vv` to a filter; `RUST_LOG` wins when set.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,narrate={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
