mod cli;
mod commands;
mod error;
mod relay;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

const DEFAULT_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// `-v` beats the configured level.
fn level_for(verbosity: u8, configured: &str) -> &str {
    match verbosity {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Install the subscriber before anything logs.
///
/// Returns a handle for applying the configured level once the config is
/// loaded, or `None` when `RUST_LOG` pins the filter.
fn init_tracing(verbosity: u8, json: bool) -> Option<FilterHandle> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let filter =
        from_env.unwrap_or_else(|| filter_for(level_for(verbosity, DEFAULT_LOG_LEVEL)));
    let (filter, handle) = reload::Layer::new(filter);

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(layer.json()).init();
    } else {
        registry.with(layer).init();
    }

    (!pinned).then_some(handle)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let filter = init_tracing(cli.global.verbose, cli.global.log_json);

    match cli.command {
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "nvrlink", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let path = cli
                .global
                .config
                .clone()
                .unwrap_or_else(nvrlink_config::config_path);
            if !path.exists() {
                return Err(CliError::NoConfig {
                    path: path.display().to_string(),
                });
            }

            let config = nvrlink_config::load_config(Some(&path))?;
            if let Some(filter) = filter {
                let level = level_for(cli.global.verbose, &config.defaults.log_level);
                if let Err(e) = filter.reload(filter_for(level)) {
                    tracing::warn!(error = %e, "could not apply configured log level");
                }
            }

            tracing::debug!(command = ?cmd, path = %path.display(), "dispatching command");
            commands::dispatch(cmd, config, &cli.global).await
        }
    }
}
