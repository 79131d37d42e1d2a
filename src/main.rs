use clap::Parser;
use form_sentinel::cli::commands::{cmd_analyze, cmd_resolve};
use form_sentinel::cli::config::{Cli, Commands, apply_overrides};
use form_sentinel::config::load_config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Resolve settings: CLI > config > defaults
    let config = apply_overrides(load_config(cli.config.as_deref()), &cli);

    match cli.command {
        Commands::Analyze {
            snapshot,
            url,
            site,
            force_refresh,
        } => {
            cmd_analyze(
                snapshot.as_deref(),
                url.as_deref(),
                site.as_deref(),
                force_refresh,
                config,
                cli.verbose,
            )?;
        }
        Commands::Resolve {
            url,
            purpose,
            hints,
            analyze_first,
        } => {
            cmd_resolve(&url, &purpose, &hints, analyze_first, config, cli.verbose)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v` raises the level from warn.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("form_sentinel={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
