use podkiln::cli::commands::{CliArgs, Commands};
use podkiln::cli::handlers::{handle_build, handle_inspect};
use podkiln::util::logging::{self, LoggingConfig};
use podkiln::{NAME, VERSION};

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Build(build_args) => handle_build(build_args, args.quiet).await,
        Commands::Inspect(inspect_args) => handle_inspect(inspect_args).await,
    };

    std::process::exit(exit_code);
}

/// Level precedence: `--log-level`, then `-v`/`-q`, then `PODKILN_LOG_LEVEL`.
fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        logging::parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("PODKILN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        logging::parse_level(&level_str)
    };

    let use_json = env::var("PODKILN_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    logging::init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}
