//! stagehand binary entry point.

use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stagehand::cli::{self, Cli};
use stagehand::ui::output;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr. `STAGEHAND_LOG` takes precedence over `RUST_LOG`; with
/// neither set, only warnings are shown unless `--debug` was given.
fn init_tracing(debug: bool) {
    let default = if debug { "stagehand=debug" } else { "warn" };
    let filter = std::env::var("STAGEHAND_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}
