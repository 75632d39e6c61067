mod checks;
mod cli;
mod collectors;
mod config;
mod error;
mod evaluate;
mod perfdata;
mod report;
mod state;

use clap::error::ErrorKind;
use clap::Parser;
use cli::Cli;
use collectors::LiveProbes;
use config::Config;
use error::ProbeError;
use report::Report;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Title used when no check could be resolved from the arguments.
const PROGRAM_TITLE: &str = "APPLIANCE-HEALTH";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => err.exit(),
            _ => report::emit(&Report::unknown(
                PROGRAM_TITLE,
                &ProbeError::config(argument_error(&err)),
            )),
        },
    };
    init_tracing(cli.verbose);

    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }
    let Some(product) = cli.product else {
        report::emit(&Report::unknown(
            PROGRAM_TITLE,
            &ProbeError::config("a product subcommand (core, devices, sentry) is required"),
        ));
    };

    let file = match &cli.config {
        Some(path) => Config::load_from_file(path),
        None => Ok(Config::default()),
    };
    let cfg = match file.and_then(|file| file.resolve(&product)) {
        Ok(cfg) => cfg,
        Err(err) => report::emit(&Report::unknown(PROGRAM_TITLE, &err.into())),
    };
    debug!(host = %cfg.host, check = ?cfg.check, "resolved configuration");

    let report = checks::run(&cfg, &LiveProbes).await;
    report::emit(&report);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// First line of a clap error without its `error: ` prefix.
fn argument_error(err: &clap::Error) -> String {
    let text = err.to_string();
    let line = text.lines().next().unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).trim().to_string()
}
