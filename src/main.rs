//! Record database test harness CLI
//!
//! Runs every test program against the example dataset and prints TAP to
//! stdout, followed by a summary.

use std::io::{self, IsTerminal};

use clap::Parser;
use recdb_harness::common::{config::Config, logging};
use recdb_harness::tap::Harness;
use recdb_harness::testing::{self, DatasetPaths};

#[derive(Parser)]
#[command(name = "recdb-test", about = "Run record database test programs")]
#[command(version, long_about = None)]
struct Cli {}

fn main() {
    logging::init_cli();
    let _cli = Cli::parse();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn run() -> recdb_harness::Result<i32> {
    let config = Config::load()?;
    let paths = DatasetPaths::from_config(&config);
    tracing::debug!(schema = %paths.schema, instance = %paths.instance, "search paths");

    let stdout = io::stdout();
    let color = config.output.color && stdout.is_terminal();
    let mut harness = Harness::new(stdout.lock()).with_color(color);

    testing::run_all(&mut harness, &paths)?;
    let code = harness.finish()?;

    if let Some(report) = &config.output.report {
        harness.write_report(report)?;
    }
    Ok(code)
}
