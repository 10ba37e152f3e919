//! kvprobe: run stress scenarios against embeddable key-value stores.
//!
//! - `kvprobe list`: show the built-in scenarios
//! - `kvprobe run`: run scenarios, one child process each by default
//! - `kvprobe config`: print a commented default `kvprobe.toml`
//!
//! Exit status is 0 only when every scenario completed ok, 1 when any
//! failed or timed out, and 2 on a usage or setup error.

mod commands;
mod format;
mod run;

use std::process;

use clap::ArgMatches;
use tracing_subscriber::EnvFilter;

use kvprobe_harness::{scenario, HarnessConfig};

use commands::build_cli;
use format::{format_scenarios, format_summary, OutputMode};
use run::{run_child, run_scenarios, RunOptions};

fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_count("verbose"));

    let code = match matches.subcommand() {
        Some(("list", _)) => {
            print!("{}", format_scenarios(&scenario::builtin()));
            0
        }
        Some(("config", _)) => {
            print!("{}", HarnessConfig::default_toml());
            0
        }
        Some(("run", sub)) => cmd_run(sub),
        _ => 2,
    };
    process::exit(code);
}

fn init_logging(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(matches: &ArgMatches) -> i32 {
    let options = match RunOptions::from_matches(matches) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return 2;
        }
    };

    if options.child {
        // Exit right after printing so abandoned threads die with us.
        return match run_child(&options) {
            Ok(line) => {
                println!("{}", line);
                0
            }
            Err(e) => {
                eprintln!("{}", e);
                2
            }
        };
    }

    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    match run_scenarios(&options) {
        Ok(summary) => {
            println!("{}", format_summary(&summary, mode));
            summary.exit_code()
        }
        Err(e) => {
            eprintln!("{}", e);
            2
        }
    }
}
