//! Clap command tree definition.
//!
//! Builds the `clap::Command` tree for the `kvprobe` binary. The hidden
//! `--child` flag is how an isolated run re-invokes itself for one
//! scenario.

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, Command};

use kvprobe_storage::testing::FAULT_NAMES;
use kvprobe_storage::BACKEND_NAMES;

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("kvprobe")
        .about("Deadline-guarded stress harness for embeddable key-value stores")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log at debug level (RUST_LOG overrides)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(build_list())
        .subcommand(build_run())
        .subcommand(build_config())
}

fn build_list() -> Command {
    Command::new("list").about("List the built-in scenarios")
}

fn build_config() -> Command {
    Command::new("config").about("Print the default kvprobe.toml")
}

fn build_run() -> Command {
    Command::new("run")
        .about("Run scenarios against a backend")
        .arg(
            Arg::new("scenario")
                .long("scenario")
                .short('s')
                .help("Scenario to run (repeatable; default: all)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .short('b')
                .help("Backend under test (default: from config, else memory)")
                .value_parser(PossibleValuesParser::new(BACKEND_NAMES.iter().copied())),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Config file (default: ./kvprobe.toml if present)"),
        )
        .arg(
            Arg::new("work-dir")
                .long("work-dir")
                .help("Parent directory for scenario stores (default: system temp)"),
        )
        .arg(
            Arg::new("size-divisor")
                .long("size-divisor")
                .help("Divide every value size by N for smoke runs")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("deadline")
                .long("deadline")
                .help("Bound every scenario and replace step deadlines, in seconds")
                .long_help(
                    "Bound every scenario and replace step deadlines, in seconds. \
                     Without it, a scenario with no deadline of its own runs unbounded, \
                     and so does its child process.",
                )
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("fault")
                .long("fault")
                .help("Inject a fault into the backend (repeatable)")
                .value_parser(PossibleValuesParser::new(FAULT_NAMES.iter().copied()))
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("in-process")
                .long("in-process")
                .help("Run every scenario in this process instead of one child each")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print reports as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("child")
                .long("child")
                .help("Run exactly one scenario and print its report as one JSON line")
                .action(ArgAction::SetTrue)
                .hide(true),
        )
}
