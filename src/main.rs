use clap::Parser;
use report_tree::cli::commands;
use report_tree::cli::{Cli, Commands};
use report_tree::config;
use report_tree::logging::init_logging;
use report_tree::{ReportError, StructuredError};
use std::io::{self, IsTerminal};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.json) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let overrides = build_cli_overrides(&cli);

    let result = match &cli.command {
        Commands::Build(args) => commands::build::execute(args, cli.json, &overrides),
        Commands::Merge(args) => commands::merge::execute(args, cli.json, &overrides),
        Commands::Show(args) => commands::show::execute(args, cli.json, &overrides),
        Commands::Stats(args) => commands::stats::execute(args, cli.json, &overrides),
    };

    if let Err(e) = result {
        handle_error(&e, cli.json);
    }
}

/// Print the error (JSON when --json is set or stdout is not a TTY) and exit.
fn handle_error(err: &ReportError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);

    if json_mode || !io::stdout().is_terminal() {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        eprintln!("{}", structured.to_human(io::stderr().is_terminal()));
    }

    std::process::exit(structured.exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    config::CliOverrides {
        report_dir: cli.report_dir.clone(),
        ..config::CliOverrides::default()
    }
}
