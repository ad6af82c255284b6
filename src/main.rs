//! cmd-harness binary entry point.

use std::process::ExitCode;

use cmd_harness::cli::{self, Args};
use cmd_harness::config::Config;
use cmd_harness::process::CommandLine;
use cmd_harness::{logging, CommandResult};
use tracing::{debug, error};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Run 'cmd-harness --help' for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    logging::init(config.log_filter());

    let Some(command) = args.command_line() else {
        cli::print_help();
        return ExitCode::from(2);
    };

    match run(command, &args, &config).await {
        Ok(result) => {
            print_result(&args, &result);
            exit_code(result.status)
        }
        Err(e) => {
            eprintln!("error: {e}");
            exit_code(e.status().unwrap_or(1))
        }
    }
}

async fn run(command: CommandLine, args: &Args, config: &Config) -> cmd_harness::Result<CommandResult> {
    let mut opts = config
        .to_run_options()
        .ignore_status(args.ignore_status)
        .output_log(args.log_output);

    if let Some(ref sysroot) = args.sysroot {
        opts = opts.native_sysroot(sysroot.clone());
    }
    if let Some(ref target) = args.target_sys {
        opts = opts.target_sys(target.clone());
    }
    if let Some(ref path) = args.input {
        opts = opts.input(std::fs::read(path)?);
    }

    let mut runner = opts.runner.clone();
    if let Some(ref cwd) = args.cwd {
        runner = runner.working_dir(cwd.clone());
    }
    if args.split_stderr {
        runner = runner.separate_stderr();
    }
    opts = opts.runner(runner);

    debug!(%command, "running from command line");
    config.to_executor().run_cmd_async(command, opts).await
}

fn print_result(args: &Args, result: &CommandResult) {
    if args.json {
        match serde_json::to_string_pretty(result) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("failed to serialize result: {e}"),
        }
        return;
    }

    // Lines were already logged as they arrived.
    if !args.log_output && !result.output.is_empty() {
        println!("{}", result.output);
    }
    if !result.error.is_empty() {
        eprintln!("{}", result.error);
    }
}

/// Shell-style exit code: signals map to 128 + signal number.
fn exit_code(status: i32) -> ExitCode {
    let code = match status {
        0..=255 => status,
        s if s < 0 => 128 + s.unsigned_abs().min(127) as i32,
        _ => 1,
    };
    ExitCode::from(code as u8)
}
