//! Nucleus CLI: execute files, evaluate snippets or run the REPL.

use std::env;
use std::fs;
use std::process;

use colored::Colorize;

use nucleus::error::ExitCode;
use nucleus::repl::Repl;
use nucleus::{Atomizer, Config};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    config: Config,
}

fn print_usage() {
    eprintln!("Nucleus {} - Nucleus language runtime", VERSION);
    eprintln!();
    eprintln!("Usage: nuc [options] [script.nuc]");
    eprintln!("       nuc [options] -e <code>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>       Evaluate code directly");
    eprintln!("  --disassemble   Print the bytecode of every script before running it");
    eprintln!("  --gc-stress     Collect garbage at every safe point");
    eprintln!("  --no-color      Disable colored diagnostics");
    eprintln!("  --version, -v   Show the version");
    eprintln!("  --help, -h      Show this help message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  NUC_GC_STRESS, NUC_LOG_GC, NUC_TRACE, NUC_PRINT_CODE, NUC_NO_COLOR");
    eprintln!("  NUC_GC_THRESHOLD=<bytes>");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  nuc                           Start interactive REPL");
    eprintln!("  nuc script.nuc                Run a script file");
    eprintln!("  nuc -e 'std.print(1 + 1);'    Evaluate code directly");
}

/// Print a usage error and exit with the command exit code.
fn usage_error(message: &str) -> ! {
    eprintln!("{} {}", "Usage Error:".red().bold(), message);
    print_usage();
    process::exit(ExitCode::Cmd.into());
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut options = Options {
        command: Command::Repl,
        config: Config::from_env(),
    };

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--version" | "-v" => {
                println!("nuc {}", VERSION);
                process::exit(0);
            }
            "--disassemble" => options.config.print_code = true,
            "--gc-stress" => options.config.gc_stress = true,
            "--no-color" => options.config.color = false,
            "-e" => {
                i += 1;
                if i >= args.len() {
                    usage_error("-e requires a code argument");
                }
                if !matches!(options.command, Command::Repl) {
                    usage_error("-e cannot be combined with a script file");
                }
                options.command = Command::Eval {
                    code: args[i].clone(),
                };
            }
            _ if arg.starts_with('-') => usage_error(&format!("Unknown option: {}", arg)),
            _ => {
                if !matches!(options.command, Command::Repl) {
                    usage_error("Only one script file can be specified");
                }
                options.command = Command::Run { file: arg.clone() };
            }
        }
        i += 1;
    }

    options
}

fn main() {
    let options = parse_args();
    if !options.config.color {
        colored::control::set_override(false);
    }

    match options.command {
        Command::Repl => Repl::new(options.config).run(),
        Command::Run { file } => run_file(&file, options.config),
        Command::Eval { code } => run_source(&code, options.config),
    }
}

fn run_file(path: &str, config: Config) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!(
                "{} Could not read \"{}\": {}",
                "IO Error:".red().bold(),
                path,
                e
            );
            process::exit(ExitCode::Io.into());
        }
    };

    run_source(&source, config);
}

fn run_source(source: &str, config: Config) {
    let status = Atomizer::with_config(config).compile_and_run(source);
    process::exit(status.code());
}
