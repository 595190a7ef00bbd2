use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, NamedSource, Report, Result};

use dism::{Diagnostics, RunState};

/// Lex, parse and run programs written in the DISM assembly language.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.dism` file to run
    path: Option<PathBuf>,

    /// Log more about what is going on (repeat for more detail)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run a `.dism` file and output to terminal
    Run {
        /// `.dism` file to run
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Abort after this many executed instructions [env: DISM_MAX_STEPS]
        #[arg(long)]
        max_steps: Option<u64>,
    },
    /// Check a `.dism` file for syntax errors without running it
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print the token stream of a `.dism` file, one token per line
    Tokens {
        /// File to tokenize
        name: PathBuf,
    },
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    init_logging(args.verbose);
    dism::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(dism::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    match args.command {
        Some(Command::Run {
            name,
            minimal,
            max_steps,
        }) => run(&name, minimal, max_steps.or_else(dism::env::max_steps)),
        Some(Command::Check { name }) => {
            file_message(Green, "Checking", &name);
            let src = fs::read_to_string(&name).into_diagnostic()?;
            let program = match dism::assemble(&src) {
                Ok(program) => program,
                Err(diag) => return Err(report_syntax(&name, &src, diag)),
            };
            let summary = format!(
                "{} instructions, {} labels",
                program.len(),
                program.labels().len()
            );
            message(Green, "Success", &summary);
            Ok(())
        }
        Some(Command::Tokens { name }) => {
            let src = fs::read_to_string(&name).into_diagnostic()?;
            let mut diag = Diagnostics::new();
            let toks = dism::lexer::lex(&src, &mut diag);
            if diag.had_error() {
                return Err(report_syntax(&name, &src, diag));
            }
            for tok in toks {
                println!("{tok}");
            }
            Ok(())
        }
        None => {
            if let Some(path) = args.path {
                run(&path, false, dism::env::max_steps())
            } else {
                println!("\n~ dism v{VERSION} ~");
                println!("{SHORT_INFO}");
                Ok(())
            }
        }
    }
}

fn run(name: &Path, minimal: bool, max_steps: Option<u64>) -> Result<()> {
    if !minimal {
        file_message(MsgColor::Green, "Assembling", name);
    }
    let src = fs::read_to_string(name).into_diagnostic()?;
    let program = match dism::assemble(&src) {
        Ok(program) => program,
        Err(diag) => return Err(report_syntax(name, &src, diag)),
    };

    if !minimal {
        message(MsgColor::Green, "Running", "program");
    }
    let mut state = RunState::new(program).with_step_limit(max_steps);
    let halt = match state.run() {
        Ok(halt) => halt,
        Err(fault) => {
            if !minimal {
                file_message(MsgColor::Red, "Aborted", name);
            }
            return Err(Report::new(fault).with_source_code(source_for(name, src)));
        }
    };

    if !minimal {
        message(MsgColor::Cyan, "Halted", &format!("with code {}", halt.code));
        file_message(MsgColor::Green, "Completed", name);
    }
    std::process::exit(halt.exit_status())
}

/// Print every syntax error with its source context and return a summary error.
fn report_syntax(name: &Path, src: &str, diag: Diagnostics) -> Report {
    let count = diag.len();
    for error in diag {
        let report = Report::new(error).with_source_code(source_for(name, src.to_string()));
        eprintln!("{report:?}");
    }
    miette::miette!("Aborting due to {count} syntax error(s)")
}

fn source_for(name: &Path, src: String) -> NamedSource<String> {
    NamedSource::new(name.display().to_string(), src)
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .ok();
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

const SHORT_INFO: &str = r"
Welcome to dism, a small virtual machine for the DISM assembly language.
Run a program with `dism <file>`, or use `-h` or `--help` for the full usage instructions.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
