//! Command-line runner: execute a serialized program or evaluate one
//! expression from the shell.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use tabula_program::{InstructionRecord, Kind, OpGroup, Program};
use tabula_runtime::{
    evaluate_standalone, resolve, AbortReason, Error, ExitStatus, Host, Result, Runtime,
    RuntimeContext,
};

#[derive(Parser)]
#[command(name = "tabula-run", about = "Run a compiled Tabula program")]
struct Cli {
    /// Program file (JSON-serialized record table).
    program: Option<PathBuf>,

    /// Evaluate one expression and print the result instead of running.
    #[arg(long)]
    eval: Option<String>,

    /// Result kind for --eval: text, decimal, date, int, real.
    #[arg(long, default_value = "decimal")]
    kind: String,
}

/// Console-only host: console group writes go to stdout, everything else
/// refuses. Window and field access need a full environment.
#[derive(Debug, Default)]
struct ConsoleHost;

// In-group numbers of the console write instructions.
const CON_WRITE_LINE: u8 = 1;
const CON_WRITE: u8 = 2;
const CON_NEWLINE: u8 = 3;

impl Host for ConsoleHost {
    fn group(
        &mut self,
        group: OpGroup,
        ctx: &mut RuntimeContext,
        program: &Program,
        record: &InstructionRecord,
    ) -> Result<()> {
        if group != OpGroup::Console {
            return Err(Error::Unsupported(group.name()));
        }
        match record.opcode.number() {
            CON_WRITE_LINE => {
                let value =
                    resolve::read_arg_simple(ctx, program, &record.args[0], record.args[0].kind)?;
                println!("{value}");
                Ok(())
            }
            CON_WRITE => {
                let value =
                    resolve::read_arg_simple(ctx, program, &record.args[0], record.args[0].kind)?;
                print!("{value}");
                let _ = std::io::stdout().flush();
                Ok(())
            }
            CON_NEWLINE => {
                println!();
                Ok(())
            }
            _ => Err(Error::Unsupported("console operation")),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    if let Some(source) = cli.eval {
        let Ok(kind) = cli.kind.parse::<Kind>() else {
            eprintln!("unknown kind {:?}", cli.kind);
            return ExitCode::FAILURE;
        };
        return match evaluate_standalone(&source, kind) {
            Ok(value) => {
                println!("{value}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let Some(path) = cli.program else {
        eprintln!("nothing to do: pass a program file or --eval");
        return ExitCode::FAILURE;
    };
    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("cannot read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let program: Program = match serde_json::from_str(&data) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("cannot parse {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let mut runtime = match Runtime::load(program) {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("cannot load program: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut host = ConsoleHost;
    match runtime.run(&mut host) {
        ExitStatus::Completed => {
            info!("program completed");
            ExitCode::SUCCESS
        }
        ExitStatus::Aborted(AbortReason::Requested) => ExitCode::SUCCESS,
        ExitStatus::Aborted(AbortReason::FatalError { code, line }) => {
            eprintln!("aborted: error {code} at line {line}");
            ExitCode::FAILURE
        }
        ExitStatus::ChainRequested { target, .. } => {
            eprintln!("chain requested: {target}");
            ExitCode::SUCCESS
        }
    }
}
