use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

use schwa::{CompileOptions, Engine, Repl, SchwaError};

#[derive(Parser)]
#[command(author, version, about = "Schwa expression language")]
struct Args {
    /// Require closing brackets to match their opener
    #[arg(long, global = true)]
    strict_brackets: bool,
    /// Deepest expression nesting the compiler accepts
    #[arg(long, global = true)]
    max_depth: Option<usize>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a single expression and print its value
    Eval { source: String },
    /// Evaluate every top-level expression in a file
    Run { script: PathBuf },
    /// Print the token trees read from a file
    Tokens { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    match execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(args: Args) -> Result<(), SchwaError> {
    let mut options = CompileOptions {
        strict_brackets: args.strict_brackets,
        ..CompileOptions::default()
    };
    if let Some(max_depth) = args.max_depth {
        options.max_depth = max_depth;
    }
    let engine = Engine::with_options(options);
    match args.command.unwrap_or(Command::Repl) {
        Command::Eval { source } => {
            let value = engine.compile(&source)?.invoke()?;
            println!("{value}");
        }
        Command::Run { script } => {
            for value in engine.run_file(&script)? {
                println!("{value}");
            }
        }
        Command::Tokens { script } => {
            for token in engine.read_file(&script)? {
                println!("{token}");
            }
        }
        Command::Repl => Repl::new(engine).run()?,
    }
    Ok(())
}
