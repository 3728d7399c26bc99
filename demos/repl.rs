//! Interactive shell and batch runner for operator-last programs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use oplast::Program;
use oplast::ast::Value;
use oplast::evaluator::Environment;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "repl", about = "Operator-last S-expression interpreter")]
struct Args {
    /// Program file to run instead of starting the interactive shell
    file: Option<PathBuf>,

    /// Log parsing and evaluation at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    match args.file {
        Some(path) => run_file(&path),
        None => run_repl(),
    }
}

fn run_file(path: &Path) -> Result<()> {
    info!("Running {}", path.display());
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    // Interpreter errors hold environments, which are not thread-safe
    let output = Program::new(&source)
        .and_then(|mut program| program.eval())
        .map_err(|e| anyhow!("{e}"))?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn run_repl() -> Result<()> {
    println!("Operator-last S-expression interpreter");
    println!("Enter expressions like: (3 4 +)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().context("Could not initialize REPL")?;
    let mut program = Program::repl();

    loop {
        match rl.readline("oplast> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(program.env());
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                match program.run_statement(line) {
                    Ok(output) if output.is_empty() => {}
                    Ok(output) => println!("{output}"),
                    Err(e) => println!("Error: {e}"),
                }
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("The operator comes last in every form:");
    println!("  (3 4 +)                              ; 7");
    println!("  (x 5 define)                         ; bind x");
    println!("  ((1 2 3) quote)                      ; '(1 2 3)");
    println!("  (sq ((x) (x x *) lambda) define)     ; define a function");
    println!("  (6 sq)                               ; 36");
    println!("  (((5 0 <) neg) (true pos) cond)      ; pos");
    println!();
    println!("Primitives: + - * / < > eq? car cdr cons print");
    println!("Special forms: quote atom? define lambda cond");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    let mut primitives = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Primitive { .. } => primitives.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !primitives.is_empty() {
        println!("Primitives ({}):", primitives.len());
        let mut col = 0;
        for name in primitives {
            print!("  {name:<10}");
            col += 1;
            if col % 6 == 0 {
                println!();
            }
        }
        if col % 6 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("Values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
