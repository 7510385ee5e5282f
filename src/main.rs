use std::io::Write;

use clap::{Args, Parser, Subcommand};
use tinyscript::tree_walk_interpreter::{Interpreter, Value};

#[derive(Debug, Parser)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a source file
    Run(FileArgs),
    /// Start an interactive session
    Repl,
    /// Print the token stream of a source file
    Tokens(FileArgs),
    /// Print the parsed program of a source file
    Ast(FileArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    file: String,
}

fn main() {
    let args = Cli::parse();

    let result = match args.command() {
        Command::Repl => repl_command(),
        Command::Run(args) => run_command(args),
        Command::Tokens(args) => tokens_command(args),
        Command::Ast(args) => ast_command(args),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Tokenize(#[from] tinyscript::tokenizer::TokenizeError),
    #[error(transparent)]
    Script(#[from] tinyscript::Error),
}

fn read_source(path: &str) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_string(),
        source,
    })
}

fn repl_command() -> Result<(), CliError> {
    println!("Welcome to the tinyscript REPL!");
    println!("EOF to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let mut interpreter = Interpreter::default();
    let mut input = String::new();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let read = std::io::stdin().read_line(&mut input)?;

        if read == 0 {
            break;
        }

        let result = tinyscript::create_ast(input.trim())
            .and_then(|program| tinyscript::evaluate(&program, &mut interpreter));
        match result {
            Ok(Value::Null) => {}
            Ok(value) => println!("{}", value),
            Err(e) => println!("Error: {}", e),
        }

        input.clear()
    }

    Ok(())
}

fn run_command(args: &FileArgs) -> Result<(), CliError> {
    let source = read_source(&args.file)?;
    let program = tinyscript::create_ast(&source)?;
    let mut interpreter = Interpreter::default();
    tinyscript::evaluate(&program, &mut interpreter)?;
    Ok(())
}

fn tokens_command(args: &FileArgs) -> Result<(), CliError> {
    let source = read_source(&args.file)?;
    let mut line = 0;
    for token in tinyscript::tokenizer::tokens(&source)? {
        if token.span.start_line != line {
            print!("{:4} ", token.span.start_line);
            line = token.span.start_line;
        } else {
            print!("   | ");
        }

        println!("{:<14} {}", format!("{:?}", token.kind), token.text);
    }

    Ok(())
}

fn ast_command(args: &FileArgs) -> Result<(), CliError> {
    let source = read_source(&args.file)?;
    let program = tinyscript::create_ast(&source)?;
    print!("{}", program);
    Ok(())
}
