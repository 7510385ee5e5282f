pub mod ast;
pub mod parser;
pub mod span;
pub mod tokenizer;
pub mod tree_walk_interpreter;

use ast::Program;
use tree_walk_interpreter::{Interpreter, Value};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Tokenize(#[from] tokenizer::TokenizeError),
    #[error(transparent)]
    Parse(#[from] parser::ParseErrorWithContext),
    #[error(transparent)]
    Execution(#[from] tree_walk_interpreter::ExecutionError),
}

/// Tokenizes and parses `source` into a program.
pub fn create_ast(source: &str) -> Result<Program, Error> {
    let tokens = tokenizer::tokens(source)?;
    let program = parser::program(&tokens)?;

    #[cfg(feature = "dump-ast")]
    eprint!("{}", program);

    Ok(program)
}

/// Evaluates `program` against the interpreter's root scope.
pub fn evaluate(program: &Program, interpreter: &mut Interpreter) -> Result<Value, Error> {
    Ok(interpreter.interpret(program)?)
}
