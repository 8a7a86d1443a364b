use thiserror::Error;

use crate::lexer::token::Token;
use crate::validate::FaultKind;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum EvalError {
    /// A runtime type/unit assertion failed on a node the static pass could
    /// not decide.
    #[error("{1}")]
    Check(Token, FaultKind),
    #[error("Empty collection passed to \"{1}\"")]
    EmptyCollection(Token, String),
    #[error("Invalid number of arguments in \"{1}\", expected {2}, got {3}")]
    InvalidNumberOfArguments(Token, String, String, usize),
    #[error("Lambda expects {1} argument(s), got {2}")]
    LambdaArity(Token, usize, usize),
    #[error("Property access on a null entity reference")]
    NullEntity(Token),
    #[error("{1}")]
    Host(Token, String),
    #[error("Expression is already being evaluated on this thread")]
    SelfRecursion(Token),
    #[error("Maximum evaluation depth exceeded ({1})")]
    RecursionLimit(Token, u32),
    #[error("\"choose\" index {1} out of range 1..={2}")]
    ChooseOutOfRange(Token, i64, usize),
    #[error("Runtime error: {1}")]
    Runtime(Token, String),
    #[error("Internal error")]
    Internal(Token),
}

impl EvalError {
    pub fn token(&self) -> &Token {
        match self {
            EvalError::Check(token, _) => token,
            EvalError::EmptyCollection(token, _) => token,
            EvalError::InvalidNumberOfArguments(token, _, _, _) => token,
            EvalError::LambdaArity(token, _, _) => token,
            EvalError::NullEntity(token) => token,
            EvalError::Host(token, _) => token,
            EvalError::SelfRecursion(token) => token,
            EvalError::RecursionLimit(token, _) => token,
            EvalError::ChooseOutOfRange(token, _, _) => token,
            EvalError::Runtime(token, _) => token,
            EvalError::Internal(token) => token,
        }
    }
}
