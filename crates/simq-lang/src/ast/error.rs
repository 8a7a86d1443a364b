use compact_str::CompactString;
use thiserror::Error;

use crate::lexer::token::Token;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum SyntaxError {
    #[error("Unexpected token `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    UnexpectedToken(Token),
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Expected {expected} but got `{}`", if .token.is_eof() { "EOF".to_string() } else { .token.to_string() })]
    ExpectedToken {
        token: Token,
        expected: &'static str,
    },
}

impl SyntaxError {
    pub fn token(&self) -> Option<&Token> {
        match self {
            SyntaxError::UnexpectedToken(token) => Some(token),
            SyntaxError::UnexpectedEof => None,
            SyntaxError::ExpectedToken { token, .. } => Some(token),
        }
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum SemanticError {
    #[error("\"{1}\" is not defined in any enclosing scope")]
    UnknownIdentifier(Token, CompactString),
    #[error("Unknown unit name \"{1}\"")]
    UnknownUnit(Token, CompactString),
    #[error("Unknown entity \"{1}\"")]
    UnknownEntity(Token, CompactString),
    #[error("Unknown property \"{1}\"")]
    UnknownProperty(Token, CompactString),
    #[error("Property \"{1}\" cannot be assigned")]
    NotAssignable(Token, CompactString),
    #[error("Duplicate lambda parameter \"{1}\"")]
    DuplicateParameter(Token, CompactString),
    #[error("Assignment target must end in a property, with at most one index")]
    BadAssignmentTarget(Token),
    #[error("Function \"{1}\" must be called with arguments")]
    FunctionWithoutArguments(Token, CompactString),
}

impl SemanticError {
    pub fn token(&self) -> &Token {
        match self {
            SemanticError::UnknownIdentifier(token, _) => token,
            SemanticError::UnknownUnit(token, _) => token,
            SemanticError::UnknownEntity(token, _) => token,
            SemanticError::UnknownProperty(token, _) => token,
            SemanticError::NotAssignable(token, _) => token,
            SemanticError::DuplicateParameter(token, _) => token,
            SemanticError::BadAssignmentTarget(token) => token,
            SemanticError::FunctionWithoutArguments(token, _) => token,
        }
    }
}

/// Either failure mode of the parser proper.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ParseError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
}
