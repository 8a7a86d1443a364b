use miette::{Diagnostic, SourceSpan};

use crate::ast::error::{ParseError, SemanticError, SyntaxError};
use crate::eval::error::EvalError;
use crate::lexer::error::LexerError;
use crate::range::Range;
use crate::validate::ValidateError;

/// The five failure kinds, in pipeline order.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Validate(#[from] ValidateError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl From<ParseError> for InnerError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Syntax(e) => InnerError::Syntax(e),
            ParseError::Semantic(e) => InnerError::Semantic(e),
        }
    }
}

impl InnerError {
    fn range(&self) -> Option<Range> {
        match self {
            InnerError::Lexer(e) => Some(e.range().clone()),
            InnerError::Syntax(e) => e.token().map(|t| t.range.clone()),
            InnerError::Semantic(e) => Some(e.token().range.clone()),
            InnerError::Validate(e) => Some(e.token.range.clone()),
            InnerError::Eval(e) => Some(e.token().range.clone()),
        }
    }
}

/// A failure with enough context to render a caret diagnostic: the original
/// source text and the character span of the offending token.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{cause}")]
pub struct Error {
    pub cause: InnerError,
    pub source_code: String,
    pub location: SourceSpan,
}

impl Error {
    pub(crate) fn new(source: &str, cause: InnerError) -> Self {
        let location = match cause.range() {
            Some(range) => {
                let (start, end) = range.byte_span(source);
                SourceSpan::new(start.into(), (end.saturating_sub(start)).max(1))
            }
            // Errors without a position report at the end of the source.
            None => SourceSpan::new(source.len().saturating_sub(1).into(), 1),
        };
        Self {
            cause,
            source_code: source.to_string(),
            location,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match &self.cause {
            InnerError::Lexer(LexerError::MalformedNumber(_)) => "LexerError::MalformedNumber",
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                "LexerError::UnterminatedString"
            }
            InnerError::Syntax(SyntaxError::UnexpectedToken(_)) => "SyntaxError::UnexpectedToken",
            InnerError::Syntax(SyntaxError::UnexpectedEof) => "SyntaxError::UnexpectedEof",
            InnerError::Syntax(SyntaxError::ExpectedToken { .. }) => "SyntaxError::ExpectedToken",
            InnerError::Semantic(SemanticError::UnknownIdentifier(_, _)) => {
                "SemanticError::UnknownIdentifier"
            }
            InnerError::Semantic(SemanticError::UnknownUnit(_, _)) => "SemanticError::UnknownUnit",
            InnerError::Semantic(SemanticError::UnknownEntity(_, _)) => {
                "SemanticError::UnknownEntity"
            }
            InnerError::Semantic(SemanticError::UnknownProperty(_, _)) => {
                "SemanticError::UnknownProperty"
            }
            InnerError::Semantic(SemanticError::NotAssignable(_, _)) => {
                "SemanticError::NotAssignable"
            }
            InnerError::Semantic(SemanticError::DuplicateParameter(_, _)) => {
                "SemanticError::DuplicateParameter"
            }
            InnerError::Semantic(SemanticError::BadAssignmentTarget(_)) => {
                "SemanticError::BadAssignmentTarget"
            }
            InnerError::Semantic(SemanticError::FunctionWithoutArguments(_, _)) => {
                "SemanticError::FunctionWithoutArguments"
            }
            InnerError::Validate(_) => "ValidateError",
            InnerError::Eval(EvalError::Check(_, _)) => "EvalError::Check",
            InnerError::Eval(EvalError::EmptyCollection(_, _)) => "EvalError::EmptyCollection",
            InnerError::Eval(EvalError::InvalidNumberOfArguments(_, _, _, _)) => {
                "EvalError::InvalidNumberOfArguments"
            }
            InnerError::Eval(EvalError::LambdaArity(_, _, _)) => "EvalError::LambdaArity",
            InnerError::Eval(EvalError::NullEntity(_)) => "EvalError::NullEntity",
            InnerError::Eval(EvalError::Host(_, _)) => "EvalError::Host",
            InnerError::Eval(EvalError::SelfRecursion(_)) => "EvalError::SelfRecursion",
            InnerError::Eval(EvalError::RecursionLimit(_, _)) => "EvalError::RecursionLimit",
            InnerError::Eval(EvalError::ChooseOutOfRange(_, _, _)) => {
                "EvalError::ChooseOutOfRange"
            }
            InnerError::Eval(EvalError::Runtime(_, _)) => "EvalError::Runtime",
            InnerError::Eval(EvalError::Internal(_)) => "EvalError::Internal",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::MalformedNumber(_)) => {
                Some("Check the numeric literal; exponents need at least one digit.".to_string())
            }
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                Some("Close the string with a `\"`.".to_string())
            }
            InnerError::Syntax(SyntaxError::UnexpectedEof) => {
                Some("Input ended unexpectedly. Check for missing closing brackets or incomplete expressions.".to_string())
            }
            InnerError::Syntax(_) => {
                Some("Check for syntax errors or misplaced tokens.".to_string())
            }
            InnerError::Semantic(SemanticError::UnknownIdentifier(_, name)) => Some(format!(
                "'{name}' is not a variable, constant or function. Did you mean an entity literal `[{name}]`?"
            )),
            InnerError::Semantic(SemanticError::UnknownUnit(_, name)) => {
                Some(format!("'{name}' is not a registered unit name."))
            }
            InnerError::Semantic(SemanticError::BadAssignmentTarget(_)) => Some(
                "An assignment target looks like `[Entity].property = value` or `[Entity].property(index) = value`."
                    .to_string(),
            ),
            InnerError::Semantic(_) => None,
            InnerError::Validate(_) => {
                Some("The expression cannot be valid for any input; fix the types or unit dimensions.".to_string())
            }
            InnerError::Eval(EvalError::SelfRecursion(_)) => Some(
                "The expression ends up evaluating itself; break the cycle in the model.".to_string(),
            ),
            InnerError::Eval(EvalError::RecursionLimit(_, _)) => {
                Some("Deeply nested lambda applications; raise EvalOptions::max_depth if intended.".to_string())
            }
            InnerError::Eval(_) => None,
        };
        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token::{Token, TokenKind};
    use crate::range::Position;

    fn token_at(start: (u32, usize), end: (u32, usize)) -> Token {
        Token {
            range: Range {
                start: Position::new(start.0, start.1),
                end: Position::new(end.0, end.1),
            },
            kind: TokenKind::Symbol('+'),
        }
    }

    #[test]
    fn test_error_span_points_at_token() {
        let source = "1 + x";
        let cause = InnerError::Semantic(SemanticError::UnknownIdentifier(
            token_at((1, 5), (1, 6)),
            "x".into(),
        ));
        let error = Error::new(source, cause);
        assert_eq!(error.location.offset(), 4);
        assert_eq!(error.location.len(), 1);
        assert_eq!(error.source_code, source);
    }

    #[test]
    fn test_error_without_position_points_at_end() {
        let error = Error::new("1 +", InnerError::Syntax(SyntaxError::UnexpectedEof));
        assert_eq!(error.location.offset(), 2);
    }
}
