use crate::js::loc::Loc;
use crate::js::token::TT;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Formatter;
use std::error::Error;
use std::fmt::Display;

/// A stable classification of syntax errors produced by the parser.
///
/// Diagnostic codes (prefix `HJ`) are assigned per variant and are stable:
/// - `HJ0001`: [`SyntaxErrorType::ExpectedNotFound`]
/// - `HJ0002`: [`SyntaxErrorType::ExpectedSyntax`]
/// - `HJ0003`: [`SyntaxErrorType::InvalidAssigmentTarget`]
/// - `HJ0004`: [`SyntaxErrorType::InvalidCharacterEscape`]
/// - `HJ0005`: [`SyntaxErrorType::LineTerminatorAfterArrowFunctionParameters`]
/// - `HJ0006`: [`SyntaxErrorType::LineTerminatorAfterThrow`]
/// - `HJ0007`: [`SyntaxErrorType::LineTerminatorInString`]
/// - `HJ0008`: [`SyntaxErrorType::MalformedLiteralNumber`]
/// - `HJ0009`: [`SyntaxErrorType::RequiredTokenNotFound`]
/// - `HJ0010`: [`SyntaxErrorType::TryStatementHasNoCatchOrFinally`]
/// - `HJ0011`: [`SyntaxErrorType::UnexpectedEnd`]
/// - `HJ0012`: [`SyntaxErrorType::UnsupportedSyntax`]
/// - `HJ0013`: [`SyntaxErrorType::DuplicateDeclaration`]
/// - `HJ0014`: [`SyntaxErrorType::NestingTooDeep`]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SyntaxErrorType {
  ExpectedNotFound,
  ExpectedSyntax(&'static str),
  InvalidAssigmentTarget,
  InvalidCharacterEscape,
  LineTerminatorAfterArrowFunctionParameters,
  LineTerminatorAfterThrow,
  LineTerminatorInString,
  MalformedLiteralNumber,
  RequiredTokenNotFound(TT),
  TryStatementHasNoCatchOrFinally,
  UnexpectedEnd,
  UnsupportedSyntax(&'static str),
  DuplicateDeclaration,
  NestingTooDeep,
}

#[derive(Clone)]
pub struct SyntaxError {
  pub typ: SyntaxErrorType,
  pub loc: Loc,
  pub actual_token: Option<TT>,
}

impl SyntaxError {
  pub fn new(typ: SyntaxErrorType, loc: Loc, actual_token: Option<TT>) -> SyntaxError {
    SyntaxError {
      typ,
      loc,
      actual_token,
    }
  }

  pub fn message(&self) -> String {
    self.typ.message(self.actual_token)
  }
}

impl Debug for SyntaxError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{} around loc [{}:{}]", self, self.loc.0, self.loc.1)
  }
}

impl Display for SyntaxError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "SyntaxError: {} [{}]", self.message(), self.typ.code())
  }
}

impl Error for SyntaxError {}

impl PartialEq for SyntaxError {
  fn eq(&self, other: &Self) -> bool {
    self.typ == other.typ
  }
}

impl Eq for SyntaxError {}

pub type SyntaxResult<T> = Result<T, SyntaxError>;

impl SyntaxErrorType {
  /// Stable diagnostic code for this syntax error variant.
  pub fn code(&self) -> &'static str {
    match self {
      SyntaxErrorType::ExpectedNotFound => "HJ0001",
      SyntaxErrorType::ExpectedSyntax(_) => "HJ0002",
      SyntaxErrorType::InvalidAssigmentTarget => "HJ0003",
      SyntaxErrorType::InvalidCharacterEscape => "HJ0004",
      SyntaxErrorType::LineTerminatorAfterArrowFunctionParameters => "HJ0005",
      SyntaxErrorType::LineTerminatorAfterThrow => "HJ0006",
      SyntaxErrorType::LineTerminatorInString => "HJ0007",
      SyntaxErrorType::MalformedLiteralNumber => "HJ0008",
      SyntaxErrorType::RequiredTokenNotFound(_) => "HJ0009",
      SyntaxErrorType::TryStatementHasNoCatchOrFinally => "HJ0010",
      SyntaxErrorType::UnexpectedEnd => "HJ0011",
      SyntaxErrorType::UnsupportedSyntax(_) => "HJ0012",
      SyntaxErrorType::DuplicateDeclaration => "HJ0013",
      SyntaxErrorType::NestingTooDeep => "HJ0014",
    }
  }

  /// Human-readable message describing this syntax error.
  pub fn message(&self, actual_token: Option<TT>) -> String {
    match self {
      SyntaxErrorType::ExpectedNotFound => "expected token not found".into(),
      SyntaxErrorType::ExpectedSyntax(expected) => format!("expected {}", expected),
      SyntaxErrorType::InvalidAssigmentTarget => "invalid assignment target".into(),
      SyntaxErrorType::InvalidCharacterEscape => "invalid character escape".into(),
      SyntaxErrorType::LineTerminatorAfterArrowFunctionParameters => {
        "line terminator not allowed after arrow function parameters".into()
      }
      SyntaxErrorType::LineTerminatorAfterThrow => {
        "line terminator not allowed after `throw`".into()
      }
      SyntaxErrorType::LineTerminatorInString => {
        "line terminator not allowed in string literal".into()
      }
      SyntaxErrorType::MalformedLiteralNumber => "malformed number literal".into(),
      SyntaxErrorType::RequiredTokenNotFound(token) => match actual_token {
        Some(actual) => format!("expected token {:?}, found {:?}", token, actual),
        None => format!("expected token {:?}", token),
      },
      SyntaxErrorType::TryStatementHasNoCatchOrFinally => {
        "try statement requires a catch or finally block".into()
      }
      SyntaxErrorType::UnexpectedEnd => actual_token
        .map(|tok| format!("unexpected end before {:?}", tok))
        .unwrap_or_else(|| "unexpected end of input".into()),
      SyntaxErrorType::UnsupportedSyntax(what) => format!("{} is not supported", what),
      SyntaxErrorType::DuplicateDeclaration => "identifier has already been declared".into(),
      SyntaxErrorType::NestingTooDeep => "expression or statement nested too deeply".into(),
    }
  }
}
