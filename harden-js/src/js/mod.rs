//! The embedded evaluator: lexer, parser and tree-walking interpreter for the JavaScript subset
//! compartment code is written in.

pub mod ast;
pub(crate) mod env;
pub mod error;
pub(crate) mod interp;
pub mod lex;
pub mod loc;
pub mod parse;
pub mod token;
