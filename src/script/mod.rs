//! The Smart Script pipeline: lexer, parser and tree-walking engine.
//!
//! A script is plain text interspersed with `{$ ... $}` tag regions. The
//! lexer splits the two apart, the parser builds a [`Node`] tree out of the
//! tag stream and the engine executes that tree against a
//! [`ResponseContext`](crate::server::ResponseContext).

pub mod engine;
pub mod lexer;
pub mod multistack;
pub mod node;
pub mod parser;
pub mod value;

pub use engine::{ExecError, ScriptEngine};
pub use lexer::{Lexer, LexerError, Token};
pub use multistack::{EmptyStack, VarStack};
pub use node::{Element, Node};
pub use parser::{parse, ParseError};

use once_cell::sync::Lazy;
use regex::Regex;

/// Opening bracket of a tag region.
pub const TAG_OPENING: &str = "{$";
/// Closing bracket of a tag region.
pub const TAG_CLOSING: &str = "$}";
/// Escape character in plain text and string literals.
pub const ESCAPE_CHAR: char = '\\';
/// Marker that introduces a function element.
pub const FUNCTION_MARK: char = '@';

/// Splits a tag body on whitespace while keeping quoted strings intact,
/// including their internal escapes.
///
/// For `r#"This is "a \"nested\" string""#` the pieces are `This`, `is`
/// and `"a \"nested\" string"`.
pub fn split_keeping_quotes(body: &str) -> Vec<&str> {
    static PIECES: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#""[^"\\]*(?:\\.[^"\\]*)*"|\S+"#).unwrap());
    PIECES.find_iter(body).map(|m| m.as_str()).collect()
}

/// Trims a tag body and collapses whitespace runs outside quoted strings
/// to a single space.
pub fn normalize_tag_body(body: &str) -> String {
    split_keeping_quotes(body).join(" ")
}

/// Checks a variable name: a letter followed by alphanumerics or
/// underscores. Function names use the same rule after the `@` mark.
pub fn is_variable_name(name: &str) -> bool {
    static NAME: Lazy<Regex> = Lazy::new(|| Regex::new("^[a-zA-Z][_0-9a-zA-Z]*$").unwrap());
    NAME.is_match(name)
}
