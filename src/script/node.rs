use super::value::fmt_double;
use std::fmt;

/// A lexical piece inside a tag body.
///
/// `Str` carries the unescaped value (quotes stripped, escapes resolved);
/// `Function` carries the name without the `@` mark.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Variable(String),
    Str(String),
    Int(i64),
    Double(f64),
    Function(String),
    Operator(char),
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Variable(name) => f.write_str(name),
            Element::Str(value) => write!(f, "\"{}\"", escape_string(value)),
            Element::Int(i) => write!(f, "{i}"),
            Element::Double(d) => f.write_str(&fmt_double(*d)),
            Element::Function(name) => write!(f, "@{name}"),
            Element::Operator(symbol) => write!(f, "{symbol}"),
        }
    }
}

/// A node of the parsed document tree.
///
/// `Document` is the root; `Text` and `Echo` are leaves; `ForLoop` holds
/// its bounds plus the nodes between its tag and the matching `END`.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Document {
        children: Vec<Node>,
    },
    Text {
        text: String,
    },
    ForLoop {
        variable: String,
        start: Element,
        end: Element,
        step: Option<Element>,
        children: Vec<Node>,
    },
    Echo {
        elements: Vec<Element>,
    },
}

impl fmt::Display for Node {
    /// Reconstructs a source form that parses back into an equal tree:
    /// text re-applies the `\\` and `\{` escapes, strings are re-quoted
    /// and doubles keep their decimal point.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Document { children } => {
                for child in children {
                    child.fmt(f)?;
                }
                Ok(())
            }
            Node::Text { text } => f.write_str(&escape_text(text)),
            Node::ForLoop {
                variable,
                start,
                end,
                step,
                children,
            } => {
                write!(f, "{{$ FOR {variable} {start} {end}")?;
                if let Some(step) = step {
                    write!(f, " {step}")?;
                }
                write!(f, " $}}")?;
                for child in children {
                    child.fmt(f)?;
                }
                write!(f, "{{$ END $}}")
            }
            Node::Echo { elements } => {
                write!(f, "{{$=")?;
                for element in elements {
                    write!(f, " {element}")?;
                }
                write!(f, " $}}")
            }
        }
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            other => out.push(other),
        }
    }
    out
}

fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}
