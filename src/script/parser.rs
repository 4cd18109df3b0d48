use super::lexer::{Lexer, LexerError, Token};
use super::node::{Element, Node};
use super::{is_variable_name, split_keeping_quotes, ESCAPE_CHAR, FUNCTION_MARK};
use thiserror::Error;

/// Operators admitted inside an ECHO tag. `^` is part of the grammar but
/// the engine rejects it at evaluation time.
const OPERATORS: &str = "+-*/^";

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("invalid variable name: {0}")]
    BadVariableName(String),
    #[error("invalid element: {0}")]
    BadElement(String),
    #[error("FOR tag must have 3 or 4 elements: {0}")]
    BadForShape(String),
    #[error("invalid escape sequence `\\{0}` in string literal")]
    BadStringEscape(char),
    #[error("dangling escape at end of string literal")]
    DanglingStringEscape,
    #[error("number of END tags is greater than the number of FOR tags")]
    UnexpectedEnd,
    #[error("number of FOR tags is greater than the number of END tags")]
    MissingEnd,
}

/// A node under construction: the document root has no header, nested
/// frames remember their FOR tag until the matching END closes them.
struct Frame {
    header: Option<(String, Element, Element, Option<Element>)>,
    children: Vec<Node>,
}

/// Parses script source into a [`Node::Document`] tree.
///
/// Tokens are consumed until EOF with a node stack whose top collects
/// children. A FOR tag opens a frame, END closes the nearest one; an END
/// at document level or an unclosed FOR at EOF is a [`ParseError`].
pub fn parse(source: &str) -> Result<Node, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut stack = vec![Frame {
        header: None,
        children: Vec::new(),
    }];

    loop {
        match lexer.next_token()? {
            Token::Text(text) => {
                stack
                    .last_mut()
                    .expect("document frame is never popped")
                    .children
                    .push(Node::Text { text });
            }
            Token::For(body) => {
                let header = parse_for_header(&body)?;
                stack.push(Frame {
                    header: Some(header),
                    children: Vec::new(),
                });
            }
            Token::Echo(body) => {
                let elements = parse_echo_elements(&body)?;
                stack
                    .last_mut()
                    .expect("document frame is never popped")
                    .children
                    .push(Node::Echo { elements });
            }
            Token::End => {
                if stack.len() == 1 {
                    return Err(ParseError::UnexpectedEnd);
                }
                let frame = stack.pop().expect("length checked above");
                let (variable, start, end, step) =
                    frame.header.expect("nested frames carry a FOR header");
                stack
                    .last_mut()
                    .expect("document frame is never popped")
                    .children
                    .push(Node::ForLoop {
                        variable,
                        start,
                        end,
                        step,
                        children: frame.children,
                    });
            }
            Token::Eof => break,
        }
    }

    if stack.len() > 1 {
        return Err(ParseError::MissingEnd);
    }
    let root = stack.pop().expect("document frame is never popped");
    Ok(Node::Document {
        children: root.children,
    })
}

fn parse_for_header(
    body: &str,
) -> Result<(String, Element, Element, Option<Element>), ParseError> {
    let pieces = split_keeping_quotes(body);
    if pieces.len() < 3 || pieces.len() > 4 {
        return Err(ParseError::BadForShape(body.to_string()));
    }

    let variable = pieces[0];
    if !is_variable_name(variable) {
        return Err(ParseError::BadVariableName(variable.to_string()));
    }
    let start = parse_for_element(pieces[1])?;
    let end = parse_for_element(pieces[2])?;
    let step = pieces.get(3).map(|p| parse_for_element(p)).transpose()?;

    Ok((variable.to_string(), start, end, step))
}

fn parse_echo_elements(body: &str) -> Result<Vec<Element>, ParseError> {
    split_keeping_quotes(body)
        .into_iter()
        .map(parse_echo_element)
        .collect()
}

/// Elements legal in a FOR bound: variable, quoted string or number.
fn parse_for_element(piece: &str) -> Result<Element, ParseError> {
    if is_variable_name(piece) {
        return Ok(Element::Variable(piece.to_string()));
    }
    if piece.len() >= 2 && piece.starts_with('"') && piece.ends_with('"') {
        return Ok(Element::Str(unescape_string(&piece[1..piece.len() - 1])?));
    }
    parse_number(piece)
}

/// Elements legal in an ECHO body: everything a FOR bound admits plus
/// functions and operators.
fn parse_echo_element(piece: &str) -> Result<Element, ParseError> {
    match parse_for_element(piece) {
        Ok(element) => Ok(element),
        // Malformed string literals do not fall through to the
        // function/operator checks.
        Err(err @ (ParseError::BadStringEscape(_) | ParseError::DanglingStringEscape)) => Err(err),
        Err(_) => {
            if let Some(name) = piece.strip_prefix(FUNCTION_MARK) {
                if is_variable_name(name) {
                    return Ok(Element::Function(name.to_string()));
                }
            }
            let mut chars = piece.chars();
            if let (Some(symbol), None) = (chars.next(), chars.next()) {
                if OPERATORS.contains(symbol) {
                    return Ok(Element::Operator(symbol));
                }
            }
            Err(ParseError::BadElement(piece.to_string()))
        }
    }
}

/// Tries integer first, double second.
fn parse_number(piece: &str) -> Result<Element, ParseError> {
    if let Ok(i) = piece.parse::<i64>() {
        return Ok(Element::Int(i));
    }
    if let Ok(d) = piece.parse::<f64>() {
        return Ok(Element::Double(d));
    }
    Err(ParseError::BadElement(piece.to_string()))
}

/// Expands `\\ \" \n \r \t` inside a string literal body.
fn unescape_string(body: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE_CHAR {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => return Err(ParseError::DanglingStringEscape),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => return Err(ParseError::BadStringEscape(other)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn children(document: &Node) -> &[Node] {
        match document {
            Node::Document { children } => children,
            other => panic!("expected a document, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_text_and_echo() {
        let doc = parse("hello {$= name \"!\" $}").unwrap();
        assert_eq!(
            children(&doc),
            &[
                Node::Text {
                    text: "hello ".into()
                },
                Node::Echo {
                    elements: vec![
                        Element::Variable("name".into()),
                        Element::Str("!".into())
                    ]
                },
            ]
        );
    }

    #[test]
    fn test_parse_for_loop_with_and_without_step() {
        let doc = parse("{$ FOR i 1 10 $}x{$END$}{$ FOR j -1 10.5 2 $}{$END$}").unwrap();
        assert_eq!(
            children(&doc),
            &[
                Node::ForLoop {
                    variable: "i".into(),
                    start: Element::Int(1),
                    end: Element::Int(10),
                    step: None,
                    children: vec![Node::Text { text: "x".into() }],
                },
                Node::ForLoop {
                    variable: "j".into(),
                    start: Element::Int(-1),
                    end: Element::Double(10.5),
                    step: Some(Element::Int(2)),
                    children: vec![],
                },
            ]
        );
    }

    #[test]
    fn test_for_shape_errors() {
        assert!(matches!(
            parse("{$ FOR i 1 $}{$END$}"),
            Err(ParseError::BadForShape(_))
        ));
        assert!(matches!(
            parse("{$ FOR i 1 2 3 4 $}{$END$}"),
            Err(ParseError::BadForShape(_))
        ));
        assert!(matches!(
            parse("{$ FOR 2i 1 10 $}{$END$}"),
            Err(ParseError::BadVariableName(_))
        ));
        assert!(matches!(
            parse("{$ FOR i 1 @sin $}{$END$}"),
            Err(ParseError::BadElement(_))
        ));
        assert!(matches!(
            parse("{$ FOR i 1 + $}{$END$}"),
            Err(ParseError::BadElement(_))
        ));
    }

    #[test]
    fn test_echo_elements() {
        let doc = parse("{$= i 2.5 \"s\" @decfmt + ^ $}").unwrap();
        assert_eq!(
            children(&doc),
            &[Node::Echo {
                elements: vec![
                    Element::Variable("i".into()),
                    Element::Double(2.5),
                    Element::Str("s".into()),
                    Element::Function("decfmt".into()),
                    Element::Operator('+'),
                    Element::Operator('^'),
                ]
            }]
        );
    }

    #[test]
    fn test_signed_numbers_are_not_operators() {
        let doc = parse("{$= +5 -2 $}").unwrap();
        assert_eq!(
            children(&doc),
            &[Node::Echo {
                elements: vec![Element::Int(5), Element::Int(-2)]
            }]
        );
    }

    #[test]
    fn test_string_escapes() {
        let doc = parse(r#"{$= "line\nbreak \"quoted\" back\\slash" $}"#).unwrap();
        assert_eq!(
            children(&doc),
            &[Node::Echo {
                elements: vec![Element::Str("line\nbreak \"quoted\" back\\slash".into())]
            }]
        );
        assert_eq!(
            parse(r#"{$= "bad \x" $}"#),
            Err(ParseError::BadStringEscape('x'))
        );
    }

    #[test]
    fn test_end_without_for() {
        assert_eq!(parse("text {$END$}"), Err(ParseError::UnexpectedEnd));
    }

    #[test]
    fn test_unclosed_for() {
        assert_eq!(parse("{$ FOR i 1 10 $}body"), Err(ParseError::MissingEnd));
    }

    #[test]
    fn test_lexer_errors_propagate() {
        assert!(matches!(
            parse("{$ FOR i 1 10 "),
            Err(ParseError::Lexer(LexerError::UnclosedTag(_)))
        ));
        assert!(matches!(
            parse(r"bad \q escape"),
            Err(ParseError::Lexer(LexerError::BadEscape('q')))
        ));
    }

    #[test]
    fn test_pretty_print_round_trip() {
        let sources = [
            "This is sample text.\n{$ FOR i 1 10 1 $}\n This is {$= i $}-th time.\n{$END$}",
            r#"{$= "a\tb" 2.0 -3 @paramGet + / $}"#,
            "escaped \\\\ and \\{$ stay put {$ FOR i \"1\" 2 $}{$ FOR j i i $}{$END$}{$END$}",
        ];
        for source in sources {
            let tree = parse(source).unwrap();
            let printed = tree.to_string();
            let reparsed = parse(&printed).unwrap();
            assert_eq!(tree, reparsed, "round trip changed the tree for {source:?}");
        }
    }
}
