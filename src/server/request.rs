use std::collections::HashMap;
use std::io::{self, BufRead};
use url::form_urlencoded;

/// Reads header lines up to (and excluding) the blank line that ends the
/// request head. Line terminators are stripped.
pub fn read_request_lines<R: BufRead>(reader: &mut R) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        lines.push(trimmed.to_string());
    }
    Ok(lines)
}

/// Splits a request target into path and optional query string. More than
/// one `?` is malformed and yields `None`.
pub fn split_target(target: &str) -> Option<(&str, Option<&str>)> {
    let mut pieces = target.split('?');
    let path = pieces.next().unwrap_or("");
    match (pieces.next(), pieces.next()) {
        (None, _) => Some((path, None)),
        (Some(query), None) => Some((path, Some(query))),
        (Some(_), Some(_)) => None,
    }
}

/// Parses `k=v(&k=v)*` query pairs, percent-decoded. A key without `=`
/// maps to `None`; duplicate keys keep the last occurrence.
pub fn parse_query(query: &str) -> HashMap<String, Option<String>> {
    let mut params = HashMap::new();
    for piece in query.split('&') {
        if piece.is_empty() {
            continue;
        }
        if piece.contains('=') {
            if let Some((key, value)) = form_urlencoded::parse(piece.as_bytes()).next() {
                params.insert(key.into_owned(), Some(value.into_owned()));
            }
        } else if let Some((key, _)) = form_urlencoded::parse(piece.as_bytes()).next() {
            params.insert(key.into_owned(), None);
        }
    }
    params
}

/// Extracts the value of the `sid` cookie from the `Cookie:` header
/// lines, stripping surrounding quotes.
pub fn extract_sid(lines: &[String]) -> Option<String> {
    for line in lines {
        let Some(rest) = header_value(line, "Cookie") else {
            continue;
        };
        for cookie in rest.split(';') {
            let Some((name, value)) = cookie.split_once('=') else {
                continue;
            };
            if name.trim() == "sid" {
                return Some(value.trim().trim_matches('"').to_string());
            }
        }
    }
    None
}

/// Extracts the host from the `Host:` header line, with any port
/// stripped.
pub fn extract_host(lines: &[String]) -> Option<String> {
    for line in lines {
        if let Some(rest) = header_value(line, "Host") {
            let host = rest.trim().split(':').next().unwrap_or("").trim();
            if !host.is_empty() {
                return Some(host.to_string());
            }
        }
    }
    None
}

fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    if key.trim().eq_ignore_ascii_case(name) {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_lines_stops_at_blank() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\nignored";
        let mut reader = io::BufReader::new(&raw[..]);
        let lines = read_request_lines(&mut reader).unwrap();
        assert_eq!(lines, vec!["GET / HTTP/1.1", "Host: localhost"]);
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/a/b"), Some(("/a/b", None)));
        assert_eq!(split_target("/a?x=1"), Some(("/a", Some("x=1"))));
        assert_eq!(split_target("/a?x=1?y=2"), None);
    }

    #[test]
    fn test_query_null_sentinel_and_duplicates() {
        let params = parse_query("a=1&flag&a=2&b=");
        assert_eq!(params.get("a"), Some(&Some("2".to_string())));
        assert_eq!(params.get("flag"), Some(&None));
        assert_eq!(params.get("b"), Some(&Some(String::new())));
    }

    #[test]
    fn test_query_percent_decoding() {
        let params = parse_query("name=a%20b&x=1%2B2");
        assert_eq!(params.get("name"), Some(&Some("a b".to_string())));
        assert_eq!(params.get("x"), Some(&Some("1+2".to_string())));
    }

    #[test]
    fn test_extract_sid() {
        let lines = vec![
            "Host: localhost:8080".to_string(),
            "Cookie: theme=dark; sid=\"ABCDEFGHIJKLMNOPQRST\"".to_string(),
        ];
        assert_eq!(extract_sid(&lines), Some("ABCDEFGHIJKLMNOPQRST".to_string()));
        assert_eq!(extract_sid(&["Cookie: theme=dark".to_string()]), None);
    }

    #[test]
    fn test_extract_host_strips_port() {
        let lines = vec!["host: example.org:8080".to_string()];
        assert_eq!(extract_host(&lines), Some("example.org".to_string()));
        assert_eq!(extract_host(&[]), None);
    }
}
