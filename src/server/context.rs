use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Session-scoped persistent parameter store, shared between the session
/// registry and every context created for that session.
pub type SessionStore = Arc<RwLock<HashMap<String, String>>>;

/// Encodings the context can emit. The first entry is the default.
const SUPPORTED_ENCODINGS: [&str; 3] = ["UTF-8", "US-ASCII", "ISO-8859-1"];

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("headers already generated; response properties are frozen")]
    Locked,
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// An outgoing `Set-Cookie` entry. Optional attributes are emitted only
/// when set.
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<u64>,
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: None,
            path: None,
            max_age: None,
            http_only: false,
        }
    }

    fn header_value(&self) -> String {
        let mut line = format!("{}={}", self.name, self.value);
        if let Some(domain) = &self.domain {
            let _ = write!(line, "; Domain={domain}");
        }
        if let Some(path) = &self.path {
            let _ = write!(line, "; Path={path}");
        }
        if let Some(max_age) = &self.max_age {
            let _ = write!(line, "; Max-Age={max_age}");
        }
        if self.http_only {
            line.push_str("; HttpOnly");
        }
        line
    }
}

/// Streams a response body while deferring header generation.
///
/// Status, MIME type, encoding, cookies and content length may be changed
/// freely until the first `write_*` call; that call emits the status line
/// and headers exactly once and freezes every mutator, which from then on
/// fails with [`ContextError::Locked`].
///
/// Three parameter maps travel with the context: the request parameters
/// (immutable, parsed from the query string), the persistent parameters
/// (session-scoped, shared) and the temporary parameters (request-scoped).
pub struct ResponseContext {
    sink: Box<dyn Write + Send>,
    encoding: String,
    status_code: u16,
    status_text: String,
    mime_type: String,
    content_length: Option<u64>,
    params: HashMap<String, Option<String>>,
    persistent: SessionStore,
    temporary: HashMap<String, String>,
    cookies: Vec<Cookie>,
    header_written: bool,
}

impl ResponseContext {
    pub fn new(
        sink: Box<dyn Write + Send>,
        params: HashMap<String, Option<String>>,
        persistent: SessionStore,
        cookies: Vec<Cookie>,
    ) -> Self {
        Self {
            sink,
            encoding: SUPPORTED_ENCODINGS[0].to_string(),
            status_code: 200,
            status_text: "OK".to_string(),
            mime_type: "text/html".to_string(),
            content_length: None,
            params,
            persistent,
            temporary: HashMap::new(),
            cookies,
            header_written: false,
        }
    }

    fn guard(&self) -> Result<(), ContextError> {
        if self.header_written {
            Err(ContextError::Locked)
        } else {
            Ok(())
        }
    }

    /// Selects the charset used for string bodies and the `Content-Type`
    /// charset parameter. Only `UTF-8`, `US-ASCII` and `ISO-8859-1` are
    /// accepted.
    pub fn set_encoding(&mut self, encoding: &str) -> Result<(), ContextError> {
        self.guard()?;
        let canonical = SUPPORTED_ENCODINGS
            .iter()
            .find(|e| e.eq_ignore_ascii_case(encoding))
            .ok_or_else(|| ContextError::UnsupportedEncoding(encoding.to_string()))?;
        self.encoding = canonical.to_string();
        Ok(())
    }

    pub fn set_status_code(&mut self, code: u16) -> Result<(), ContextError> {
        self.guard()?;
        self.status_code = code;
        Ok(())
    }

    pub fn set_status_text(&mut self, text: &str) -> Result<(), ContextError> {
        self.guard()?;
        self.status_text = text.to_string();
        Ok(())
    }

    pub fn set_mime_type(&mut self, mime: &str) -> Result<(), ContextError> {
        self.guard()?;
        self.mime_type = mime.to_string();
        Ok(())
    }

    pub fn set_content_length(&mut self, length: u64) -> Result<(), ContextError> {
        self.guard()?;
        self.content_length = Some(length);
        Ok(())
    }

    pub fn add_cookie(&mut self, cookie: Cookie) -> Result<(), ContextError> {
        self.guard()?;
        self.cookies.push(cookie);
        Ok(())
    }

    /// Looks up a request parameter. A key that appeared in the query
    /// string without a value yields `None`, same as an absent key.
    pub fn get_parameter(&self, name: &str) -> Option<String> {
        self.params.get(name).and_then(|v| v.clone())
    }

    /// The request parameter names, sorted for deterministic output.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.params.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_persistent_parameter(&self, name: &str) -> Option<String> {
        self.persistent
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub fn set_persistent_parameter(&mut self, name: &str, value: &str) -> Result<(), ContextError> {
        self.guard()?;
        self.persistent
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_persistent_parameter(&mut self, name: &str) -> Result<(), ContextError> {
        self.guard()?;
        self.persistent
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name);
        Ok(())
    }

    pub fn get_temporary_parameter(&self, name: &str) -> Option<String> {
        self.temporary.get(name).cloned()
    }

    pub fn set_temporary_parameter(&mut self, name: &str, value: &str) -> Result<(), ContextError> {
        self.guard()?;
        self.temporary.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_temporary_parameter(&mut self, name: &str) -> Result<(), ContextError> {
        self.guard()?;
        self.temporary.remove(name);
        Ok(())
    }

    /// Writes a string body chunk in the configured encoding, emitting the
    /// header first if this is the first write.
    pub fn write_str(&mut self, text: &str) -> Result<(), ContextError> {
        let bytes = self.encode(text);
        self.write_bytes(&bytes)
    }

    /// Writes raw body bytes, emitting the header first if this is the
    /// first write.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ContextError> {
        if !self.header_written {
            self.generate_header()?;
        }
        self.sink.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ContextError> {
        self.sink.flush()?;
        Ok(())
    }

    fn generate_header(&mut self) -> Result<(), ContextError> {
        let mut header = format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_text);
        if self.mime_type.starts_with("text/") {
            let _ = write!(
                header,
                "Content-Type: {}; charset={}\r\n",
                self.mime_type, self.encoding
            );
        } else {
            let _ = write!(header, "Content-Type: {}\r\n", self.mime_type);
        }
        if let Some(length) = self.content_length {
            let _ = write!(header, "Content-Length: {length}\r\n");
        }
        for cookie in &self.cookies {
            let _ = write!(header, "Set-Cookie: {}\r\n", cookie.header_value());
        }
        header.push_str("\r\n");

        self.sink.write_all(header.as_bytes())?;
        self.header_written = true;
        Ok(())
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        match self.encoding.as_str() {
            "US-ASCII" => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            "ISO-8859-1" => text
                .chars()
                .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
                .collect(),
            _ => text.as_bytes().to_vec(),
        }
    }
}
