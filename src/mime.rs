use std::collections::HashMap;

/// Fallback type for extensions with no mapping.
pub const DEFAULT_MIME: &str = "application/octet-stream";

const DEFAULTS: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("gif", "image/gif"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
];

/// Extension → MIME type table: built-in defaults plus configured
/// overrides. Lookups are case-insensitive on the extension.
#[derive(Debug, Clone)]
pub struct MimeTypes {
    map: HashMap<String, String>,
}

impl MimeTypes {
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut map: HashMap<String, String> = DEFAULTS
            .iter()
            .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
            .collect();
        for (ext, mime) in overrides {
            map.insert(ext.to_lowercase(), mime.clone());
        }
        Self { map }
    }

    pub fn lookup(&self, extension: &str) -> &str {
        self.map
            .get(&extension.to_lowercase())
            .map(String::as_str)
            .unwrap_or(DEFAULT_MIME)
    }
}

impl Default for MimeTypes {
    fn default() -> Self {
        Self::with_overrides(&HashMap::new())
    }
}
