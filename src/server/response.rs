use http::StatusCode;
use std::io::{self, Write};

/// Canonical reason phrase for a status code, falling back to `OK`.
pub fn status_reason(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("OK")
}

/// Writes a complete error response straight to the socket, bypassing the
/// response context. Used for protocol failures (400/403/404/405/505)
/// where no body has been produced yet.
pub fn send_error<W: Write>(out: &mut W, code: u16, text: &str) -> io::Result<()> {
    let head = format!(
        "HTTP/1.1 {code} {text}\r\n\
         Server: smartserve\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\
         Connection: close\r\n\
         \r\n"
    );
    let body = format!(
        "<html>\r\n\
         \x20 <head><title>{code} {text}</title></head>\r\n\
         \x20 <body>\r\n\
         \x20   <p><b>{code}</b> {text}</p>\r\n\
         \x20   <hr/>\r\n\
         \x20 </body>\r\n\
         </html>\r\n"
    );
    out.write_all(head.as_bytes())?;
    out.write_all(body.as_bytes())?;
    out.flush()
}
