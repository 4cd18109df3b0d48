use super::context::{Cookie, ResponseContext};
use super::request::{extract_host, extract_sid, parse_query, read_request_lines, split_target};
use super::response::send_error;
use super::session::SessionRegistry;
use crate::mime::MimeTypes;
use crate::script::{parse, ScriptEngine};
use crate::workers::{self, WebWorker};
use may::net::TcpStream;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Page served for `GET /`: a client-side redirect onto the index.
const META_REFRESH: &str = "<meta http-equiv=\"refresh\" content=\"0; url=index.html\" />";

/// File chunk size when streaming static content.
const CHUNK_SIZE: usize = 8192;

/// Serves one client connection to completion: parses the request head,
/// resolves the session, and dispatches to the index redirect, a
/// configured worker, an `/ext/` worker, the script engine or the static
/// file emitter.
#[derive(Clone)]
pub struct AppService {
    pub document_root: PathBuf,
    pub mime_types: Arc<MimeTypes>,
    pub workers: Arc<HashMap<String, Arc<dyn WebWorker>>>,
    pub sessions: Arc<SessionRegistry>,
    /// Cookie domain fallback when the request carries no `Host` header.
    pub address: String,
    pub read_timeout: Duration,
}

impl AppService {
    /// Entry point for pool workers. Read timeouts and broken pipes close
    /// the connection silently.
    pub fn handle(&self, stream: TcpStream) {
        let peer = stream.peer_addr().ok();
        if let Err(e) = stream.set_read_timeout(Some(self.read_timeout)) {
            warn!(error = %e, "failed to set client read timeout");
        }
        if let Err(e) = self.serve(stream) {
            debug!(peer = ?peer, error = %e, "connection closed");
        }
    }

    fn serve(&self, stream: TcpStream) -> io::Result<()> {
        let mut reader = BufReader::new(stream);
        let lines = read_request_lines(&mut reader)?;
        let mut stream = reader.into_inner();

        if lines.is_empty() {
            return send_error(&mut stream, 400, "Bad Request");
        }

        let parts: Vec<&str> = lines[0].split(' ').collect();
        if parts.len() != 3 {
            return send_error(&mut stream, 400, "Bad Request");
        }

        let method = parts[0].to_ascii_uppercase();
        if method != "GET" {
            return send_error(&mut stream, 405, "Method Not Allowed");
        }

        let version = parts[2].to_ascii_uppercase();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return send_error(&mut stream, 505, "HTTP Version Not Supported");
        }

        let domain = extract_host(&lines).unwrap_or_else(|| self.address.clone());
        let session = self.sessions.resolve(extract_sid(&lines).as_deref(), &domain);

        let Some((path, query)) = split_target(parts[1]) else {
            return send_error(&mut stream, 400, "Bad Request");
        };
        let params = query.map(parse_query).unwrap_or_default();
        debug!(sid = %session.sid, path, "dispatching request");

        let cookies: Vec<Cookie> = session.cookie.into_iter().collect();
        let build_context =
            |sink: TcpStream| ResponseContext::new(Box::new(sink), params, session.store, cookies);

        if path == "/" {
            let mut ctx = build_context(stream);
            ctx.write_str(META_REFRESH).map_err(io::Error::other)?;
            return ctx.flush().map_err(io::Error::other);
        }

        if let Some(worker) = self.workers.get(path) {
            return run_worker(worker.clone(), build_context(stream));
        }

        if let Some(identifier) = path.strip_prefix("/ext/") {
            return match workers::resolve(identifier) {
                Some(worker) => run_worker(worker, build_context(stream)),
                None => send_error(&mut stream, 404, "Not Found"),
            };
        }

        let Some(resolved) = resolve_under_root(&self.document_root, path) else {
            return send_error(&mut stream, 403, "Forbidden");
        };
        if !resolved.is_file() {
            return send_error(&mut stream, 404, "Not Found");
        }
        let Ok(file) = File::open(&resolved) else {
            return send_error(&mut stream, 404, "Not Found");
        };

        let extension = resolved
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        if extension == "smscr" {
            drop(file);
            return self.run_script(&resolved, build_context(stream));
        }

        self.stream_file(file, &extension, build_context(stream))
    }

    /// Parses and executes a `.smscr` document. Script failures abort the
    /// request; output already streamed stays streamed.
    fn run_script(&self, path: &Path, mut ctx: ResponseContext) -> io::Result<()> {
        let source = std::fs::read_to_string(path)?;
        let tree = match parse(&source) {
            Ok(tree) => tree,
            Err(e) => {
                error!(script = %path.display(), error = %e, "script parse failed");
                return Ok(());
            }
        };
        if let Err(e) = ScriptEngine::new(&tree).execute(&mut ctx) {
            error!(script = %path.display(), error = %e, "script execution failed");
            return Ok(());
        }
        ctx.flush().map_err(io::Error::other)
    }

    fn stream_file(
        &self,
        file: File,
        extension: &str,
        mut ctx: ResponseContext,
    ) -> io::Result<()> {
        let length = file.metadata()?.len();
        ctx.set_mime_type(self.mime_types.lookup(extension))
            .map_err(io::Error::other)?;
        ctx.set_status_code(200).map_err(io::Error::other)?;
        ctx.set_content_length(length).map_err(io::Error::other)?;

        let mut reader = BufReader::new(file);
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            ctx.write_bytes(&chunk[..n]).map_err(io::Error::other)?;
        }
        ctx.flush().map_err(io::Error::other)
    }
}

fn run_worker(worker: Arc<dyn WebWorker>, mut ctx: ResponseContext) -> io::Result<()> {
    if let Err(e) = worker.process(&mut ctx) {
        error!(error = %e, "worker failed");
        return Ok(());
    }
    ctx.flush().map_err(io::Error::other)
}

/// Resolves a URL path under the document root. Parent components may not
/// climb past the root; a path that would escape resolves to `None`.
fn resolve_under_root(root: &Path, url_path: &str) -> Option<PathBuf> {
    let clean = url_path.trim_start_matches('/');
    let mut resolved = root.to_path_buf();
    for component in Path::new(clean).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(root) {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_under_root() {
        let root = Path::new("/srv/webroot");
        assert_eq!(
            resolve_under_root(root, "/index.html"),
            Some(PathBuf::from("/srv/webroot/index.html"))
        );
        assert_eq!(
            resolve_under_root(root, "/a/./b.txt"),
            Some(PathBuf::from("/srv/webroot/a/b.txt"))
        );
        assert_eq!(
            resolve_under_root(root, "/a/../b.txt"),
            Some(PathBuf::from("/srv/webroot/b.txt"))
        );
        assert_eq!(resolve_under_root(root, "/../etc/passwd"), None);
        assert_eq!(resolve_under_root(root, "/a/../../etc/passwd"), None);
    }
}
