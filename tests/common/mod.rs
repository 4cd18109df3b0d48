pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw HTTP request string and return the full raw HTTP
    /// response as a String. Reads headers fully, honors Content-Length
    /// for the body, and falls back to read-until-close when no length is
    /// provided (the server closes every connection after one response).
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(2000)))
            .unwrap();

        let mut buf = Vec::new();
        let mut header_end = None;
        for _ in 0..20 {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        header_end = Some(pos + 4);
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    std::thread::sleep(Duration::from_millis(50));
                    continue;
                }
                Err(e) => panic!("read error: {e:?}"),
            }
        }

        let header_end = header_end.unwrap_or(buf.len());
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = headers
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok());

        loop {
            if let Some(clen) = content_length {
                if buf.len().saturating_sub(header_end) >= clen {
                    break;
                }
            }
            let mut tmp = [0u8; 4096];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(e) => panic!("read error: {e:?}"),
            }
        }

        String::from_utf8_lossy(&buf).to_string()
    }

    /// Splits a raw response into (status, headers, body).
    pub fn parse_response(resp: &str) -> (u16, String, String) {
        let (headers, body) = resp
            .split_once("\r\n\r\n")
            .unwrap_or((resp, ""));
        let status = headers
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        (status, headers.to_string(), body.to_string())
    }

    /// Extracts a header value (case-insensitive name match).
    pub fn header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
        headers
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }
}
