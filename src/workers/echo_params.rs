use super::WebWorker;
use crate::server::ResponseContext;

/// Writes the request parameters back as an HTML table.
pub struct EchoParams;

impl WebWorker for EchoParams {
    fn process(&self, ctx: &mut ResponseContext) -> anyhow::Result<()> {
        ctx.set_mime_type("text/html")?;

        ctx.write_str(
            "<html>\r\n\
             \x20 <head>\r\n\
             \x20   <title>Requested parameters</title>\r\n\
             \x20 </head>\r\n\
             \x20 <body>\r\n\
             \x20   <h1>Requested parameters</h1>\r\n\
             \x20   <table border='1'>\r\n",
        )?;
        for name in ctx.parameter_names() {
            let value = ctx.get_parameter(&name).unwrap_or_default();
            ctx.write_str(&format!(
                "      <tr><td>{name}</td><td>{value}</td></tr>\r\n"
            ))?;
        }
        ctx.write_str(
            "    </table>\r\n\
             \x20 </body>\r\n\
             </html>\r\n",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::SessionStore;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parameters_rendered_as_rows() {
        let buf = SharedBuf::default();
        let mut params = HashMap::new();
        params.insert("name".to_string(), Some("pero".to_string()));
        params.insert("age".to_string(), Some("33".to_string()));
        let mut ctx = ResponseContext::new(
            Box::new(buf.clone()),
            params,
            SessionStore::default(),
            Vec::new(),
        );

        EchoParams.process(&mut ctx).unwrap();
        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("Content-Type: text/html; charset=UTF-8"));
        assert!(out.contains("<tr><td>age</td><td>33</td></tr>"));
        assert!(out.contains("<tr><td>name</td><td>pero</td></tr>"));
    }
}
