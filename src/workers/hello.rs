use super::WebWorker;
use crate::server::ResponseContext;

/// Greets the client and reports the letter count of the `name`
/// parameter, or complains when none was sent.
pub struct Hello;

impl WebWorker for Hello {
    fn process(&self, ctx: &mut ResponseContext) -> anyhow::Result<()> {
        ctx.set_mime_type("text/html")?;

        ctx.write_str("<html><body>")?;
        ctx.write_str("<h1>Hello!!!</h1>")?;
        match ctx.get_parameter("name").filter(|n| !n.trim().is_empty()) {
            Some(name) => {
                ctx.write_str(&format!(
                    "<p>Your name has {} letters.</p>",
                    name.trim().chars().count()
                ))?;
            }
            None => {
                ctx.write_str("<p>You did not send me your name!</p>")?;
            }
        }
        ctx.write_str("</body></html>")?;
        Ok(())
    }
}
