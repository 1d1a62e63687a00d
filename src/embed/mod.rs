//! Embedded static resources.
//!
//! - `serve::LIVERELOAD_JS` - browser client served at `/livereload.js`
//! - `serve::STATUS_HTML` - fallback page of `devloop run`

mod template;

pub use template::{Template, TemplateVars};

pub mod serve {
    use super::{Template, TemplateVars};

    /// LiveReload v7 client script.
    pub const LIVERELOAD_JS: &str = include_str!("serve/livereload.js");

    /// Variables for status.html.
    pub struct StatusVars {
        pub name: String,
        pub root: String,
        pub version: &'static str,
    }

    impl TemplateVars for StatusVars {
        fn apply(&self, content: &str) -> String {
            content
                .replace("__NAME__", &escape(&self.name))
                .replace("__ROOT__", &escape(&self.root))
                .replace("__VERSION__", self.version)
        }
    }

    /// Status page served for every non-reserved path.
    pub const STATUS_HTML: Template<StatusVars> =
        Template::new(include_str!("serve/status.html"));

    fn escape(s: &str) -> String {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
    }
}
