//! Message template handling.
//!
//! Receivers carry their template sources inline in the configuration; the
//! `templates` globs in the config file add shared template files that inline
//! sources can `{% include %}`.

use tera::Tera;

use crate::config::ConfigError;
use crate::message::AlertMessage;

#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    tera: Tera,
}

impl TemplateSet {
    /// Load every template matching the given glob patterns.
    ///
    /// A pattern matching no files is fine; an invalid pattern or an
    /// unparseable template file is an operator error and fails startup.
    pub fn from_globs(globs: &[String]) -> Result<Self, ConfigError> {
        let mut tera = Tera::default();
        for pattern in globs {
            let loaded = Tera::new(pattern)?;
            tera.extend(&loaded)?;
        }
        Ok(Self { tera })
    }

    /// Render an inline template source against an alert message.
    ///
    /// The message is exposed with its wire field names, so sources look like
    /// `{{ status }}: {{ groupLabels.alertname }}`.
    pub fn render(&self, source: &str, message: &AlertMessage) -> Result<String, tera::Error> {
        let context = tera::Context::from_serialize(message)?;
        // render_str needs a mutable instance; render on a throwaway copy so
        // the shared set stays read-only after startup.
        let mut tera = self.tera.clone();
        tera.render_str(source, &context)
    }
}
