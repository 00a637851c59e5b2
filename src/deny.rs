//! Denial page rendering
//!
//! The 403 body comes from an operator-supplied HTML template when one is
//! configured and readable at construction; every occurrence of the literal
//! `{{STATE}}` marker is replaced with the blocking jurisdiction code. The
//! template is read exactly once, at construction. When loading fails, the
//! handler still constructs and a generated fragment is served instead for
//! the rest of the process lifetime.

use std::path::Path;

use tracing::{info, warn};

/// Marker substituted with the blocking jurisdiction code
pub const STATE_MARKER: &str = "{{STATE}}";

/// Content type of every denial response
pub const CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Renders the forbidden response body
#[derive(Debug, Clone, Default)]
pub struct DenyPage {
    template: Option<String>,
}

impl DenyPage {
    /// Load the template once; failure is non-fatal and falls back to the
    /// generated fragment
    pub fn load(template_path: Option<&Path>) -> Self {
        let template = template_path.and_then(|path| match std::fs::read_to_string(path) {
            Ok(content) => {
                info!(path = %path.display(), "loaded denial page template");
                Some(content)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load denial page template, using built-in page");
                None
            }
        });

        Self { template }
    }

    /// Build a responder from already-loaded template content
    pub fn from_template(template: String) -> Self {
        Self {
            template: Some(template),
        }
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }

    /// Render the denial body for a blocking jurisdiction code
    pub fn render(&self, reason_code: &str) -> String {
        match &self.template {
            Some(template) => template.replace(STATE_MARKER, reason_code),
            None => format!(
                "<!DOCTYPE html>\n<html>\n<head><title>Access Denied</title></head>\n\
                 <body>\n<h1>403 Forbidden</h1>\n\
                 <p>Access denied from: {}</p>\n</body>\n</html>\n",
                reason_code
            ),
        }
    }
}
