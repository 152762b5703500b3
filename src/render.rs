use crate::context::Context;
use crate::settings::Settings;
use crate::types::{DigestError, Result};

/// The seam a template engine plugs into. The engine only promises a
/// read-only [`Context`] tree; how it is traversed is the renderer's
/// business.
pub trait Render {
    fn render(&self, context: &Context, settings: &Settings) -> Result<String>;
}

/// Select a renderer by the configured template name.
pub fn renderer_for(template: &str) -> Result<Box<dyn Render>> {
    match template {
        "plain" => Ok(Box::new(PlainRenderer)),
        other => Err(DigestError::Config(format!("unknown template: {}", other))),
    }
}

/// Built-in plain-text renderer.
pub struct PlainRenderer;

impl Render for PlainRenderer {
    fn render(&self, context: &Context, settings: &Settings) -> Result<String> {
        let mut out = String::new();
        let name = settings
            .name
            .as_deref()
            .unwrap_or(&context.profile_name);

        out.push_str(&format!("RSS digest for {}\n", name));
        out.push_str(&format!(
            "Run at {}\n",
            settings.format_datetime(context.run_started_utc)
        ));
        if let Some(last) = context.last_run_utc {
            out.push_str(&format!("Previous run: {}\n", settings.format_datetime(last)));
        }
        out.push('\n');

        if context.categories.is_empty() {
            out.push_str("No feeds have been updated since the last run.\n");
        }

        for category in &context.categories {
            out.push_str(&format!("== {} ==\n\n", category.display_name));
            for feed in &category.visible_feeds {
                out.push_str(&format!("{} ({} new)\n", feed.title, feed.total_entries()));
                for entry in &feed.visible_entries {
                    let title = entry.title.as_deref().unwrap_or("(untitled)");
                    out.push_str(&format!("  - {}", title));
                    if let Some(t) = entry.effective_updated() {
                        out.push_str(&format!(" [{}]", settings.format_datetime(t)));
                    }
                    if let Some(link) = &entry.link {
                        out.push_str(&format!("\n    {}", link));
                    }
                    out.push('\n');
                }
                if feed.hidden_entries > 0 {
                    out.push_str(&format!(
                        "  ... and {} more new entries\n",
                        feed.hidden_entries
                    ));
                }
                out.push('\n');
            }
            if category.hidden_feeds > 0 {
                out.push_str(&format!(
                    "({} more updated feeds in this category)\n\n",
                    category.hidden_feeds
                ));
            }
        }

        if !context.errors.is_empty() {
            out.push_str("Errors\n------\n");
            for err in &context.errors {
                out.push_str(&format!("{}: {}\n", err.url, err.message));
            }
        }

        Ok(out)
    }
}
