use crate::types::{DigestError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// How a rendered digest leaves the process.
///
/// A closed set of methods rather than a plugin registry. `Sendmail`
/// writes a `sendmail -t` compatible message to stdout; actually
/// speaking SMTP is someone else's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Delivery {
    Stdout,
    File { path: PathBuf },
    Sendmail { to: String },
}

impl Delivery {
    pub fn deliver(&self, subject: &str, body: &str) -> Result<()> {
        match self {
            Delivery::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(body.as_bytes())?;
                Ok(())
            }
            Delivery::File { path } => {
                std::fs::write(path, body)?;
                info!("Wrote digest to {}", path.display());
                Ok(())
            }
            Delivery::Sendmail { to } => {
                if to.is_empty() {
                    return Err(DigestError::Delivery(
                        "sendmail delivery requires a `to` address".to_string(),
                    ));
                }
                let mut out = std::io::stdout().lock();
                writeln!(out, "To: {}", to)?;
                writeln!(out, "Subject: {}", subject)?;
                writeln!(out)?;
                out.write_all(body.as_bytes())?;
                info!("Emitted sendmail-format digest for {}", to);
                Ok(())
            }
        }
    }
}

impl Default for Delivery {
    fn default() -> Self {
        Delivery::Stdout
    }
}
