//! Output formatting for CLI commands
//!
//! Secrets print as JSON or YAML. Values are redacted unless explicitly shown.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::store::Secret;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Printable view of a secret.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretView {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

impl SecretView {
    pub fn new(secret: &Secret, show_values: bool) -> Self {
        let data = secret
            .data
            .iter()
            .map(|(key, value)| {
                let shown = if show_values {
                    String::from_utf8_lossy(value).into_owned()
                } else {
                    format!("<redacted, {} bytes>", value.len())
                };
                (key.clone(), shown)
            })
            .collect();

        let metadata = secret.metadata.clone().unwrap_or_default();
        Self {
            name: secret.scoped_name.name.clone(),
            scope: secret.scoped_name.scope.clone(),
            owner_uid: metadata.owner_uid,
            secret_type: metadata.secret_type,
            labels: metadata.labels,
            data,
        }
    }
}

/// Render data in the given format.
pub fn render<T: Serialize>(data: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(data).context("Failed to serialize to JSON")
        }
        OutputFormat::Yaml => serde_yaml::to_string(data).context("Failed to serialize to YAML"),
    }
}

/// Print data in the given format.
pub fn print_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<()> {
    println!("{}", render(data, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{key_values, ScopedName};

    fn secret() -> Secret {
        let mut secret = Secret::new(ScopedName::new("db", "team-a"))
            .with_data(key_values([("password", "s3cr3t")]));
        secret.set_owner_uid("uid-1");
        secret
    }

    #[test]
    fn test_values_redacted_by_default() {
        let rendered = render(&SecretView::new(&secret(), false), OutputFormat::Json).unwrap();
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("<redacted, 6 bytes>"));
        assert!(rendered.contains("\"ownerUid\": \"uid-1\""));
    }

    #[test]
    fn test_values_shown_on_request() {
        let rendered = render(&SecretView::new(&secret(), true), OutputFormat::Yaml).unwrap();
        assert!(rendered.contains("password: s3cr3t"));
    }
}
