//! # Command Line Interface
//!
//! Reads, writes and deletes connection secrets through any configured store.
//! The store comes from a StoreConfig in the cluster or from a local YAML file.

pub mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{LogFormat, ManagerSettings};
use crate::connection::{default_registry, DetailsManager};
use crate::observability::{init_logging, log_settings};
use crate::store::{
    BuildContext, KeyValues, MustBeOwnedBy, ScopedName, Secret, SecretMetadata, Store,
    StoreConfigSpec,
};

use output::{print_output, OutputFormat, SecretView};

#[derive(Parser)]
#[command(name = "connstore")]
#[command(about = "Connection secret store tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// StoreConfig to use (default: CONNSTORE_DEFAULT_STORE_CONFIG)
    #[arg(long, global = true, conflicts_with = "store_config_file")]
    pub store_config: Option<String>,

    /// Local YAML StoreConfig (a full object or just its spec)
    #[arg(long, global = true)]
    pub store_config_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log in JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read a secret
    Get {
        /// Secret name, optionally scoped as `scope/name`
        name: String,

        /// Print values instead of redacting them
        #[arg(long)]
        show_values: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        output: OutputFormat,
    },

    /// Merge key/values into a secret
    Apply {
        /// Secret name, optionally scoped as `scope/name`
        name: String,

        /// Literal value, as `key=value`
        #[arg(long = "set", value_parser = parse_pair)]
        values: Vec<(String, String)>,

        /// Value read from a file, as `key=path`
        #[arg(long = "set-file", value_parser = parse_pair)]
        files: Vec<(String, String)>,

        /// Label, as `key=value`
        #[arg(long = "label", value_parser = parse_pair)]
        labels: Vec<(String, String)>,

        /// Secret type
        #[arg(long = "type")]
        secret_type: Option<String>,

        /// Stamp this owner and refuse to touch secrets owned by anyone else
        #[arg(long)]
        owner_uid: Option<String>,
    },

    /// Delete keys from a secret, or the whole secret when no key is given
    Delete {
        /// Secret name, optionally scoped as `scope/name`
        name: String,

        /// Key to remove
        #[arg(long = "key")]
        keys: Vec<String>,

        /// Refuse to delete unless the secret is owned by this UID
        #[arg(long)]
        owner_uid: Option<String>,
    },
}

/// Run CLI commands
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = ManagerSettings::from_env()?;
    if cli.verbose {
        settings.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        settings.logging.format = LogFormat::Json;
    }
    init_logging(&settings.logging);
    log_settings(&settings);

    let store = open_store(&cli, &settings).await?;

    match cli.command {
        Commands::Get { name, show_values, output } => {
            let secret = store.read_key_values(&parse_scoped_name(&name)).await?;
            print_output(&SecretView::new(&secret, show_values), output)?;
        }
        Commands::Apply { name, values, files, labels, secret_type, owner_uid } => {
            let mut data: KeyValues =
                values.into_iter().map(|(key, value)| (key, value.into_bytes())).collect();
            for (key, path) in files {
                let value = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read value for {key} from {path}"))?;
                data.insert(key, value);
            }

            let metadata = SecretMetadata {
                labels: labels.into_iter().collect(),
                secret_type,
                owner_uid: owner_uid.clone(),
                ..Default::default()
            };
            let mut secret = Secret::new(parse_scoped_name(&name)).with_data(data);
            if !metadata.is_empty() {
                secret.metadata = Some(metadata);
            }

            let changed = match owner_uid {
                Some(uid) => store.write_key_values(&secret, &[&MustBeOwnedBy::new(uid)]).await?,
                None => store.write_key_values(&secret, &[]).await?,
            };
            println!("{} {}", secret.scoped_name, if changed { "changed" } else { "unchanged" });
        }
        Commands::Delete { name, keys, owner_uid } => {
            let data: KeyValues = keys.into_iter().map(|key| (key, Vec::new())).collect();
            let secret = Secret::new(parse_scoped_name(&name)).with_data(data);
            match owner_uid {
                Some(uid) => store.delete_key_values(&secret, &[&MustBeOwnedBy::new(uid)]).await?,
                None => store.delete_key_values(&secret, &[]).await?,
            }
            println!("{} deleted", secret.scoped_name);
        }
    }

    Ok(())
}

async fn open_store(cli: &Cli, settings: &ManagerSettings) -> Result<Box<dyn Store>> {
    if let Some(path) = &cli.store_config_file {
        let spec = load_store_config_file(path)?;
        // A local cluster is optional when the config is given as a file.
        let local = kube::Client::try_default().await.ok();
        let store = default_registry(settings)
            .build(BuildContext::new(local, spec))
            .await
            .with_context(|| format!("Failed to build store from {}", path.display()))?;
        return Ok(store);
    }

    let client = kube::Client::try_default().await.context("Failed to create Kubernetes client")?;
    let manager = DetailsManager::from_settings(client, settings);
    let name = cli.store_config.as_deref().unwrap_or(&settings.default_store_config);
    let store = manager.connect(name).await?;
    Ok(store)
}

/// Read a StoreConfig spec from YAML, accepting a full object or a bare spec.
pub fn load_store_config_file(path: &Path) -> Result<StoreConfigSpec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read store config {}", path.display()))?;
    parse_store_config(&raw).with_context(|| format!("Invalid store config {}", path.display()))
}

fn parse_store_config(raw: &str) -> Result<StoreConfigSpec> {
    let value: serde_yaml::Value = serde_yaml::from_str(raw)?;
    let spec = match value.get("spec") {
        Some(spec) => spec.clone(),
        None => value,
    };
    Ok(serde_yaml::from_value(spec)?)
}

/// `scope/name` or `name`.
pub fn parse_scoped_name(raw: &str) -> ScopedName {
    match raw.split_once('/') {
        Some((scope, name)) => ScopedName::new(name, scope),
        None => ScopedName::new(raw, ""),
    }
}

fn parse_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreType;

    #[test]
    fn test_parse_scoped_name() {
        assert_eq!(parse_scoped_name("team-a/db"), ScopedName::new("db", "team-a"));
        assert_eq!(parse_scoped_name("db"), ScopedName::new("db", ""));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("user=admin").unwrap(), ("user".into(), "admin".into()));
        assert_eq!(parse_pair("url=a=b").unwrap(), ("url".into(), "a=b".into()));
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn test_parse_store_config_object_and_bare_spec() {
        let object = r#"
apiVersion: secrets.connstore.io/v1alpha1
kind: StoreConfig
metadata:
  name: vault
spec:
  type: Vault
  defaultScope: connections
  vault:
    server: https://vault:8200
"#;
        let spec = parse_store_config(object).unwrap();
        assert_eq!(spec.store_type, StoreType::Vault);
        assert_eq!(spec.default_scope, "connections");

        let bare = "type: Kubernetes\ndefaultScope: team-a\n";
        let spec = parse_store_config(bare).unwrap();
        assert_eq!(spec.store_type, StoreType::Kubernetes);
    }

    #[test]
    fn test_cli_parses_apply() {
        let cli = Cli::try_parse_from([
            "connstore",
            "--store-config",
            "vault",
            "apply",
            "team-a/db",
            "--set",
            "password=s3cr3t",
            "--owner-uid",
            "uid-1",
        ])
        .unwrap();

        assert_eq!(cli.store_config.as_deref(), Some("vault"));
        match cli.command {
            Commands::Apply { name, values, owner_uid, .. } => {
                assert_eq!(name, "team-a/db");
                assert_eq!(values, vec![("password".to_string(), "s3cr3t".to_string())]);
                assert_eq!(owner_uid.as_deref(), Some("uid-1"));
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_store_config_flags_conflict() {
        let result = Cli::try_parse_from([
            "connstore",
            "--store-config",
            "vault",
            "--store-config-file",
            "vault.yaml",
            "get",
            "db",
        ]);
        assert!(result.is_err());
    }
}
