use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::env;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Which object store client backs the blob service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Azure,
    Local,
    Memory,
}

impl Backend {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown storage backend `{}` (expected azure, local or memory)", other),
        }
    }
}

/// Storage account settings handed to the blob service and its client.
#[derive(Clone)]
pub struct StorageConfig {
    pub account_name: String,
    pub account_key: Option<String>,
    pub container_name: String,
    /// Overrides the public account endpoint, e.g. for an emulator.
    pub endpoint: Option<String>,
}

impl StorageConfig {
    /// Base URL every object URL starts with.
    pub fn account_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", self.account_name),
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("container_name", &self.container_name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub backend: Backend,
    pub storage_dir: String,
    pub max_upload_bytes: usize,
    pub storage: StorageConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image upload API backed by Azure Blob Storage")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Task database URL (overrides IMAGE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object store client (overrides IMAGE_STORE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory used by the local backend (overrides IMAGE_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Largest accepted upload body in bytes (overrides IMAGE_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Storage account name (overrides AZURE_STORAGE_ACCOUNT)
    #[arg(long)]
    pub account_name: Option<String>,

    /// Base64 storage account key (overrides AZURE_STORAGE_KEY)
    #[arg(long)]
    pub account_key: Option<String>,

    /// Container holding uploaded images (overrides AZURE_STORAGE_CONTAINER)
    #[arg(long)]
    pub container: Option<String>,

    /// Blob service endpoint (overrides AZURE_STORAGE_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args, |key| env::var(key))?, migrate))
    }

    /// Merge parsed arguments over values looked up with `var`.
    fn merge<F>(args: Args, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let optional = |key: &str| -> Result<Option<String>> {
            match var(key) {
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", key)),
            }
        };

        let env_port = match optional("IMAGE_STORE_PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing IMAGE_STORE_PORT value `{}`", value))?,
            None => 8080,
        };
        let env_max_upload = match optional("IMAGE_STORE_MAX_UPLOAD_BYTES")? {
            Some(value) => value.parse::<usize>().with_context(|| {
                format!("parsing IMAGE_STORE_MAX_UPLOAD_BYTES value `{}`", value)
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let env_backend = match optional("IMAGE_STORE_BACKEND")? {
            Some(value) => Backend::parse(&value)?,
            None => Backend::Azure,
        };

        let container_name = args
            .container
            .or(optional("AZURE_STORAGE_CONTAINER")?)
            .unwrap_or_else(|| "images".into());
        if container_name.is_empty() || container_name.contains('/') {
            bail!("container name `{}` is not valid", container_name);
        }

        let storage = StorageConfig {
            account_name: args
                .account_name
                .or(optional("AZURE_STORAGE_ACCOUNT")?)
                .unwrap_or_else(|| "devstoreaccount1".into()),
            account_key: args.account_key.or(optional("AZURE_STORAGE_KEY")?),
            container_name,
            endpoint: args.endpoint.or(optional("AZURE_STORAGE_ENDPOINT")?),
        };

        Ok(Self {
            host: args
                .host
                .or(optional("IMAGE_STORE_HOST")?)
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            database_url: args
                .database_url
                .or(optional("IMAGE_STORE_DATABASE_URL")?)
                .unwrap_or_else(|| "sqlite://./data/tasks.db".into()),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args
                .storage_dir
                .or(optional("IMAGE_STORE_STORAGE_DIR")?)
                .unwrap_or_else(|| "./data/objects".into()),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            storage,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_without_env_or_flags() {
        let cfg = AppConfig::merge(Args::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.backend, Backend::Azure);
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(cfg.storage.container_name, "images");
        assert_eq!(
            cfg.storage.account_url(),
            "https://devstoreaccount1.blob.core.windows.net"
        );
    }

    #[test]
    fn flags_override_environment() {
        let args = Args {
            port: Some(9000),
            container: Some("flag-container".into()),
            ..Args::default()
        };
        let cfg = AppConfig::merge(
            args,
            lookup(&[
                ("IMAGE_STORE_PORT", "7000"),
                ("IMAGE_STORE_BACKEND", "Local"),
                ("AZURE_STORAGE_ACCOUNT", "acme"),
                ("AZURE_STORAGE_CONTAINER", "env-container"),
                ("AZURE_STORAGE_ENDPOINT", "http://127.0.0.1:10000/acme/"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.backend, Backend::Local);
        assert_eq!(cfg.storage.account_name, "acme");
        assert_eq!(cfg.storage.container_name, "flag-container");
        assert_eq!(cfg.storage.account_url(), "http://127.0.0.1:10000/acme");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(AppConfig::merge(Args::default(), lookup(&[("IMAGE_STORE_PORT", "http")])).is_err());
        assert!(AppConfig::merge(Args::default(), lookup(&[("IMAGE_STORE_BACKEND", "s3")])).is_err());
        assert!(
            AppConfig::merge(Args::default(), lookup(&[("AZURE_STORAGE_CONTAINER", "a/b")])).is_err()
        );
    }

    #[test]
    fn account_key_is_redacted_in_debug_output() {
        let cfg = AppConfig::merge(Args::default(), lookup(&[("AZURE_STORAGE_KEY", "c2VjcmV0")])).unwrap();
        let printed = format!("{:?}", cfg);
        assert!(!printed.contains("c2VjcmV0"));
        assert!(printed.contains("<redacted>"));
    }
}
