//! Environment configuration.
//!
//! Everything comes from the process environment: `S3_*` for the blob store,
//! `POSTGRESQL_*` for the relational store, plus a handful of raw variables
//! for the server itself. No config files; the coordinator is built to run
//! in a container with its settings injected.

use figment::providers::{Env, Serialized};
use figment::Figment;
use hoard_db::DbSettings;
use serde::{Deserialize, Serialize};

/// Blob store settings, one field per `S3_*` environment variable.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Settings {
    pub public_key: String,
    pub private_key: String,
    pub region_name: String,
    pub endpoint: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Shared secret for the worker endpoints. Leaving it unset runs an open
    /// instance, which is only sensible behind some other gate.
    pub admin_token: Option<String>,
    /// `"virtual"` (bucket subdomains) or `"path"` for S3-compatible
    /// services that don't do virtual hosting.
    pub address_style: String,
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            admin_token: None,
            address_style: "virtual".to_string(),
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ServerSettings {
    pub fn virtual_addressing(&self) -> bool {
        self.address_style != "path"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerSettings,
    pub s3: S3Settings,
    pub db: DbSettings,
}

impl Config {
    /// Assemble the full configuration from the process environment.
    pub fn from_env() -> Result<Self, figment::Error> {
        let server = Figment::from(Serialized::defaults(ServerSettings::default()))
            .merge(Env::prefixed("").only(&["admin_token", "address_style", "bind"]))
            .extract()?;
        let s3 = Figment::new().merge(Env::prefixed("S3_")).extract()?;
        let db = Figment::new().merge(Env::prefixed("POSTGRESQL_")).extract()?;
        Ok(Self { server, s3, db })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_all(jail: &mut figment::Jail) {
        jail.set_env("S3_PUBLIC_KEY", "pk");
        jail.set_env("S3_PRIVATE_KEY", "sk");
        jail.set_env("S3_REGION_NAME", "garage");
        jail.set_env("S3_ENDPOINT", "http://127.0.0.1:3900");
        jail.set_env("S3_BUCKET", "works");
        jail.set_env("POSTGRESQL_DATABASE", "hoard");
        jail.set_env("POSTGRESQL_HOST", "127.0.0.1");
        jail.set_env("POSTGRESQL_USER", "hoard");
        jail.set_env("POSTGRESQL_PASSWORD", "secret");
        jail.set_env("POSTGRESQL_PORT", "5432");
    }

    #[test]
    fn test_full_environment() {
        figment::Jail::expect_with(|jail| {
            set_all(jail);
            jail.set_env("ADMIN_TOKEN", "hunter2");
            jail.set_env("ADDRESS_STYLE", "path");
            jail.set_env("BIND", "127.0.0.1:9000");
            let config = Config::from_env().expect("config extracts");
            assert_eq!(config.server.admin_token.as_deref(), Some("hunter2"));
            assert!(!config.server.virtual_addressing());
            assert_eq!(config.server.bind, "127.0.0.1:9000");
            assert_eq!(config.s3.bucket, "works");
            assert_eq!(config.db.port, 5432);
            Ok(())
        });
    }

    #[test]
    fn test_server_defaults() {
        figment::Jail::expect_with(|jail| {
            set_all(jail);
            let config = Config::from_env().expect("config extracts");
            assert_eq!(config.server.admin_token, None);
            assert!(config.server.virtual_addressing());
            assert_eq!(config.server.bind, "0.0.0.0:8000");
            Ok(())
        });
    }

    #[test]
    fn test_missing_s3_settings_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("POSTGRESQL_DATABASE", "hoard");
            assert!(Config::from_env().is_err());
            Ok(())
        });
    }
}
