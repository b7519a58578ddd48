use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::alias::{DatabaseAlias, Dialect};
use crate::errors::{ConfigurationError, Result};

/// Where the secrets file lives when nothing else is configured.
pub const DEFAULT_SECRETS_PATH: &str = ".streamlit/secrets.toml";

/// Resolved configuration for one alias. Immutable once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct AliasConfig {
    pub alias: DatabaseAlias,
    pub local_path: PathBuf,
    pub remote_url: String,
    pub auth_token: String,
    pub dialect: Dialect,
}

impl AliasConfig {
    /// URL of the local replica in `dialect:///path` form.
    pub fn local_url(&self) -> String {
        format!("{}:///{}", self.dialect, self.local_path.display())
    }

    /// HTTP(S) base URL of the remote canonical store.
    pub fn remote_http_url(&self) -> String {
        normalize_remote_url(&self.remote_url)
    }

    pub fn replica_exists(&self) -> bool {
        self.local_path.is_file()
    }
}

impl fmt::Debug for AliasConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasConfig")
            .field("alias", &self.alias)
            .field("local_path", &self.local_path)
            .field("remote_url", &self.remote_url)
            .field("auth_token", &"<redacted>")
            .field("dialect", &self.dialect)
            .finish()
    }
}

/// Maps `libsql://host` to `https://host` and trims trailing slashes.
pub fn normalize_remote_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if let Some(host) = trimmed.strip_prefix("libsql://") {
        return format!("https://{}", host);
    }
    if let Some(host) = trimmed.strip_prefix("wss://") {
        return format!("https://{}", host);
    }
    if let Some(host) = trimmed.strip_prefix("ws://") {
        return format!("http://{}", host);
    }
    trimmed.to_string()
}

#[derive(Debug, Default, Deserialize)]
struct RemoteSection {
    url: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LocalOverride {
    path: Option<String>,
    dialect: Option<String>,
}

/// The full alias table, validated for every alias at construction.
#[derive(Debug, Clone)]
pub struct DatabaseConfigTable {
    entries: BTreeMap<DatabaseAlias, AliasConfig>,
}

impl DatabaseConfigTable {
    /// Builds a table from already-resolved entries. Every alias must be present.
    pub fn new(entries: impl IntoIterator<Item = AliasConfig>) -> Result<Self> {
        let entries: BTreeMap<DatabaseAlias, AliasConfig> = entries
            .into_iter()
            .map(|config| (config.alias, config))
            .collect();
        for alias in DatabaseAlias::ALL {
            let config = entries
                .get(&alias)
                .ok_or_else(|| ConfigurationError::missing_field(alias.as_str(), "configuration"))?;
            validate_entry(config)?;
        }
        Ok(Self { entries })
    }

    /// Reads a secrets file from disk. Relative replica paths are joined to `data_dir`.
    pub fn load(path: impl AsRef<Path>, data_dir: Option<&Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::Unreadable(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents, data_dir)
    }

    /// Parses the secrets format: one `[<section>]` with `url`/`token` per alias,
    /// optional `[databases.<alias>]` overrides for `path` and `dialect`, and an
    /// optional top-level `data_dir`.
    pub fn from_toml_str(contents: &str, data_dir: Option<&Path>) -> Result<Self> {
        let root: toml::Table = contents
            .parse()
            .map_err(|e: toml::de::Error| ConfigurationError::Unreadable(e.to_string()))?;

        let file_data_dir = root
            .get("data_dir")
            .and_then(|value| value.as_str())
            .map(PathBuf::from);
        let base_dir = data_dir.map(Path::to_path_buf).or(file_data_dir);

        let overrides = root.get("databases").and_then(|value| value.as_table());

        let mut entries = Vec::with_capacity(DatabaseAlias::ALL.len());
        for alias in DatabaseAlias::ALL {
            let section: RemoteSection = match root.get(alias.secrets_section()) {
                Some(value) => value.clone().try_into().map_err(|e: toml::de::Error| {
                    ConfigurationError::invalid_value(alias.secrets_section(), e.to_string())
                })?,
                None => {
                    return Err(ConfigurationError::missing_field(
                        alias.as_str(),
                        alias.secrets_section(),
                    )
                    .into())
                }
            };

            let local: LocalOverride = match overrides.and_then(|t| t.get(alias.as_str())) {
                Some(value) => value.clone().try_into().map_err(|e: toml::de::Error| {
                    ConfigurationError::invalid_value(
                        format!("databases.{}", alias.as_str()),
                        e.to_string(),
                    )
                })?,
                None => LocalOverride::default(),
            };

            let dialect = match local.dialect.as_deref() {
                Some(tag) => tag.parse()?,
                None => Dialect::default(),
            };

            let relative = PathBuf::from(local.path.as_deref().unwrap_or(alias.default_path()));
            let local_path = match &base_dir {
                Some(dir) if relative.is_relative() => dir.join(relative),
                _ => relative,
            };

            entries.push(AliasConfig {
                alias,
                local_path,
                remote_url: section.url.unwrap_or_default(),
                auth_token: section.token.unwrap_or_default(),
                dialect,
            });
        }

        Self::new(entries)
    }

    /// Configuration for `alias`. Infallible once the table exists.
    pub fn get(&self, alias: DatabaseAlias) -> &AliasConfig {
        // Construction guarantees every alias is present.
        &self.entries[&alias]
    }

    /// Resolves a configured alias name, including legacy names.
    pub fn resolve(&self, name: &str) -> Result<&AliasConfig> {
        let alias: DatabaseAlias = name.parse()?;
        Ok(self.get(alias))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AliasConfig> {
        self.entries.values()
    }
}

fn validate_entry(config: &AliasConfig) -> Result<()> {
    let alias = config.alias.as_str();
    if config.local_path.as_os_str().is_empty() {
        return Err(ConfigurationError::missing_field(alias, "path").into());
    }
    if config.remote_url.trim().is_empty() {
        return Err(ConfigurationError::missing_field(alias, "url").into());
    }
    if config.auth_token.trim().is_empty() {
        return Err(ConfigurationError::missing_field(alias, "token").into());
    }
    let url = config.remote_http_url();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigurationError::invalid_value(
            format!("{}.url", config.alias.secrets_section()),
            format!("unsupported scheme in '{}'", config.remote_url),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    const SECRETS: &str = r#"
[wcmkt2_turso]
url = "libsql://wcmkt2-example.turso.io"
token = "market-token"

[sde_aws_turso]
url = "libsql://sde-example.turso.io/"
token = "sde-token"

[buildcost_turso]
url = "https://buildcost-example.turso.io"
token = "buildcost-token"

[databases.build-cost]
path = "data/buildcost-local.db"
dialect = "sqlite"
"#;

    #[test]
    fn parses_secrets_with_defaults_and_overrides() {
        let table = DatabaseConfigTable::from_toml_str(SECRETS, Some(Path::new("/srv/wcmkt")))
            .expect("parse secrets");

        let market = table.get(DatabaseAlias::Market);
        assert_eq!(market.local_path, PathBuf::from("/srv/wcmkt/wcmkt2.db"));
        assert_eq!(market.remote_http_url(), "https://wcmkt2-example.turso.io");
        assert_eq!(market.local_url(), "sqlite+libsql:////srv/wcmkt/wcmkt2.db");

        let sde = table.resolve("sde").unwrap();
        assert_eq!(sde.remote_http_url(), "https://sde-example.turso.io");

        let build_cost = table.get(DatabaseAlias::BuildCost);
        assert_eq!(
            build_cost.local_path,
            PathBuf::from("/srv/wcmkt/data/buildcost-local.db")
        );
        assert_eq!(build_cost.dialect, Dialect::Sqlite);
    }

    #[test]
    fn missing_token_fails_at_load() {
        let secrets = SECRETS.replace("token = \"sde-token\"", "");
        let err = DatabaseConfigTable::from_toml_str(&secrets, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::MissingField { ref alias, ref field })
                if alias == "static-data" && field == "token"
        ));
    }

    #[test]
    fn missing_section_fails_at_load() {
        let secrets = SECRETS.replace("[buildcost_turso]", "[other_turso]");
        let err = DatabaseConfigTable::from_toml_str(&secrets, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::MissingField { ref field, .. })
                if field == "buildcost_turso"
        ));
    }

    #[test]
    fn resolve_unknown_alias_fails() {
        let table = DatabaseConfigTable::from_toml_str(SECRETS, None).unwrap();
        assert!(matches!(
            table.resolve("nonexistent-alias"),
            Err(Error::Configuration(ConfigurationError::UnknownAlias { .. }))
        ));
    }

    #[test]
    fn debug_output_redacts_token() {
        let table = DatabaseConfigTable::from_toml_str(SECRETS, None).unwrap();
        let rendered = format!("{:?}", table.get(DatabaseAlias::Market));
        assert!(!rendered.contains("market-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("secrets.toml");
        std::fs::write(&path, SECRETS).expect("write secrets");
        let table = DatabaseConfigTable::load(&path, Some(dir.path())).expect("load");
        assert_eq!(
            table.get(DatabaseAlias::StaticData).local_path,
            dir.path().join("sde.db")
        );
    }
}
