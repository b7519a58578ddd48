use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigurationError, Error};

/// Closed set of databases this process keeps a local replica of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseAlias {
    /// Market orders, stats and history. The primary data alias.
    Market,
    /// Static game data (type names, groups, categories).
    StaticData,
    /// Industry build-cost data.
    BuildCost,
}

/// Column whose maximum must match between replica and remote after a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessMarker {
    pub table: &'static str,
    pub column: &'static str,
}

impl FreshnessMarker {
    /// Scalar query returning the marker as text, or NULL on an empty table.
    pub fn query(&self) -> String {
        format!(
            "SELECT CAST(MAX({}) AS TEXT) AS value FROM {}",
            self.column, self.table
        )
    }
}

impl DatabaseAlias {
    pub const ALL: [DatabaseAlias; 3] = [
        DatabaseAlias::Market,
        DatabaseAlias::StaticData,
        DatabaseAlias::BuildCost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseAlias::Market => "market",
            DatabaseAlias::StaticData => "static-data",
            DatabaseAlias::BuildCost => "build-cost",
        }
    }

    /// Only the primary alias is validated against the remote after a sync.
    pub fn is_primary(&self) -> bool {
        matches!(self, DatabaseAlias::Market)
    }

    pub fn freshness_marker(&self) -> Option<FreshnessMarker> {
        match self {
            DatabaseAlias::Market => Some(FreshnessMarker {
                table: "marketstats",
                column: "last_update",
            }),
            DatabaseAlias::StaticData | DatabaseAlias::BuildCost => None,
        }
    }

    /// Default replica file name, relative to the data directory.
    pub fn default_path(&self) -> &'static str {
        match self {
            DatabaseAlias::Market => "wcmkt2.db",
            DatabaseAlias::StaticData => "sde.db",
            DatabaseAlias::BuildCost => "buildcost.db",
        }
    }

    /// Section of the secrets file holding the remote URL and token.
    pub fn secrets_section(&self) -> &'static str {
        match self {
            DatabaseAlias::Market => "wcmkt2_turso",
            DatabaseAlias::StaticData => "sde_aws_turso",
            DatabaseAlias::BuildCost => "buildcost_turso",
        }
    }

    fn available() -> String {
        Self::ALL
            .iter()
            .map(|alias| alias.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for DatabaseAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseAlias {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "market" | "wcmkt" | "wcmkt2" => Ok(DatabaseAlias::Market),
            "wcmkt3" => {
                log::warn!(
                    "Alias '{}' is deprecated, using '{}' instead",
                    value,
                    DatabaseAlias::Market
                );
                Ok(DatabaseAlias::Market)
            }
            "static-data" | "sde" => Ok(DatabaseAlias::StaticData),
            "build-cost" | "build_cost" | "buildcost" => Ok(DatabaseAlias::BuildCost),
            other => Err(ConfigurationError::UnknownAlias {
                alias: other.to_string(),
                available: Self::available(),
            }
            .into()),
        }
    }
}

/// SQL dialect tag carried by each alias, used to build the local URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    #[default]
    #[serde(rename = "sqlite+libsql")]
    SqliteLibsql,
    #[serde(rename = "sqlite")]
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::SqliteLibsql => "sqlite+libsql",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "sqlite+libsql" => Ok(Dialect::SqliteLibsql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(ConfigurationError::invalid_value(
                "dialect",
                format!("unsupported dialect '{}'", other),
            )
            .into()),
        }
    }
}
