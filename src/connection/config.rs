use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};

const URL_SCHEME: &str = "rustmemodb://";

/// Per-connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Database name, used for diagnostics
    pub database: String,

    /// What happens to a transaction dropped while still active:
    /// commit when true, rollback when false
    pub transaction_autocommit: bool,

    /// Whether a new connection starts open
    pub auto_open: bool,
}

impl ConnectionConfig {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            transaction_autocommit: false,
            auto_open: true,
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Set the autocommit-on-abandon policy
    pub fn transaction_autocommit(mut self, enabled: bool) -> Self {
        self.transaction_autocommit = enabled;
        self
    }

    pub fn auto_open(mut self, enabled: bool) -> Self {
        self.auto_open = enabled;
        self
    }

    /// Parse from connection string
    ///
    /// Format: "rustmemodb://database?transaction_autocommit=true&auto_open=false"
    ///
    /// # Examples
    ///
    /// ```
    /// use rustmemodb_tx::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::from_url("rustmemodb://blog?transaction_autocommit=true").unwrap();
    /// assert_eq!(config.database, "blog");
    /// assert!(config.transaction_autocommit);
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url.strip_prefix(URL_SCHEME).ok_or_else(|| {
            DbError::ConfigError(format!("URL must start with '{}'", URL_SCHEME))
        })?;

        let (database, query) = match rest.split_once('?') {
            Some((database, query)) => (database, Some(query)),
            None => (rest, None),
        };

        let mut config = Self::new(database);
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                DbError::ConfigError(format!("Invalid parameter '{}'", pair))
            })?;
            match key {
                "transaction_autocommit" => config.transaction_autocommit = parse_flag(key, value)?,
                "auto_open" => config.auto_open = parse_flag(key, value)?,
                _ => {
                    return Err(DbError::ConfigError(format!("Unknown parameter '{}'", key)));
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        format!(
            "{}{}?transaction_autocommit={}&auto_open={}",
            URL_SCHEME, self.database, self.transaction_autocommit, self.auto_open
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(DbError::ConfigError("Database name cannot be empty".into()));
        }

        if !self
            .database
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DbError::ConfigError(format!(
                "Invalid database name '{}'",
                self.database
            )));
        }

        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("rustmemodb")
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(DbError::ConfigError(format!(
            "Parameter '{}' expects a boolean, got '{}'",
            key, value
        ))),
    }
}
