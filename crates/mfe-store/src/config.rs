use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub const DEFAULT_DATABASE_NAME: &str = "mfe-store";
pub const DEFAULT_TABLE_NAME: &str = "store";

/// Names that scope a store engine's data and notifications.
///
/// Every field is optional in serialized form:
///
/// ```toml
/// database_name = "shell"
/// table_name = "state"
/// channel_name = "shell-sync"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_name: String,
    pub table_name: String,
    /// Broadcast channel and event-bus namespace. Defaults to `database_name`.
    pub channel_name: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE_NAME.into(),
            table_name: DEFAULT_TABLE_NAME.into(),
            channel_name: None,
        }
    }
}

impl StoreConfig {
    /// Default table and channel inside `database_name`.
    pub fn for_database(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_channel(mut self, channel_name: impl Into<String>) -> Self {
        self.channel_name = Some(channel_name.into());
        self
    }

    /// The effective channel name.
    pub fn channel_name(&self) -> &str {
        self.channel_name.as_deref().unwrap_or(&self.database_name)
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty names.
    pub fn validate(&self) -> StoreResult<()> {
        if self.database_name.trim().is_empty() {
            return Err(StoreError::Config("database_name must not be empty".into()));
        }
        if self.table_name.trim().is_empty() {
            return Err(StoreError::Config("table_name must not be empty".into()));
        }
        if self.channel_name().trim().is_empty() {
            return Err(StoreError::Config("channel_name must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = StoreConfig::default();
        assert_eq!(c.database_name, "mfe-store");
        assert_eq!(c.table_name, "store");
        assert_eq!(c.channel_name(), "mfe-store");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn channel_follows_database_unless_set() {
        let c = StoreConfig::for_database("shell");
        assert_eq!(c.channel_name(), "shell");
        let c = c.with_channel("shell-sync").with_table("state");
        assert_eq!(c.channel_name(), "shell-sync");
        assert_eq!(c.table_name, "state");
    }

    #[test]
    fn parse_partial_toml() {
        let c = StoreConfig::from_toml_str(r#"database_name = "cart""#).unwrap();
        assert_eq!(c.database_name, "cart");
        assert_eq!(c.table_name, "store");
        assert_eq!(c.channel_name(), "cart");
    }

    #[test]
    fn parse_full_toml() {
        let c = StoreConfig::from_toml_str(
            r#"
            database_name = "shell"
            table_name = "state"
            channel_name = "shell-sync"
            "#,
        )
        .unwrap();
        assert_eq!(
            c,
            StoreConfig::for_database("shell")
                .with_table("state")
                .with_channel("shell-sync")
        );
    }

    #[test]
    fn rejects_empty_names() {
        assert!(matches!(
            StoreConfig::from_toml_str(r#"table_name = """#),
            Err(StoreError::Config(_))
        ));
        assert!(StoreConfig::for_database(" ").validate().is_err());
        assert!(StoreConfig::default().with_channel("").validate().is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            StoreConfig::from_toml_str("database_name = "),
            Err(StoreError::Config(_))
        ));
    }
}
