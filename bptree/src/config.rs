//! Tree configuration.
//!
//! # Environment Variables
//!
//! - `BPTREE_ORDER`: Fan-out bound of every tree opened (default: `100`)
//! - `BPTREE_SYNC_WRITES`: Fsync node files before they replace the old ones
//!   (default: `false`)
//!
//! # Invariants
//!
//! - `order` is at least 1: a non-root node holds between `order` and
//!   `2 * order` keys

use crate::constants::DEFAULT_ORDER;

/// Tree configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Minimum keys per non-root node; the maximum is twice this.
    pub order: usize,
    /// Whether node and journal writes are fsynced.
    pub sync_writes: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            sync_writes: false,
        }
    }
}

impl TreeConfig {
    pub const ORDER_VAR: &'static str = "BPTREE_ORDER";
    pub const SYNC_WRITES_VAR: &'static str = "BPTREE_SYNC_WRITES";

    /// Create a configuration with the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if `order` is zero.
    pub fn with_order(order: usize) -> Result<Self, ConfigError> {
        let config = Self {
            order,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants above.
    ///
    /// # Errors
    ///
    /// Returns an error if `order` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.order == 0 {
            return Err(ConfigError::InvalidValue {
                name: Self::ORDER_VAR.to_string(),
                message: "order must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration from environment variables, falling back to the
    /// defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(Self::ORDER_VAR) {
            config.order = value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: Self::ORDER_VAR.to_string(),
                    message: format!("'{value}' is not a positive integer"),
                })?;
        }
        if let Some(value) = lookup(Self::SYNC_WRITES_VAR) {
            config.sync_writes = parse_flag(&value).ok_or_else(|| ConfigError::InvalidValue {
                name: Self::SYNC_WRITES_VAR.to_string(),
                message: format!("'{value}' is not one of true, false, 1, 0"),
            })?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = TreeConfig::default();
        assert_eq!(config.order, 100);
        assert!(!config.sync_writes);
        assert_eq!(TreeConfig::from_lookup(lookup(&[])), Ok(config));
    }

    #[test]
    fn test_from_lookup() {
        let config = TreeConfig::from_lookup(lookup(&[
            ("BPTREE_ORDER", "3"),
            ("BPTREE_SYNC_WRITES", "TRUE"),
        ]))
        .expect("valid config");
        assert_eq!(config.order, 3);
        assert!(config.sync_writes);
    }

    #[test]
    fn test_invalid_order() {
        assert!(matches!(
            TreeConfig::from_lookup(lookup(&[("BPTREE_ORDER", "many")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(TreeConfig::from_lookup(lookup(&[("BPTREE_ORDER", "0")])).is_err());
        assert!(TreeConfig::with_order(0).is_err());
        assert_eq!(TreeConfig::with_order(2).map(|c| c.order), Ok(2));
    }

    #[test]
    fn test_invalid_flag() {
        assert!(TreeConfig::from_lookup(lookup(&[("BPTREE_SYNC_WRITES", "yes")])).is_err());
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
