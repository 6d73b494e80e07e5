//! Configuration validation.

use super::Config;
use crate::destination::SslMode;
use crate::error::{BulkCopyError, Result};

/// Smallest accepted `copy.batch_flush_bytes`.
pub const MIN_FLUSH_BYTES: usize = 4 * 1024;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Target validation
    if config.target.host.is_empty() {
        return Err(BulkCopyError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(BulkCopyError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(BulkCopyError::Config("target.user is required".into()));
    }
    config.target.ssl_mode.parse::<SslMode>()?;

    // Source validation
    if let Some(source) = &config.source {
        if source.query.trim().is_empty() {
            return Err(BulkCopyError::Config("source.query is required".into()));
        }
        let connection = source.connection(&config.target);
        if connection.host.is_empty() {
            return Err(BulkCopyError::Config("source.host is required".into()));
        }
        connection.ssl_mode.parse::<SslMode>()?;
    }

    // Copy validation
    if config.copy.destination_table.trim().is_empty() {
        return Err(BulkCopyError::Config(
            "copy.destination_table is required".into(),
        ));
    }
    if config.copy.batch_flush_bytes < MIN_FLUSH_BYTES {
        return Err(BulkCopyError::Config(format!(
            "copy.batch_flush_bytes must be at least {}",
            MIN_FLUSH_BYTES
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CopyConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "target_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                ssl_mode: "disable".to_string(),
            },
            source: Some(SourceConfig {
                host: None,
                port: None,
                database: Some("source_db".to_string()),
                user: None,
                password: None,
                ssl_mode: None,
                query: "SELECT id, name FROM people".to_string(),
            }),
            copy: CopyConfig::new("public.people"),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_table() {
        let mut config = valid_config();
        config.copy.destination_table = " ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_query() {
        let mut config = valid_config();
        if let Some(source) = config.source.as_mut() {
            source.query.clear();
        }
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_flush_size_floor() {
        let mut config = valid_config();
        config.copy.batch_flush_bytes = MIN_FLUSH_BYTES - 1;
        assert!(validate(&config).is_err());
        config.copy.batch_flush_bytes = MIN_FLUSH_BYTES;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.target.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_falls_back_to_target() {
        let config = valid_config();
        let source = config.source_connection();
        assert_eq!(source.host, "localhost");
        assert_eq!(source.database, "source_db");
        assert_eq!(source.user, "postgres");
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        if let Some(source) = config.source.as_mut() {
            source.password = Some("super_secret_password_123".to_string());
        }
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }
}
