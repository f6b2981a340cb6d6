//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::convert::parse_offset;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;

    // Cannot migrate to the same database
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if config.migration.rules_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config(
            "migration.rules_dir cannot be empty".into(),
        ));
    }

    parse_offset(&config.migration.datetime_offset)?;

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", side)));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", side)));
    }
    if db.r#type != "mysql" {
        return Err(MigrateError::Config(format!(
            "{}.type must be 'mysql', got '{}'",
            side, db.r#type
        )));
    }
    Ok(())
}
