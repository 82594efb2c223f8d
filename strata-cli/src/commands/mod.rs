//! CLI command implementations

pub mod backup;
pub mod list;
pub mod maintenance;
pub mod migrate;
pub mod restore;
pub mod status;

use anyhow::{Context, Result};
use strata_worker::bootstrap::{connect_services, Runtime};
use strata_worker::config::{mask_password, Settings};

/// Load the worker configuration, with `database_url` taking precedence
/// over the environment
pub fn settings(database_url: &str) -> Result<Settings> {
    Settings::from_lookup(|key| match key {
        "DATABASE_URL" => Some(database_url.to_string()),
        other => std::env::var(other).ok(),
    })
}

/// Connect every adapter the way the worker does and assemble the pipeline
pub async fn runtime(database_url: &str) -> Result<Runtime> {
    let settings = settings(database_url)?;
    tracing::debug!(database_url = %mask_password(&settings.database_url), "Connecting");
    let services = connect_services(&settings)
        .await
        .context("Failed to connect services")?;
    Ok(Runtime::assemble(services, &settings.runtime))
}

/// Parse a record id given on the command line
pub fn parse_id(id: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(id).with_context(|| format!("Invalid id: {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
        assert!(parse_id("latest").is_err());
    }
}
