use std::sync::Arc;

use anyhow::Result;
use opsdesk_authz::{PermissionCache, RoleManager};

use super::Engine;
use crate::cli::OutputFormat;
use crate::output::{print_json, print_roles_table};

pub async fn run(engine: &Engine, format: OutputFormat) -> Result<()> {
    let cache = Arc::new(PermissionCache::from_config(
        &engine.config.cache,
        engine.clock.clone(),
    ));
    let manager = RoleManager::new(engine.store.clone(), cache, engine.clock.clone());
    let roles = manager.list_roles().await?;

    match format {
        OutputFormat::Json => print_json(&roles)?,
        OutputFormat::Table => print_roles_table(&roles),
    }
    Ok(())
}
