use std::sync::Arc;

use anyhow::Result;
use opsdesk_authz::Session;
use opsdesk_authz_memory::InMemoryAuditSink;

use super::Engine;
use crate::cli::{OutputFormat, PermissionsArgs};
use crate::output::{print_context_table, print_json};

pub async fn run(engine: &Engine, args: &PermissionsArgs, format: OutputFormat) -> Result<()> {
    let session = Session::new(args.user);
    let authorizer = engine.authorizer(session.clone(), Arc::new(InMemoryAuditSink::new()))?;
    let context = authorizer.resolve_context(&session).await?;

    match format {
        OutputFormat::Json => print_json(&context)?,
        OutputFormat::Table => print_context_table(&context),
    }
    Ok(())
}
