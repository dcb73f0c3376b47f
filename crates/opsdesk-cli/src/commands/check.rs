use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use opsdesk_authz::{AuthorizeOptions, RateLimitProfile, Session};
use opsdesk_authz_memory::InMemoryAuditSink;
use serde_json::json;

use super::Engine;
use crate::cli::{CheckArgs, OutputFormat};
use crate::output::{print_decision, print_json};

pub async fn run(engine: &Engine, args: &CheckArgs, format: OutputFormat) -> Result<()> {
    let mut session = Session::new(args.user).with_user_agent("opsdesk-cli");
    if let Some(ip) = args.ip {
        session = session.with_ip(ip);
    }

    let sink = Arc::new(InMemoryAuditSink::new());
    let authorizer = engine.authorizer(session, sink.clone())?;

    let mut options = AuthorizeOptions::new(args.resource.as_str(), args.action.as_str());
    if let Some(profile) = args.profile {
        options = options.rate_limit(authorizer.rate_limit(RateLimitProfile::from(profile)));
    }
    if args.no_bypass {
        options = options.bypass_for_admin(false);
    }
    if let Some(resource_id) = &args.resource_id {
        options = options.resource_id(resource_id.clone());
    }

    let decision = authorizer.authorize(options).await;
    let events = sink.events().await;

    match format {
        OutputFormat::Json => print_json(&json!({
            "decision": decision,
            "audit": events,
        }))?,
        OutputFormat::Table => {
            print_decision(&decision);
            for event in &events {
                println!(
                    "{}: {} ({:?})",
                    "Audit".cyan(),
                    event.event_type.as_str(),
                    event.severity
                );
            }
        }
    }
    Ok(())
}
