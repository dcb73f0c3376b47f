use anyhow::Result;
use colored::Colorize;
use opsdesk_authz::{AuthorizationContext, AuthorizationDecision, Role};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_decision(decision: &AuthorizationDecision) {
    if decision.authorized {
        let method = decision.method.map_or("-", |m| m.as_str());
        print_success(&format!("Authorized ({method})"));
    } else {
        print_error(&format!(
            "Denied: {}",
            decision.reason_text().unwrap_or("unknown")
        ));
    }
    if let Some(context) = &decision.context {
        println!("{}: {}", "Role".cyan(), context.user_role);
    }
}

pub fn print_roles_table(roles: &[Role]) {
    if roles.is_empty() {
        println!("No roles found.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Level", "Name", "Display name", "System", "Active", "Grants"]);
    for role in roles {
        let grants: usize = role.permissions.iter().map(|(_, actions)| actions.len()).sum();
        builder.push_record([
            role.hierarchy_level.to_string(),
            role.name.clone(),
            role.display_name.clone(),
            yes_no(role.is_system_role),
            yes_no(role.is_active),
            grants.to_string(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_context_table(context: &AuthorizationContext) {
    println!("{}: {}", "User".cyan(), context.user_id);
    println!("{}: {}", "Highest role".cyan(), context.user_role);
    let roles: Vec<&str> = context.roles.iter().map(String::as_str).collect();
    println!("{}: {}", "Roles".cyan(), roles.join(", "));

    if context.permissions.is_empty() {
        println!("No permissions granted.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Resource", "Actions"]);
    for (resource, actions) in context.permissions.iter() {
        let actions: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
        builder.push_record([resource.to_string(), actions.join(", ")]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "yes" } else { "no" };
    text.to_string()
}
