use std::net::IpAddr;

use clap::{Parser, Subcommand, ValueEnum};
use opsdesk_authz::RateLimitProfile;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(about = "OpsDesk authorization diagnostics")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Engine configuration file (defaults to ./opsdesk.toml when present)
    #[arg(short, long, global = true, env = "OPSDESK_CONFIG")]
    pub config: Option<String>,

    /// Roles and assignments fixture (TOML); built-in roles only if omitted
    #[arg(long, global = true, env = "OPSDESK_FIXTURE")]
    pub fixture: Option<String>,

    /// Log level or filter directive (overrides the config file)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the authorization pipeline for one user and operation
    Check(CheckArgs),
    /// List roles, most privileged first
    Roles,
    /// Show a user's resolved context
    Permissions(PermissionsArgs),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ProfileArg {
    General,
    Sensitive,
    Bulk,
    Upload,
    Api,
}

impl From<ProfileArg> for RateLimitProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::General => RateLimitProfile::General,
            ProfileArg::Sensitive => RateLimitProfile::Sensitive,
            ProfileArg::Bulk => RateLimitProfile::BulkOperations,
            ProfileArg::Upload => RateLimitProfile::FileUpload,
            ProfileArg::Api => RateLimitProfile::ApiCalls,
        }
    }
}

#[derive(clap::Args)]
pub struct CheckArgs {
    /// User id
    #[arg(short, long)]
    pub user: Uuid,
    /// Resource (e.g. contacts)
    #[arg(short, long)]
    pub resource: String,
    /// Action (e.g. import)
    #[arg(short, long)]
    pub action: String,
    /// Rate-limit profile to enforce
    #[arg(long)]
    pub profile: Option<ProfileArg>,
    /// Evaluate admins like everyone else
    #[arg(long)]
    pub no_bypass: bool,
    /// Client IP of the simulated session
    #[arg(long)]
    pub ip: Option<IpAddr>,
    /// Targeted record id, carried into the audit event
    #[arg(long)]
    pub resource_id: Option<String>,
}

#[derive(clap::Args)]
pub struct PermissionsArgs {
    /// User id
    #[arg(short, long)]
    pub user: Uuid,
}
