use clap::{Parser, Subcommand};

/// Callhub: integration broker and meeting booking for voice agents
#[derive(Parser)]
#[command(name = "callhub", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind
        #[arg(short, long, env = "CALLHUB_PORT", default_value = "8080")]
        port: u16,

        /// Keep integrations in memory instead of PostgreSQL (lost on exit)
        #[arg(long)]
        ephemeral: bool,
    },

    /// Inspect stored integrations
    Integration {
        #[command(subcommand)]
        command: IntegrationCommands,
    },

    /// Print a fresh vault master key
    Keygen,
}

#[derive(Subcommand)]
pub enum IntegrationCommands {
    /// List integrations for an organization
    List {
        #[arg(long)]
        org: String,
        /// crm, sms, email or meeting
        #[arg(long = "type")]
        integration_type: Option<String>,
    },
    /// Delete an integration and its stored credentials
    Delete {
        #[arg(long)]
        org: String,
        #[arg(long)]
        id: String,
    },
}
