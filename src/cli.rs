use clap::{Parser, Subcommand};

/// codex-companion — localhost proxy that rotates Codex credentials
#[derive(Parser)]
#[command(name = "codex-companion", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server (the default)
    Serve,

    /// Import an interactive login from $CODEX_HOME/auth.json
    Import,

    /// Manage pool credentials
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// List all credentials in priority order
    List,

    /// Add a static API key
    AddKey {
        #[arg(long)]
        name: String,
        #[arg(long)]
        secret: String,
        /// Per-credential upstream override
        #[arg(long)]
        base_url: Option<String>,
        /// Smaller is preferred; defaults to last place
        #[arg(long)]
        priority: Option<i64>,
    },

    /// Add an interactive login by refresh token
    AddLogin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        refresh_token: String,
        #[arg(long)]
        tenant_id: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
    },

    /// Delete a credential by id
    Delete { id: i64 },
}
