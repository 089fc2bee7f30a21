use std::path::PathBuf;

use clap::{Parser, Subcommand};

use vpnpanel_client::RawConfig;
use vpnpanel_client::config::{DEFAULT_API_URL, DEFAULT_BLOB_DIR, DEFAULT_POLL_SECS, DEFAULT_SESSION_DB};
use vpnpanel_client::expiry::{DEFAULT_ANCHOR, DEFAULT_PERIOD_DAYS};

#[derive(Parser)]
#[command(name = "vpnpanel")]
#[command(about = "VPN subscription portal client", long_about = None)]
pub struct Cli {
    /// Portal server origin; `/api` is appended per request
    #[arg(long, global = true, env = "VPNPANEL_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Admin allow-list such as `[111, 222]`. Falls back to `ADMIN`
    #[arg(long, global = true, env = "VPNPANEL_ADMIN")]
    pub admin: Option<String>,

    #[arg(long, global = true, env = "VPNPANEL_SESSION_DB", default_value = DEFAULT_SESSION_DB)]
    pub session_db: String,

    /// Where fetched proof images are written while a screen is open
    #[arg(long, global = true, env = "VPNPANEL_BLOB_DIR", default_value = DEFAULT_BLOB_DIR)]
    pub blob_dir: String,

    #[arg(long, global = true, env = "VPNPANEL_POLL_SECS", default_value_t = DEFAULT_POLL_SECS)]
    pub poll_secs: u64,

    #[arg(long, global = true, env = "VPNPANEL_RENEWAL_ANCHOR", default_value = DEFAULT_ANCHOR)]
    pub renewal_anchor: String,

    #[arg(long, global = true, env = "VPNPANEL_RENEWAL_DAYS", default_value_t = DEFAULT_PERIOD_DAYS)]
    pub renewal_days: i64,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn raw_config(&self) -> RawConfig {
        RawConfig {
            api_url: self.api_url.clone(),
            admin: self
                .admin
                .clone()
                .or_else(|| std::env::var("ADMIN").ok())
                .unwrap_or_default(),
            session_db: self.session_db.clone(),
            blob_dir: self.blob_dir.clone(),
            poll_secs: self.poll_secs.to_string(),
            renewal_anchor: self.renewal_anchor.clone(),
            renewal_days: self.renewal_days.to_string(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with a Telegram login widget payload (JSON)
    Login {
        /// File holding the payload, or `-` for stdin
        #[arg(long)]
        payload: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the subscription profile
    Profile,

    /// Payment proofs of the signed-in user
    Pay {
        #[command(subcommand)]
        command: PayCommands,
    },

    /// Review payment proofs (admins only)
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Check that the portal API is reachable
    Health,
}

#[derive(Subcommand)]
pub enum PayCommands {
    /// List submitted proofs
    List,

    /// Submit a payment screenshot
    Upload { path: PathBuf },

    /// Keep the list on screen, refreshing until Ctrl+C
    Watch,
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Users that submitted proofs, with pending counts
    Users,

    /// Proofs of one user (defaults to the first user listed)
    Proofs {
        #[arg(long)]
        user: Option<i64>,
    },

    Approve { id: i64 },

    Reject { id: i64 },

    /// Move a reviewed proof back to pending
    Reset { id: i64 },

    Delete {
        id: i64,

        /// Skip the confirmation prompt
        #[arg(long, default_value = "false")]
        yes: bool,
    },

    /// Live review screen, refreshing until Ctrl+C
    Watch {
        #[arg(long)]
        user: Option<i64>,
    },
}
