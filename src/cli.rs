use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::config::{Overrides, ENV_API_URL, ENV_TYPING_SPEED};

#[derive(Parser, Debug)]
#[command(name = "jbc-chat")]
#[command(version)]
#[command(about = "Terminal client for the JBC-Agent chat backend")]
pub struct Args {
    /// Base URL of the chat backend
    #[arg(long, global = true, env = ENV_API_URL)]
    pub api_url: Option<String>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Milliseconds between revealed characters
    #[arg(long, global = true, env = ENV_TYPING_SPEED)]
    pub speed: Option<u64>,

    /// Keep the session token in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Create an account (prompts for the password)
    Register { username: String },
    /// Log in and store the access token (prompts for the password)
    Login { username: String },
    /// Forget the stored access token
    Logout,
    /// Show the logged-in user's profile
    Profile,
    /// Print the conversation history
    History,
    /// Send one message and print the reply
    Ask {
        message: String,
        /// Print the reply at once instead of typing it out
        #[arg(long)]
        no_animation: bool,
    },
    /// Interactive chat session
    Chat,
    /// Print shell completions
    Completions { shell: Shell },
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            api_url: self.api_url.clone(),
            typing_speed_ms: self.speed,
        }
    }

    /// Default `tracing` filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "jbc_chat=warn",
            1 => "jbc_chat=debug",
            _ => "jbc_chat=trace",
        }
    }
}
