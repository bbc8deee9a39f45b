use std::io::{self, Write};

use clap::{CommandFactory, Parser};
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use jbc_chat::cli::{Args, Command};
use jbc_chat::render::Renderer;
use jbc_chat::repl::ChatRepl;
use jbc_chat::{ApiClient, ChatError, Config, FileTokenStore, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    if let Command::Completions { shell } = &args.command {
        let mut cmd = Args::command();
        clap_complete::generate(*shell, &mut cmd, "jbc-chat", &mut io::stdout());
        return Ok(());
    }

    let config = Config::load(args.config.as_deref(), &args.overrides())?;
    let client = ApiClient::from_config(&config);
    let mut session = if args.ephemeral {
        Session::ephemeral()
    } else {
        Session::load(FileTokenStore::new(&config.token_path))?
    };

    if let Err(e) = run(&args, &config, &client, &mut session).await {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        if e.needs_login() {
            eprintln!("{}", "Run `jbc-chat login <username>` first.".dimmed());
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    args: &Args,
    config: &Config,
    client: &ApiClient,
    session: &mut Session,
) -> Result<(), ChatError> {
    match &args.command {
        Command::Register { username } => {
            let password = read_password().await?;
            let msg = client.register(username, &password).await?;
            println!("{}", msg.bright_green());
        }
        Command::Login { username } => {
            let password = read_password().await?;
            client.login(session, username, &password).await?;
            println!("{}", format!("Logged in as {username}.").bright_green());
        }
        Command::Logout => {
            client.logout(session)?;
            println!("Logged out.");
        }
        Command::Profile => {
            let profile = client.profile(session).await?;
            println!("{} {}", "Name:".bold(), profile.username);
        }
        Command::History => {
            let entries = client.history(session).await?;
            let mut out = Renderer::new(io::stdout());
            if entries.is_empty() {
                out.info("No messages yet.")?;
            }
            out.history(&entries)?;
        }
        Command::Ask {
            message,
            no_animation,
        } => {
            let mut repl = ChatRepl::new(client, session, config.typing_speed_ms, io::stdout())?;
            repl.ask(message, !no_animation).await?;
        }
        Command::Chat => {
            session.bearer()?;
            let mut repl = ChatRepl::new(client, session, config.typing_speed_ms, io::stdout())?;
            repl.run(BufReader::new(tokio::io::stdin())).await?;
        }
        Command::Completions { .. } => {}
    }
    Ok(())
}

/// Read one line from stdin as the password. Input is echoed; pipe it in
/// when that matters.
async fn read_password() -> Result<String, ChatError> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
