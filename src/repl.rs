//! Interactive chat loop.
//!
//! Lines from the user are sent to the backend; each reply is revealed
//! through a [`TypingEngine`] while input keeps being read. Any line entered
//! during a reveal skips it (an empty line only skips), and the reply is
//! committed to the conversation before the new line is handled.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::api::ChatBackend;
use crate::conversation::{Conversation, SUGGESTIONS};
use crate::error::ChatError;
use crate::render::Renderer;
use crate::session::Session;
use crate::typing::{Phase, RevealState, TypingEngine};

pub const HELP: &str = "\
Commands:
  /1 .. /4   send a suggested prompt
  /profile   show your profile
  /logout    forget the stored token and exit
  /quit      exit
Press Enter while a reply is typing to skip the animation.";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Suggestion(usize),
    Profile,
    Logout,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(cmd) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };
    match cmd {
        "quit" | "exit" | "q" => Command::Quit,
        "profile" => Command::Profile,
        "logout" => Command::Logout,
        "help" | "?" => Command::Help,
        other => match other.parse::<usize>() {
            Ok(n) if (1..=SUGGESTIONS.len()).contains(&n) => Command::Suggestion(n),
            _ => Command::Unknown(line.to_string()),
        },
    }
}

enum Flow {
    Continue,
    Quit,
}

pub struct ChatRepl<'a, B: ChatBackend, W: Write> {
    backend: &'a B,
    session: &'a mut Session,
    engine: TypingEngine,
    conversation: Conversation,
    renderer: Renderer<W>,
    /// Set while stdin is read, so Enter can actually skip.
    skippable: bool,
}

impl<'a, B: ChatBackend, W: Write> ChatRepl<'a, B, W> {
    pub fn new(
        backend: &'a B,
        session: &'a mut Session,
        speed_ms: u64,
        out: W,
    ) -> Result<Self, ChatError> {
        Ok(Self {
            backend,
            session,
            engine: TypingEngine::new(speed_ms)?,
            conversation: Conversation::new(),
            renderer: Renderer::new(out),
            skippable: false,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn into_output(self) -> W {
        let Self { renderer, .. } = self;
        renderer.into_inner()
    }

    /// Load history, then read commands from `input` until EOF or `/quit`.
    ///
    /// # Errors
    /// Authentication failures end the loop (`NotLoggedIn`, `Unauthorized`);
    /// other backend errors are printed and the loop continues.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> Result<(), ChatError> {
        self.skippable = true;
        self.load_history().await?;
        self.renderer.info(HELP)?;
        self.renderer.prompt()?;

        let mut lines = input.lines();
        let mut reveals = self.engine.subscribe();

        loop {
            let revealing = self.conversation.pending().is_some();
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if revealing {
                        self.skip()?;
                        if line.trim().is_empty() {
                            self.renderer.prompt()?;
                            continue;
                        }
                    }
                    match self.handle(parse_command(&line)).await? {
                        Flow::Continue => {}
                        Flow::Quit => break,
                    }
                }
                changed = reveals.changed(), if revealing => {
                    if changed.is_err() {
                        break;
                    }
                    let state = reveals.borrow_and_update().clone();
                    self.on_reveal(&state)?;
                }
            }
        }

        if self.conversation.pending().is_some() {
            self.skip()?;
        }
        Ok(())
    }

    /// Send one message and wait for its reveal to finish.
    ///
    /// With `animate == false` the reply is shown in full at once.
    ///
    /// # Errors
    /// Any backend failure is returned; nothing is printed for it.
    pub async fn ask(&mut self, message: &str, animate: bool) -> Result<(), ChatError> {
        let mut reveals = self.engine.subscribe();
        self.send(message, animate).await?;
        while self.conversation.pending().is_some() {
            if reveals.changed().await.is_err() {
                break;
            }
            let state = reveals.borrow_and_update().clone();
            self.on_reveal(&state)?;
        }
        Ok(())
    }

    async fn load_history(&mut self) -> Result<(), ChatError> {
        match self.backend.fetch_history(self.session).await {
            Ok(entries) => {
                self.conversation = Conversation::from_history(entries);
            }
            Err(e) if e.needs_login() => return Err(e),
            Err(e) => {
                warn!(error = %e, "history unavailable");
                self.renderer.error(&e.to_string())?;
            }
        }
        if self.conversation.show_suggestions() {
            self.renderer.suggestions()?;
        } else {
            self.renderer.history(self.conversation.entries())?;
        }
        Ok(())
    }

    async fn handle(&mut self, cmd: Command) -> Result<Flow, ChatError> {
        match cmd {
            Command::Empty => {}
            Command::Send(text) => self.deliver(&text).await?,
            Command::Suggestion(n) => {
                let text = SUGGESTIONS[n - 1];
                self.renderer.info(&format!("> {text}"))?;
                self.deliver(text).await?;
            }
            Command::Profile => match self.backend.fetch_profile(self.session).await {
                Ok(p) => self.renderer.info(&format!("Name: {}", p.username))?,
                Err(e) if e.needs_login() => return Err(e),
                Err(e) => self.renderer.error(&e.to_string())?,
            },
            Command::Logout => {
                self.session.invalidate()?;
                self.renderer.info("Logged out.")?;
                return Ok(Flow::Quit);
            }
            Command::Help => self.renderer.info(HELP)?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Unknown(raw) => {
                self.renderer.error(&format!("unknown command {raw:?}, try /help"))?
            }
        }
        if self.conversation.pending().is_none() {
            self.renderer.prompt()?;
        }
        Ok(Flow::Continue)
    }

    /// Send from the loop: auth failures end it, anything else is shown.
    async fn deliver(&mut self, message: &str) -> Result<(), ChatError> {
        match self.send(message, true).await {
            Err(e) if !e.needs_login() => {
                warn!(error = %e, "message not delivered");
                self.renderer.error(&e.to_string())?;
                Ok(())
            }
            other => other,
        }
    }

    async fn send(&mut self, message: &str, animate: bool) -> Result<(), ChatError> {
        self.conversation.push_user(message);
        let reply = self.backend.send_message(self.session, message).await?;
        let text = self.conversation.receive_response(reply).to_string();
        debug!(chars = text.chars().count(), animate, "reply received");
        self.engine.start(&text, !animate);
        let state = self.engine.snapshot();
        if self.skippable && state.phase() == Phase::Revealing {
            self.renderer.skip_hint()?;
        }
        self.on_reveal(&state)
    }

    /// Complete the running reveal and commit it.
    fn skip(&mut self) -> Result<(), ChatError> {
        self.engine.interrupt();
        let state = self.engine.snapshot();
        self.on_reveal(&state)
    }

    fn on_reveal(&mut self, state: &RevealState) -> Result<(), ChatError> {
        if self.conversation.pending() != Some(state.source()) {
            return Ok(());
        }
        self.renderer.reveal_progress(state.revealed())?;
        if let Some(entry) = self.conversation.commit_if_revealed(state) {
            self.renderer.reveal_done(entry)?;
            self.engine.reset();
            self.renderer.prompt()?;
        }
        Ok(())
    }
}
