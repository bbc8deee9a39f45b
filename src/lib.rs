//! Terminal client for the JBC-Agent chat backend.
//!
//! The interesting part is [`typing`]: bot replies are revealed one
//! character at a time by a cancellable timer, and can be skipped. The rest
//! wires that engine to a bearer-token REST backend:
//!
//! - [`api`]: typed client for `/api/{register,login,profile,chat,history}`
//! - [`session`]: explicit session context and token persistence
//! - [`conversation`]: the message log and reply hand-off
//! - [`repl`] / [`render`]: interactive loop and terminal output
//! - [`config`] / [`cli`]: layered configuration and argument parsing

pub mod api;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod render;
pub mod repl;
pub mod session;
pub mod typing;

pub use api::{ApiClient, ChatBackend, Profile};
pub use config::Config;
pub use conversation::{ChatEntry, Conversation, Speaker};
pub use error::ChatError;
pub use session::{FileTokenStore, MemoryTokenStore, Session, TokenStore};
pub use typing::{Phase, RevealState, TypingEngine};
