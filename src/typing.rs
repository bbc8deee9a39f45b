//! # Typing reveal
//!
//! Progressive character-by-character disclosure of a bot reply, with a
//! skip (interrupt) signal that completes the reveal immediately.
//!
//! ## Design
//! - [`RevealState`] is a pure state machine (`Idle → Revealing → Completed`)
//!   driven by `start`, `tick`, `interrupt` and `reset`. It owns no timer and
//!   can be stepped by hand.
//! - [`TypingEngine`] publishes a `RevealState` through a `tokio::sync::watch`
//!   channel and owns at most one timer task that calls `tick` every `speed`
//!   milliseconds.
//!
//! ## Guarantees
//! - `0 <= revealed_len <= source_len`, counted in `char`s, so every prefix
//!   is valid UTF-8.
//! - At most one timer task per engine. Every transition that replaces the
//!   reveal aborts the previous task and bumps the epoch before a new one is
//!   spawned; a stale task that wakes up mid-abort sees a foreign epoch and
//!   exits without writing.
//! - Dropping the engine aborts the timer and retires its epoch, so a tick
//!   already in flight cannot write either.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, trace};

use crate::error::ChatError;

/// Default cadence between revealed characters.
pub const DEFAULT_SPEED_MS: u64 = 10;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Where a reveal currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No source text. Output is empty.
    #[default]
    Idle,
    /// Output is a strict prefix of the source and the timer is due to grow it.
    Revealing,
    /// Output equals the (non-empty) source.
    Completed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Revealing => write!(f, "revealing"),
            Phase::Completed => write!(f, "completed"),
        }
    }
}

/// In-memory reveal state. Nothing here is ever persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealState {
    source: String,
    /// Byte offset of the end of the revealed prefix.
    cursor: usize,
    revealed_len: usize,
    source_len: usize,
    phase: Phase,
    /// Timer ticks applied since the current reveal started.
    ticks: usize,
    /// Bumped by every transition that replaces or ends the running reveal.
    epoch: u64,
}

impl RevealState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin revealing `source`.
    ///
    /// Empty source resets to `Idle`. With `interrupt` set the whole text is
    /// revealed at once; otherwise the first character is revealed
    /// synchronously and the rest waits for `tick`.
    pub fn start(&mut self, source: &str, interrupt: bool) {
        self.epoch = self.epoch.wrapping_add(1);
        self.source = source.to_string();
        self.source_len = source.chars().count();
        self.ticks = 0;
        self.cursor = 0;
        self.revealed_len = 0;

        if source.is_empty() {
            self.phase = Phase::Idle;
            return;
        }
        if interrupt {
            self.reveal_all();
            return;
        }

        self.phase = Phase::Revealing;
        self.advance();
    }

    /// Reveal one more character. Returns `true` if the output grew.
    ///
    /// Ticking a reveal that is not `Revealing` is a no-op, which makes
    /// completion idempotent.
    pub fn tick(&mut self) -> bool {
        if self.phase != Phase::Revealing {
            return false;
        }
        self.ticks += 1;
        self.advance()
    }

    /// Complete the reveal immediately. Returns `true` if the output changed.
    pub fn interrupt(&mut self) -> bool {
        if self.phase == Phase::Idle {
            return false;
        }
        self.epoch = self.epoch.wrapping_add(1);
        let changed = self.phase == Phase::Revealing;
        self.reveal_all();
        changed
    }

    /// Discard the source and return to `Idle`.
    pub fn reset(&mut self) {
        self.start("", false);
    }

    /// Invalidate any timer bound to the current epoch without touching
    /// the output.
    fn retire(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn advance(&mut self) -> bool {
        match self.source[self.cursor..].chars().next() {
            Some(c) => {
                self.cursor += c.len_utf8();
                self.revealed_len += 1;
                if self.revealed_len == self.source_len {
                    self.phase = Phase::Completed;
                }
                true
            }
            None => {
                self.phase = Phase::Completed;
                false
            }
        }
    }

    fn reveal_all(&mut self) {
        self.cursor = self.source.len();
        self.revealed_len = self.source_len;
        self.phase = Phase::Completed;
    }

    /// The revealed prefix.
    pub fn revealed(&self) -> &str {
        &self.source[..self.cursor]
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn revealed_len(&self) -> usize {
        self.revealed_len
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The caller's completion signal: output equals a non-empty source.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Completed && !self.source.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Timer-driven engine
// ---------------------------------------------------------------------------

/// Drives a [`RevealState`] on a fixed cadence.
///
/// Must be used from within a tokio runtime: `start` spawns the timer task.
///
/// ```rust,ignore
/// let mut engine = TypingEngine::new(10)?;
/// let mut rx = engine.subscribe();
/// engine.start("Hi!", false);
/// while rx.changed().await.is_ok() {
///     let state = rx.borrow_and_update().clone();
///     print!("\r{}", state.revealed());
///     if state.is_complete() { break; }
/// }
/// ```
pub struct TypingEngine {
    state: Arc<watch::Sender<RevealState>>,
    timer: Option<JoinHandle<()>>,
    speed: Duration,
}

impl TypingEngine {
    /// Create an idle engine that reveals one character every `speed_ms`.
    ///
    /// # Errors
    /// `ChatError::InvalidArgument` when `speed_ms` is zero; a zero period
    /// would spin instead of animating.
    pub fn new(speed_ms: u64) -> Result<Self, ChatError> {
        let speed = validate_speed(speed_ms)?;
        let (tx, _rx) = watch::channel(RevealState::new());
        Ok(Self {
            state: Arc::new(tx),
            timer: None,
            speed,
        })
    }

    pub fn speed(&self) -> Duration {
        self.speed
    }

    /// Hand `source` to the engine.
    ///
    /// Same source and speed with `interrupt == false` leaves a running or
    /// finished reveal alone. A different source restarts from its first
    /// character. `interrupt == true` completes the reveal immediately.
    pub fn start(&mut self, source: &str, interrupt: bool) {
        if interrupt {
            if self.state.borrow().source() == source && !source.is_empty() {
                self.interrupt();
                return;
            }
            self.cancel_timer();
            self.state.send_modify(|s| s.start(source, true));
            return;
        }

        {
            let current = self.state.borrow();
            if current.source() == source && current.phase() != Phase::Idle {
                return;
            }
        }
        self.restart(source);
    }

    /// Change the cadence. A reveal in progress restarts from its first
    /// character at the new speed.
    pub fn set_speed(&mut self, speed_ms: u64) -> Result<(), ChatError> {
        let speed = validate_speed(speed_ms)?;
        if speed == self.speed {
            return Ok(());
        }
        self.speed = speed;
        let running = {
            let s = self.state.borrow();
            (s.phase() == Phase::Revealing).then(|| s.source().to_string())
        };
        if let Some(source) = running {
            self.restart(&source);
        }
        Ok(())
    }

    /// Skip the rest of the animation.
    pub fn interrupt(&mut self) {
        self.cancel_timer();
        let changed = self.state.send_if_modified(|s| s.interrupt());
        if changed {
            debug!(chars = self.state.borrow().source_len(), "reveal interrupted");
        }
    }

    /// Clear the engine for the next text.
    pub fn reset(&mut self) {
        self.cancel_timer();
        self.state.send_if_modified(|s| {
            if s.phase() == Phase::Idle && s.source().is_empty() {
                return false;
            }
            s.reset();
            true
        });
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> RevealState {
        self.state.borrow().clone()
    }

    pub fn revealed(&self) -> String {
        self.state.borrow().revealed().to_string()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase()
    }

    /// Whether a timer task is currently scheduled.
    pub fn is_timer_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Watch every state change. The receiver closes once the engine and its
    /// timer are gone.
    pub fn subscribe(&self) -> watch::Receiver<RevealState> {
        self.state.subscribe()
    }

    /// The revealed text as a lazy stream of prefixes, starting with the
    /// current one. Intermediate prefixes may be coalesced when the consumer
    /// is slower than the cadence; the final value is never skipped.
    pub fn stream(&self) -> Pin<Box<dyn Stream<Item = String> + Send + 'static>> {
        Box::pin(WatchStream::new(self.subscribe()).map(|s| s.revealed().to_string()))
    }

    fn restart(&mut self, source: &str) {
        self.cancel_timer();
        self.state.send_modify(|s| s.start(source, false));
        if self.state.borrow().phase() == Phase::Revealing {
            self.arm_timer();
        }
    }

    fn arm_timer(&mut self) {
        let tx = Arc::clone(&self.state);
        let period = self.speed;
        let epoch = tx.borrow().epoch();
        let first = Instant::now() + period;

        self.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let mut keep_going = false;
                tx.send_if_modified(|s| {
                    if s.epoch() != epoch {
                        return false;
                    }
                    let grew = s.tick();
                    keep_going = s.phase() == Phase::Revealing;
                    grew
                });
                if !keep_going {
                    break;
                }
            }
            trace!(epoch, "reveal timer stopped");
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

impl Drop for TypingEngine {
    fn drop(&mut self) {
        self.cancel_timer();
        // abort() cannot stop a tick already running on another worker
        self.state.send_if_modified(|s| {
            s.retire();
            false
        });
    }
}

impl std::fmt::Debug for TypingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingEngine")
            .field("speed", &self.speed)
            .field("state", &*self.state.borrow())
            .field("timer_armed", &self.is_timer_armed())
            .finish()
    }
}

fn validate_speed(speed_ms: u64) -> Result<Duration, ChatError> {
    if speed_ms == 0 {
        return Err(ChatError::InvalidArgument(
            "typing speed must be a positive number of milliseconds".to_string(),
        ));
    }
    Ok(Duration::from_millis(speed_ms))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
