//! Announcer state machine with compare-and-set transitions.
//!
//! The engine reports utterance progress from its own threads while the queue
//! worker moves the state forward from a tokio task. Every transition goes
//! through [`StateCell::compare_and_set`], which runs the predicate and the
//! write under the watch channel's lock. A late callback for an utterance that
//! has already been superseded therefore cannot move the state backwards.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// How the previous utterance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceResult {
    Success,
    Error,
    /// Cut short by `stop_speaking()`.
    Stopped,
}

/// Lifecycle of the announcer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncerState {
    Uninitialized,
    /// Terminal. Nothing is spoken after this.
    InitializationError { reason: String },
    Idle { last: Option<UtteranceResult> },
    Speaking { utterance_id: String },
}

impl AnnouncerState {
    pub fn is_speaking(&self) -> bool {
        matches!(self, AnnouncerState::Speaking { .. })
    }

    pub fn is_speaking_id(&self, id: &str) -> bool {
        matches!(self, AnnouncerState::Speaking { utterance_id } if utterance_id == id)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnnouncerState::InitializationError { .. })
    }
}

/// A state plus the generation it was entered in.
///
/// The generation increases every time an utterance begins. Engine callbacks
/// carry it in their utterance id (see [`utterance_id`]), so two utterances
/// that reuse a message id are still told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateToken {
    pub state: AnnouncerState,
    pub generation: u64,
    pub changed_at: DateTime<Utc>,
}

impl StateToken {
    fn initial() -> Self {
        Self {
            state: AnnouncerState::Uninitialized,
            generation: 0,
            changed_at: Utc::now(),
        }
    }
}

/// Shared, observable holder for the announcer state.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<StateToken>>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StateToken::initial());
        Self { tx: Arc::new(tx) }
    }

    /// Current token (cloned).
    pub fn snapshot(&self) -> StateToken {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> AnnouncerState {
        self.tx.borrow().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StateToken> {
        self.tx.subscribe()
    }

    /// Replace the state only if `expected` holds for the current one.
    ///
    /// Returns whether the write happened. The generation is left untouched.
    pub fn compare_and_set<F>(&self, expected: F, next: AnnouncerState) -> bool
    where
        F: FnOnce(&AnnouncerState) -> bool,
    {
        self.tx.send_if_modified(|token| {
            if token.state.is_terminal() || !expected(&token.state) {
                return false;
            }
            token.state = next;
            token.changed_at = Utc::now();
            true
        })
    }

    /// Unconditional transition (still refuses to leave the terminal state).
    pub fn set(&self, next: AnnouncerState) -> bool {
        self.compare_and_set(|_| true, next)
    }

    /// Enter `Speaking(id)` and return the new generation.
    ///
    /// Returns `None` if the announcer is in its terminal error state.
    pub fn begin_utterance(&self, utterance_id: &str) -> Option<u64> {
        let mut generation = None;
        self.tx.send_if_modified(|token| {
            if token.state.is_terminal() {
                return false;
            }
            token.generation += 1;
            token.state = AnnouncerState::Speaking {
                utterance_id: utterance_id.to_string(),
            };
            token.changed_at = Utc::now();
            generation = Some(token.generation);
            true
        });
        generation
    }

    /// Leave `Speaking` for `Idle(result)` if `generation` is still current.
    ///
    /// A callback for any earlier generation is stale and is ignored, even
    /// when its message id matches the one now speaking.
    pub fn finish_utterance(&self, generation: u64, result: UtteranceResult) -> bool {
        self.tx.send_if_modified(|token| {
            if token.generation != generation || !token.state.is_speaking() {
                return false;
            }
            token.state = AnnouncerState::Idle { last: Some(result) };
            token.changed_at = Utc::now();
            true
        })
    }

    /// Wait until the utterance begun in `generation` is no longer speaking.
    ///
    /// Resolves when the state leaves `Speaking` or a newer utterance starts.
    /// Also resolves if every sender is gone, which only happens on teardown.
    pub async fn wait_until_finished(&self, generation: u64) {
        let mut rx = self.tx.subscribe();
        let _ = rx
            .wait_for(|token| token.generation != generation || !token.state.is_speaking())
            .await;
    }
}

/// Id handed to the speech engine for one utterance: `<message id>#<generation>`.
pub fn utterance_id(message_id: &str, generation: u64) -> String {
    format!("{}#{}", message_id, generation)
}

/// Split an engine utterance id back into message id and generation.
pub fn parse_utterance_id(utterance_id: &str) -> Option<(&str, u64)> {
    let (message_id, generation) = utterance_id.rsplit_once('#')?;
    Some((message_id, generation.parse().ok()?))
}
