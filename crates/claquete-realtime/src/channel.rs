use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use claquete_types::events::{ChangeFilter, RowChange};

use crate::RealtimeError;
use crate::hub::ChangeFeed;

type Listener = Box<dyn Fn(&RowChange) + Send + Sync>;

/// A named subscription to a change feed with filtered listeners.
///
/// Listeners run on the channel's forwarding task while the channel lock is
/// held. `close` takes the same lock, so once it returns no listener runs
/// again. A listener must therefore never close its own channel.
pub struct Channel {
    name: String,
    feed: Arc<dyn ChangeFeed>,
    state: Arc<Mutex<ChannelState>>,
}

enum Phase {
    Idle,
    Live(JoinHandle<()>),
    Closed,
}

struct ChannelState {
    phase: Phase,
    listeners: Vec<(ChangeFilter, Listener)>,
}

impl Channel {
    pub fn open(feed: Arc<dyn ChangeFeed>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feed,
            state: Arc::new(Mutex::new(ChannelState {
                phase: Phase::Idle,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a listener for changes matching `filter`.
    pub fn on<F>(&self, filter: ChangeFilter, listener: F) -> Result<&Self, RealtimeError>
    where
        F: Fn(&RowChange) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        match state.phase {
            Phase::Idle => {
                let listener: Listener = Box::new(listener);
                state.listeners.push((filter, listener));
                Ok(self)
            }
            Phase::Live(_) => Err(RealtimeError::AlreadySubscribed(self.name.clone())),
            Phase::Closed => Err(RealtimeError::Closed(self.name.clone())),
        }
    }

    /// Go live: take a feed receiver and start forwarding matching changes.
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self) -> Result<(), RealtimeError> {
        let mut state = self.lock();
        match state.phase {
            Phase::Idle => {}
            Phase::Live(_) => return Err(RealtimeError::AlreadySubscribed(self.name.clone())),
            Phase::Closed => return Err(RealtimeError::Closed(self.name.clone())),
        }

        let rx = self.feed.subscribe()?;
        let task = tokio::spawn(forward(self.name.clone(), rx, self.state.clone()));
        state.phase = Phase::Live(task);

        debug!(channel = %self.name, listeners = state.listeners.len(), "channel subscribed");
        Ok(())
    }

    /// Close the channel. Idempotent; no listener fires after this returns.
    pub fn close(&self) {
        let mut state = self.lock();
        match std::mem::replace(&mut state.phase, Phase::Closed) {
            Phase::Live(task) => {
                task.abort();
                debug!(channel = %self.name, "channel closed");
            }
            Phase::Idle => debug!(channel = %self.name, "channel closed before subscribing"),
            Phase::Closed => {}
        }
        // Drop the listeners so whatever they captured is released now.
        state.listeners.clear();
    }

    /// Subscribed and still forwarding (the feed has not ended).
    pub fn is_live(&self) -> bool {
        matches!(&self.lock().phase, Phase::Live(task) if !task.is_finished())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.lock().phase, Phase::Closed)
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        lock_state(&self.state)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_state(state: &Mutex<ChannelState>) -> MutexGuard<'_, ChannelState> {
    // A panicking listener poisons the lock; the state itself stays consistent.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn forward(
    name: String,
    mut rx: broadcast::Receiver<RowChange>,
    state: Arc<Mutex<ChannelState>>,
) {
    loop {
        let change = match rx.recv().await {
            Ok(change) => change,
            Err(RecvError::Lagged(n)) => {
                warn!(channel = %name, "Change feed receiver lagged by {} events", n);
                continue;
            }
            Err(RecvError::Closed) => {
                debug!(channel = %name, "change feed ended");
                break;
            }
        };

        let guard = lock_state(&state);
        if matches!(guard.phase, Phase::Closed) {
            break;
        }
        for (filter, listener) in &guard.listeners {
            if filter.matches(&change) {
                listener(&change);
            }
        }
    }
}
