use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::backend::{AuthEvent, AuthStateChange, Session};

/// Name carried by every relayed auth notification
pub const AUTH_STATE_CHANGE: &str = "auth-state-change";

/// Auth event republished for components with no handle on the session manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthNotification {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthNotification {
    pub fn name(&self) -> &'static str {
        AUTH_STATE_CHANGE
    }
}

impl From<AuthStateChange> for AuthNotification {
    fn from(change: AuthStateChange) -> Self {
        Self {
            event: change.event,
            session: change.session,
        }
    }
}

/// Single listener on backend auth changes, re-publishing them on its own channel.
///
/// The forwarding task stops when the relay is dropped.
pub struct AuthEventRelay {
    sender: broadcast::Sender<AuthNotification>,
    task: JoinHandle<()>,
}

impl AuthEventRelay {
    /// Must be called from within a Tokio runtime
    pub fn spawn(mut source: broadcast::Receiver<AuthStateChange>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let publisher = sender.clone();

        let task = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(change) => {
                        tracing::debug!("Relaying {} as '{}'", change.event, AUTH_STATE_CHANGE);
                        // Nobody listening is fine
                        let _ = publisher.send(AuthNotification::from(change));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Auth event relay lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Auth event source closed, relay stopped");
        });

        Self { sender, task }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthNotification> {
        self.sender.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for AuthEventRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Caller-owned forwarding of auth events to a callback.
///
/// Events keep flowing until [`AuthSubscription::unsubscribe`] is called;
/// dropping the handle does not stop them.
#[must_use = "keep the subscription to unsubscribe later"]
pub struct AuthSubscription {
    task: JoinHandle<()>,
}

impl AuthSubscription {
    pub(crate) fn spawn<F>(mut source: broadcast::Receiver<AuthStateChange>, callback: F) -> Self
    where
        F: Fn(AuthEvent, Option<Session>) + Send + Sync + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(change) => callback(change.event, change.session),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Auth subscriber lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }
}
