//! Typed lifecycle notifications for loading indicators and error toasts.
//!
//! The service publishes; observers subscribe. Observers never get a handle
//! to the service itself.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ErrorKind;

/// Error details attached to [`ServiceEvent::RequestFailed`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailureDetails {
    pub kind: ErrorKind,
    pub raw_message: String,
    pub user_message: String,
}

/// Event emitted by [`ApiService`](crate::ApiService).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServiceEvent {
    /// One attempt of a call is about to be dispatched.
    RequestStarted {
        request_id: String,
        url: String,
        attempt: u32,
        max_attempts: u32,
    },
    /// The aggregate "anything in flight" signal flipped.
    LoadingStateChanged { is_loading: bool, active_count: usize },
    RequestCompleted {
        request_id: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
    RequestFailed {
        request_id: String,
        url: String,
        error: FailureDetails,
        timestamp: DateTime<Utc>,
    },
}

/// Discriminant of [`ServiceEvent`], for filtered subscriptions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    RequestStarted,
    LoadingStateChanged,
    RequestCompleted,
    RequestFailed,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestStarted => "request-started",
            Self::LoadingStateChanged => "loading-state-changed",
            Self::RequestCompleted => "request-completed",
            Self::RequestFailed => "request-failed",
        }
    }
}

impl ServiceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RequestStarted { .. } => EventKind::RequestStarted,
            Self::LoadingStateChanged { .. } => EventKind::LoadingStateChanged,
            Self::RequestCompleted { .. } => EventKind::RequestCompleted,
            Self::RequestFailed { .. } => EventKind::RequestFailed,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    filter: Option<EventKind>,
    listener: Listener,
}

/// Publish/subscribe hub for [`ServiceEvent`]s.
///
/// Listeners run synchronously on the publishing task, after the internal
/// lock has been released, so a listener may subscribe or unsubscribe.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(listener))
    }

    /// Receives only events of `kind`.
    pub fn subscribe_to<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(listener))
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        subscriptions.len() != before
    }

    pub fn publish(&self, event: &ServiceEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|sub| sub.filter.map_or(true, |filter| filter == kind))
            .map(|sub| Arc::clone(&sub.listener))
            .collect();

        #[cfg(feature = "tracing")]
        tracing::trace!(event = kind.name(), listeners = listeners.len(), "publishing event");

        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn insert(&self, filter: Option<EventKind>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            filter,
            listener,
        });
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
