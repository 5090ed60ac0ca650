//! Listener registration and fan-out.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{EventType, Notification, NotifierId};
use crate::error::ListenerError;
use crate::limits::MAX_RETAINED_FAILURES;

/// Receives notifications from a [`Channel`].
///
/// Listeners run synchronously on the mutating thread, after the change is
/// committed. Returning an error does not undo the change and does not stop
/// delivery to the listeners registered after this one. A panic is caught and
/// recorded as a failure in the same way.
pub trait Listener: Send + Sync {
    fn notify_changed(&self, notification: &Notification) -> Result<(), ListenerError>;

    /// Called once the listener has been attached to a notifier.
    fn on_attached(&self, _notifier: NotifierId) {}

    /// Called once the listener has been detached from a notifier.
    fn on_detached(&self, _notifier: NotifierId) {}
}

impl<F> Listener for F
where
    F: Fn(&Notification) -> Result<(), ListenerError> + Send + Sync,
{
    fn notify_changed(&self, notification: &Notification) -> Result<(), ListenerError> {
        self(notification)
    }
}

/// Handle returned by [`Channel::attach`], used to detach the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// A listener error recorded during fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub listener: ListenerId,
    pub kind: EventType,
    pub error: ListenerError,
}

/// Ordered set of listeners attached to one notifier.
///
/// A channel is shared (cheap to clone) between a notifier and the containers
/// it owns, so that a list inside an object reports through the object's
/// listeners. A channel may forward to an upstream channel, which is how a
/// resource observes every object it holds.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    notifier: NotifierId,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn Listener>)>>,
    next_id: AtomicU64,
    deliver: AtomicBool,
    failures: Mutex<VecDeque<DeliveryFailure>>,
    failure_count: AtomicU64,
    upstream: Option<Channel>,
}

impl Channel {
    /// Creates a channel for the given notifier.
    pub fn new(notifier: NotifierId) -> Self {
        Self::build(notifier, None)
    }

    /// Creates a channel for a standalone container.
    pub fn detached() -> Self {
        Self::new(NotifierId::Detached)
    }

    /// Creates a channel that forwards every notification to `upstream` after
    /// its own listeners have run.
    pub(crate) fn with_upstream(notifier: NotifierId, upstream: &Channel) -> Self {
        Self::build(notifier, Some(upstream.clone()))
    }

    fn build(notifier: NotifierId, upstream: Option<Channel>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                notifier,
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                deliver: AtomicBool::new(true),
                failures: Mutex::new(VecDeque::new()),
                failure_count: AtomicU64::new(0),
                upstream,
            }),
        }
    }

    pub fn notifier(&self) -> NotifierId {
        self.inner.notifier
    }

    /// Registers a listener. Listeners are invoked in registration order.
    pub fn attach(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, listener.clone()));
        listener.on_attached(self.inner.notifier);
        id
    }

    /// Removes a listener. Returns false if it was not attached.
    pub fn detach(&self, id: ListenerId) -> bool {
        let removed = {
            let mut listeners = self.inner.listeners.lock();
            listeners
                .iter()
                .position(|(lid, _)| *lid == id)
                .map(|pos| listeners.remove(pos).1)
        };
        match removed {
            Some(listener) => {
                listener.on_detached(self.inner.notifier);
                true
            }
            None => false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Returns whether notifications are currently delivered.
    pub fn deliver(&self) -> bool {
        self.inner.deliver.load(Ordering::Relaxed)
    }

    /// Turns delivery on or off. Mutations still happen while delivery is off;
    /// they are simply not reported.
    pub fn set_deliver(&self, deliver: bool) {
        self.inner.deliver.store(deliver, Ordering::Relaxed);
    }

    /// Returns true if a notification sent now would reach at least one listener.
    ///
    /// Containers check this before building a notification.
    pub fn is_notification_required(&self) -> bool {
        if !self.deliver() {
            return false;
        }
        if !self.inner.listeners.lock().is_empty() {
            return true;
        }
        self.inner
            .upstream
            .as_ref()
            .is_some_and(Channel::is_notification_required)
    }

    /// Delivers a notification to every listener, then to the upstream channel.
    ///
    /// Returns the number of listeners that failed on this channel and its
    /// upstream chain. Failures are logged, and the most recent
    /// [`MAX_RETAINED_FAILURES`] are kept until [`Channel::take_failures`].
    pub fn notify(&self, notification: &Notification) -> usize {
        if !self.deliver() {
            return 0;
        }

        // Snapshot so listeners may attach/detach while being notified.
        let listeners: Vec<(ListenerId, Arc<dyn Listener>)> =
            self.inner.listeners.lock().clone();

        let mut failed = 0;
        for (id, listener) in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                listener.notify_changed(notification)
            }))
            .unwrap_or_else(|cause| Err(ListenerError::new(panic_message(&*cause))));
            if let Err(error) = outcome {
                tracing::warn!(
                    notifier = ?self.inner.notifier,
                    kind = %notification.kind(),
                    feature = notification.feature().unwrap_or(""),
                    listener = id.0,
                    "listener failed: {}", error
                );
                self.record_failure(DeliveryFailure {
                    listener: id,
                    kind: notification.kind(),
                    error,
                });
                failed += 1;
            }
        }

        if let Some(upstream) = &self.inner.upstream {
            failed += upstream.notify(notification);
        }
        failed
    }

    fn record_failure(&self, failure: DeliveryFailure) {
        self.inner.failure_count.fetch_add(1, Ordering::Relaxed);
        let mut failures = self.inner.failures.lock();
        if failures.len() == MAX_RETAINED_FAILURES {
            failures.pop_front();
        }
        failures.push_back(failure);
    }

    /// Drains the retained listener failures, oldest first.
    pub fn take_failures(&self) -> Vec<DeliveryFailure> {
        std::mem::take(&mut *self.inner.failures.lock()).into()
    }

    /// Number of listener failures on this channel since it was created,
    /// including those no longer retained.
    pub fn failure_count(&self) -> u64 {
        self.inner.failure_count.load(Ordering::Relaxed)
    }

    /// Returns true if both handles refer to the same channel.
    pub fn same_channel(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    let detail = cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload");
    format!("listener panicked: {detail}")
}

impl Default for Channel {
    fn default() -> Self {
        Self::detached()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("notifier", &self.inner.notifier)
            .field("listeners", &self.listener_count())
            .field("deliver", &self.deliver())
            .field("upstream", &self.inner.upstream.is_some())
            .finish()
    }
}
