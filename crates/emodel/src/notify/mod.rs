//! Change notifications.
//!
//! Every structural mutation of a list, map, object feature or resource emits
//! exactly one [`Notification`] after the change is committed. Notifications
//! are delivered synchronously, in registration order, through a [`Channel`].
//!
//! Batch operations (`add_all`, `remove_all`, `clear`, `put_all`) emit a single
//! [`EventType::AddMany`] / [`EventType::RemoveMany`] notification carrying the
//! affected values and positions, so listeners can handle them in one step.

mod channel;

pub use channel::{Channel, DeliveryFailure, Listener, ListenerId};

use std::fmt;
use std::sync::Arc;

use crate::model::{ObjectId, Value};

/// The kind of change a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A value was replaced (single-valued feature, list element or map entry).
    Set,
    /// A single-valued feature was cleared.
    Unset,
    /// One element was inserted.
    Add,
    /// Several elements were inserted in one operation.
    AddMany,
    /// One element was removed.
    Remove,
    /// Several elements were removed in one operation.
    RemoveMany,
    /// An element changed position.
    Move,
    /// A proxy was replaced by the object it stands for.
    Resolve,
}

impl EventType {
    /// Returns the conventional upper-case name (e.g. `"ADD_MANY"`).
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Set => "SET",
            EventType::Unset => "UNSET",
            EventType::Add => "ADD",
            EventType::AddMany => "ADD_MANY",
            EventType::Remove => "REMOVE",
            EventType::RemoveMany => "REMOVE_MANY",
            EventType::Move => "MOVE",
            EventType::Resolve => "RESOLVE",
        }
    }

    /// Returns true for the batched kinds.
    pub fn is_batch(&self) -> bool {
        matches!(self, EventType::AddMany | EventType::RemoveMany)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of the entity that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifierId {
    /// An object inside a resource.
    Object(ObjectId),
    /// A resource (its contents list).
    Resource,
    /// A standalone container not owned by any object.
    Detached,
}

/// Old or new value carried by a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No value (e.g. `old_value` of an ADD).
    None,
    /// A single element or feature value.
    One(Value),
    /// A single map entry.
    Entry(Value, Value),
    /// The elements of a batch, in list order.
    Many(Vec<Value>),
    /// The entries of a map batch, in map order.
    Entries(Vec<(Value, Value)>),
    /// A position (the source index of a MOVE).
    Index(usize),
    /// The original positions of the elements removed by a REMOVE_MANY.
    Positions(Vec<usize>),
}

impl Payload {
    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    /// Returns the single value, if this payload holds exactly one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::One(v) => Some(v),
            _ => None,
        }
    }
}

/// Immutable record of one structural change.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    kind: EventType,
    notifier: NotifierId,
    feature: Option<Arc<str>>,
    old_value: Payload,
    new_value: Payload,
    position: Option<usize>,
}

impl Notification {
    pub(crate) fn new(
        kind: EventType,
        notifier: NotifierId,
        feature: Option<Arc<str>>,
        old_value: Payload,
        new_value: Payload,
        position: Option<usize>,
    ) -> Self {
        Self {
            kind,
            notifier,
            feature,
            old_value,
            new_value,
            position,
        }
    }

    pub fn kind(&self) -> EventType {
        self.kind
    }

    pub fn notifier(&self) -> NotifierId {
        self.notifier
    }

    /// Name of the feature that changed, when the change happened inside an object.
    pub fn feature(&self) -> Option<&str> {
        self.feature.as_deref()
    }

    pub fn old_value(&self) -> &Payload {
        &self.old_value
    }

    pub fn new_value(&self) -> &Payload {
        &self.new_value
    }

    /// Index of the affected element.
    ///
    /// For MOVE this is the destination index, for ADD_MANY the index of the
    /// first inserted element. `None` for single-valued features and REMOVE_MANY.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Returns `(old_index, new_index)` for a MOVE notification.
    pub fn move_indices(&self) -> Option<(usize, usize)> {
        match (self.kind, &self.old_value, self.position) {
            (EventType::Move, Payload::Index(old), Some(new)) => Some((*old, new)),
            _ => None,
        }
    }

    /// Returns true if this notification was emitted by the given object.
    pub fn is_from(&self, object: ObjectId) -> bool {
        self.notifier == NotifierId::Object(object)
    }
}
