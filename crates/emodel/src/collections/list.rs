//! Ordered, notifying list.

use std::fmt;
use std::sync::Arc;

use super::{Capabilities, MoveTo};
use crate::error::ListError;
use crate::model::Value;
use crate::notify::{Channel, EventType, Listener, ListenerId, Notification, Payload};

/// An index-addressable sequence that reports every structural change.
///
/// Indices are always contiguous `0..len()`. Every successful mutation emits
/// exactly one notification after the change is applied; a failed mutation
/// leaves the list untouched and emits nothing.
///
/// # Example
///
/// ```rust
/// use emodel::collections::EList;
///
/// let mut list = EList::new();
/// list.push("a".to_string()).unwrap();
/// list.push("b".to_string()).unwrap();
/// list.move_to(0, 1).unwrap();
/// assert_eq!(list.as_slice(), ["b", "a"]);
/// ```
pub struct EList<T> {
    items: Vec<T>,
    unique: bool,
    feature: Option<Arc<str>>,
    channel: Channel,
}

impl<T> EList<T> {
    /// Creates an empty list that allows duplicates.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            unique: false,
            feature: None,
            channel: Channel::detached(),
        }
    }

    /// Creates an empty list that rejects duplicate elements.
    pub fn unique() -> Self {
        Self {
            unique: true,
            ..Self::new()
        }
    }

    /// Creates a list owned by an object feature, reporting through `channel`.
    pub(crate) fn bound(channel: Channel, feature: Arc<str>, unique: bool) -> Self {
        Self {
            items: Vec::new(),
            unique,
            feature: Some(feature),
            channel,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Result<&T, ListError> {
        self.items.get(index).ok_or(ListError::IndexOutOfRange {
            index,
            size: self.items.len(),
        })
    }

    /// The channel this list reports through.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn attach(&self, listener: Arc<dyn Listener>) -> ListenerId {
        self.channel.attach(listener)
    }

    pub fn detach(&self, id: ListenerId) -> bool {
        self.channel.detach(id)
    }

    fn check_index(&self, index: usize) -> Result<(), ListError> {
        if index >= self.items.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                size: self.items.len(),
            });
        }
        Ok(())
    }

    fn emit(&self, kind: EventType, old_value: Payload, new_value: Payload, position: Option<usize>) {
        let notification = Notification::new(
            kind,
            self.channel.notifier(),
            self.feature.clone(),
            old_value,
            new_value,
            position,
        );
        self.channel.notify(&notification);
    }
}

impl<T: PartialEq> EList<T> {
    pub fn contains(&self, value: &T) -> bool {
        self.items.contains(value)
    }

    /// Index of the first element equal to `value`.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.items.iter().position(|x| x == value)
    }

    fn check_unique(&self, value: &T, except: Option<usize>) -> Result<(), ListError> {
        if !self.unique {
            return Ok(());
        }
        match self.index_of(value) {
            Some(index) if Some(index) != except => Err(ListError::DuplicateElement { index }),
            _ => Ok(()),
        }
    }

    fn check_unique_batch(&self, batch: &[T]) -> Result<(), ListError> {
        if !self.unique {
            return Ok(());
        }
        for (i, value) in batch.iter().enumerate() {
            if let Some(index) = self.index_of(value) {
                return Err(ListError::DuplicateElement { index });
            }
            if batch[..i].contains(value) {
                return Err(ListError::DuplicateElement {
                    index: self.items.len() + i,
                });
            }
        }
        Ok(())
    }
}

impl<T: Clone + PartialEq + Into<Value>> EList<T> {
    /// Appends an element. Emits ADD.
    pub fn push(&mut self, value: T) -> Result<(), ListError> {
        let index = self.items.len();
        self.insert(index, value)
    }

    /// Inserts an element at `index` (`0..=len()`), shifting later elements. Emits ADD.
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), ListError> {
        if index > self.items.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                size: self.items.len(),
            });
        }
        self.check_unique(&value, None)?;

        let payload = self
            .channel
            .is_notification_required()
            .then(|| Payload::One(value.clone().into()));
        self.items.insert(index, value);
        if let Some(new_value) = payload {
            self.emit(EventType::Add, Payload::None, new_value, Some(index));
        }
        Ok(())
    }

    /// Removes and returns the element at `index`. Emits REMOVE.
    pub fn remove_at(&mut self, index: usize) -> Result<T, ListError> {
        self.check_index(index)?;
        let removed = self.items.remove(index);
        if self.channel.is_notification_required() {
            self.emit(
                EventType::Remove,
                Payload::One(removed.clone().into()),
                Payload::None,
                Some(index),
            );
        }
        Ok(removed)
    }

    /// Removes the first element equal to `value` and returns its former index.
    /// Emits REMOVE.
    pub fn remove(&mut self, value: &T) -> Result<usize, ListError> {
        let index = self.index_of(value).ok_or(ListError::NotFound)?;
        self.remove_at(index)?;
        Ok(index)
    }

    /// Replaces the element at `index`, returning the old one. Emits SET.
    pub fn set(&mut self, index: usize, value: T) -> Result<T, ListError> {
        self.check_index(index)?;
        self.check_unique(&value, Some(index))?;

        let new_payload = self
            .channel
            .is_notification_required()
            .then(|| Payload::One(value.clone().into()));
        let old = std::mem::replace(&mut self.items[index], value);
        if let Some(new_value) = new_payload {
            self.emit(
                EventType::Set,
                Payload::One(old.clone().into()),
                new_value,
                Some(index),
            );
        }
        Ok(old)
    }

    /// Moves the element at `old_index` to `new_index`. Emits MOVE.
    ///
    /// Both indices must be in `0..len()`. Moving an element onto its own
    /// index leaves the order unchanged but still emits a MOVE.
    pub fn move_to(&mut self, new_index: usize, old_index: usize) -> Result<(), ListError> {
        self.check_index(old_index)?;
        self.check_index(new_index)?;

        let item = self.items.remove(old_index);
        self.items.insert(new_index, item);
        if self.channel.is_notification_required() {
            self.emit(
                EventType::Move,
                Payload::Index(old_index),
                Payload::One(self.items[new_index].clone().into()),
                Some(new_index),
            );
        }
        Ok(())
    }

    /// Appends every value. Emits one ADD_MANY; an empty batch emits nothing
    /// and returns false.
    pub fn add_all(&mut self, values: impl IntoIterator<Item = T>) -> Result<bool, ListError> {
        let index = self.items.len();
        self.add_all_at(index, values)
    }

    /// Inserts every value starting at `index`. Emits one ADD_MANY.
    pub fn add_all_at(
        &mut self,
        index: usize,
        values: impl IntoIterator<Item = T>,
    ) -> Result<bool, ListError> {
        if index > self.items.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                size: self.items.len(),
            });
        }
        let batch: Vec<T> = values.into_iter().collect();
        if batch.is_empty() {
            return Ok(false);
        }
        self.check_unique_batch(&batch)?;

        let payload = self
            .channel
            .is_notification_required()
            .then(|| Payload::Many(batch.iter().cloned().map(Into::into).collect()));
        self.items.splice(index..index, batch);
        if let Some(new_value) = payload {
            self.emit(EventType::AddMany, Payload::None, new_value, Some(index));
        }
        Ok(true)
    }

    /// Removes every element equal to one of `values`. Emits one REMOVE_MANY
    /// if anything was removed. Returns the number of removed elements.
    pub fn remove_all(&mut self, values: &[T]) -> usize {
        self.remove_where(|item| values.contains(item)).len()
    }

    /// Removes every element matching `predicate`, in order. Emits one
    /// REMOVE_MANY if anything was removed.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut kept = Vec::with_capacity(self.items.len());
        let mut removed = Vec::new();
        let mut positions = Vec::new();
        for (index, item) in std::mem::take(&mut self.items).into_iter().enumerate() {
            if predicate(&item) {
                positions.push(index);
                removed.push(item);
            } else {
                kept.push(item);
            }
        }
        self.items = kept;

        if !removed.is_empty() && self.channel.is_notification_required() {
            self.emit(
                EventType::RemoveMany,
                Payload::Many(removed.iter().cloned().map(Into::into).collect()),
                Payload::Positions(positions),
                None,
            );
        }
        removed
    }

    /// Removes every element. Always emits one REMOVE_MANY, even when the list
    /// was already empty.
    pub fn clear(&mut self) -> Vec<T> {
        let removed = std::mem::take(&mut self.items);
        if self.channel.is_notification_required() {
            self.emit(
                EventType::RemoveMany,
                Payload::Many(removed.iter().cloned().map(Into::into).collect()),
                Payload::Positions((0..removed.len()).collect()),
                None,
            );
        }
        removed
    }
}

impl EList<Value> {
    /// Replaces a proxy at `index` with its resolved value. Emits RESOLVE.
    pub(crate) fn resolve_at(&mut self, index: usize, value: Value) -> Result<(), ListError> {
        self.check_index(index)?;
        let new_payload = self
            .channel
            .is_notification_required()
            .then(|| Payload::One(value.clone()));
        let old = std::mem::replace(&mut self.items[index], value);
        if let Some(new_value) = new_payload {
            self.emit(EventType::Resolve, Payload::One(old), new_value, Some(index));
        }
        Ok(())
    }
}

impl<T> Default for EList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones the elements into a new standalone list; listeners are not copied.
impl<T: Clone> Clone for EList<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            unique: self.unique,
            feature: self.feature.clone(),
            channel: Channel::detached(),
        }
    }
}

impl<T: PartialEq> PartialEq for EList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: fmt::Debug> fmt::Debug for EList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T> FromIterator<T> for EList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            ..Self::new()
        }
    }
}

impl<'a, T> IntoIterator for &'a EList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Clone + PartialEq + Into<Value>> MoveTo for EList<T> {
    fn move_to(&mut self, new_index: usize, old_index: usize) -> Result<(), ListError> {
        EList::move_to(self, new_index, old_index)
    }
}

impl<T: Clone + PartialEq + Into<Value>> Capabilities for EList<T> {
    fn as_move_to(&self) -> Option<&dyn MoveTo> {
        Some(self)
    }

    fn as_move_to_mut(&mut self) -> Option<&mut dyn MoveTo> {
        Some(self)
    }
}
