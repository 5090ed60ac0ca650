//! Ordered, notifying map.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use super::{Capabilities, MoveTo, PutEntry};
use crate::error::ListError;
use crate::model::Value;
use crate::notify::{Channel, EventType, Listener, ListenerId, Notification, Payload};

/// A key-unique map whose entries keep a position, like an [`EList`](super::EList)
/// of entries.
///
/// Replacing the value of an existing key keeps the entry where it is and
/// emits SET; a new key is appended and emits ADD.
///
/// By default removing a missing key is a no-op that returns `Ok(None)`.
/// A map created with [`EMap::strict`] reports it as [`ListError::KeyNotFound`].
pub struct EMap<K, V> {
    entries: IndexMap<K, V>,
    strict: bool,
    feature: Option<Arc<str>>,
    channel: Channel,
}

impl<K, V> EMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            strict: false,
            feature: None,
            channel: Channel::detached(),
        }
    }

    /// Creates a map that rejects removal of missing keys.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    pub(crate) fn bound(channel: Channel, feature: Arc<str>) -> Self {
        Self {
            entries: IndexMap::new(),
            strict: false,
            feature: Some(feature),
            channel,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`.
    pub fn get_index(&self, index: usize) -> Result<(&K, &V), ListError> {
        self.entries
            .get_index(index)
            .ok_or(ListError::IndexOutOfRange {
                index,
                size: self.entries.len(),
            })
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, K, V> {
        self.entries.keys()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, K, V> {
        self.entries.values()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, K, V> {
        self.entries.iter()
    }

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
        if index >= self.entries.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                size: self.entries.len(),
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

impl<K: Hash + Eq, V> EMap<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Position of `key`, if present.
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.entries.get_index_of(key)
    }
}

fn entry<K: Clone + Into<Value>, V: Clone + Into<Value>>(key: &K, value: &V) -> Payload {
    Payload::Entry(key.clone().into(), value.clone().into())
}

fn entries<'a, K, V>(iter: impl Iterator<Item = (&'a K, &'a V)>) -> Payload
where
    K: Clone + Into<Value> + 'a,
    V: Clone + Into<Value> + 'a,
{
    Payload::Entries(
        iter.map(|(k, v)| (k.clone().into(), v.clone().into()))
            .collect(),
    )
}

impl<K, V> EMap<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Into<Value>,
    V: Clone + Into<Value>,
{
    /// Inserts or replaces the value for `key`, returning the previous value.
    ///
    /// Emits SET (position unchanged) for an existing key, ADD otherwise.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        match self.entries.get_index_of(&key) {
            Some(index) => {
                let old = std::mem::replace(&mut self.entries[index], value);
                if self.channel.is_notification_required() {
                    self.emit(
                        EventType::Set,
                        entry(&key, &old),
                        entry(&key, &self.entries[index]),
                        Some(index),
                    );
                }
                Some(old)
            }
            None => {
                let payload = self
                    .channel
                    .is_notification_required()
                    .then(|| entry(&key, &value));
                let (index, _) = self.entries.insert_full(key, value);
                if let Some(new_value) = payload {
                    self.emit(EventType::Add, Payload::None, new_value, Some(index));
                }
                None
            }
        }
    }

    /// Inserts a new entry, failing if `key` is already present. Emits ADD.
    pub fn insert_unique(&mut self, key: K, value: V) -> Result<(), ListError> {
        if self.entries.contains_key(&key) {
            return Err(ListError::DuplicateKey {
                key: format!("{key:?}"),
            });
        }
        self.put(key, value);
        Ok(())
    }

    /// Puts every entry of the batch in one step. Later duplicates in the
    /// batch win.
    ///
    /// Existing keys are updated in place and new keys are appended. The whole
    /// batch is reported by a single ADD_MANY: `old_value` holds the replaced
    /// entries with their previous values, `new_value` every entry written in
    /// batch order, and `position` the index of the first appended entry.
    /// Returns the number of new entries.
    pub fn put_all(&mut self, batch: impl IntoIterator<Item = (K, V)>) -> usize {
        let incoming: IndexMap<K, V> = batch.into_iter().collect();
        if incoming.is_empty() {
            return 0;
        }

        let notify = self.channel.is_notification_required();
        let first = self.entries.len();
        let mut replaced: Vec<(Value, Value)> = Vec::new();
        let mut written: Vec<(Value, Value)> = Vec::new();
        for (key, value) in incoming {
            let (index, old) = self.entries.insert_full(key, value);
            if !notify {
                continue;
            }
            if let Some((key, value)) = self.entries.get_index(index) {
                if let Some(old) = old {
                    replaced.push((key.clone().into(), old.into()));
                }
                written.push((key.clone().into(), value.clone().into()));
            }
        }

        let added = self.entries.len() - first;
        if notify {
            let old_value = if replaced.is_empty() {
                Payload::None
            } else {
                Payload::Entries(replaced)
            };
            self.emit(
                EventType::AddMany,
                old_value,
                Payload::Entries(written),
                (added > 0).then_some(first),
            );
        }
        added
    }

    /// Appends a batch of new entries with one ADD_MANY.
    ///
    /// Fails without changing the map if a key is already present or repeats
    /// within the batch.
    pub fn insert_all_unique(&mut self, batch: Vec<(K, V)>) -> Result<usize, ListError> {
        let mut keys = FxHashSet::default();
        for (key, _) in &batch {
            if self.entries.contains_key(key) || !keys.insert(key) {
                return Err(ListError::DuplicateKey {
                    key: format!("{key:?}"),
                });
            }
        }
        Ok(self.put_all(batch))
    }

    /// Removes the entry for `key`, shifting later entries. Emits REMOVE.
    ///
    /// A missing key returns `Ok(None)` and emits nothing, unless the map is
    /// strict.
    pub fn remove_key(&mut self, key: &K) -> Result<Option<V>, ListError> {
        match self.entries.shift_remove_full(key) {
            Some((index, key, value)) => {
                if self.channel.is_notification_required() {
                    self.emit(EventType::Remove, entry(&key, &value), Payload::None, Some(index));
                }
                Ok(Some(value))
            }
            None if self.strict => Err(ListError::KeyNotFound {
                key: format!("{key:?}"),
            }),
            None => Ok(None),
        }
    }

    /// Removes the entry at `index`. Emits REMOVE.
    pub fn remove_at(&mut self, index: usize) -> Result<(K, V), ListError> {
        self.check_index(index)?;
        let (key, value) = self
            .entries
            .shift_remove_index(index)
            .ok_or(ListError::IndexOutOfRange {
                index,
                size: self.entries.len(),
            })?;
        if self.channel.is_notification_required() {
            self.emit(EventType::Remove, entry(&key, &value), Payload::None, Some(index));
        }
        Ok((key, value))
    }

    /// Moves the entry at `old_index` to `new_index`. Emits MOVE.
    pub fn move_to(&mut self, new_index: usize, old_index: usize) -> Result<(), ListError> {
        self.check_index(old_index)?;
        self.check_index(new_index)?;

        self.entries.move_index(old_index, new_index);
        if self.channel.is_notification_required() {
            let (key, value) = self.get_index(new_index)?;
            let moved = entry(key, value);
            self.emit(EventType::Move, Payload::Index(old_index), moved, Some(new_index));
        }
        Ok(())
    }

    /// Removes every entry. Always emits one REMOVE_MANY.
    pub fn clear(&mut self) -> Vec<(K, V)> {
        let removed: Vec<(K, V)> = std::mem::take(&mut self.entries).into_iter().collect();
        if self.channel.is_notification_required() {
            self.emit(
                EventType::RemoveMany,
                entries(removed.iter().map(|(k, v)| (k, v))),
                Payload::Positions((0..removed.len()).collect()),
                None,
            );
        }
        removed
    }
}

impl<K: Clone + Into<Value>> EMap<K, Value> {
    /// Replaces a proxy value at `index` with its resolved value. Emits RESOLVE.
    pub(crate) fn resolve_value_at(&mut self, index: usize, value: Value) -> Result<(), ListError> {
        self.check_index(index)?;
        let new_payload = self.channel.is_notification_required().then(|| value.clone());
        let (key, slot) = self
            .entries
            .get_index_mut(index)
            .ok_or(ListError::IndexOutOfRange { index, size: 0 })?;
        let key = key.clone();
        let old = std::mem::replace(slot, value);
        if let Some(new_value) = new_payload {
            let key: Value = key.into();
            self.emit(
                EventType::Resolve,
                Payload::Entry(key.clone(), old),
                Payload::Entry(key, new_value),
                Some(index),
            );
        }
        Ok(())
    }
}

impl<K, V> Default for EMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones the entries into a standalone map; listeners are not copied.
impl<K: Clone, V: Clone> Clone for EMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            strict: self.strict,
            feature: self.feature.clone(),
            channel: Channel::detached(),
        }
    }
}

/// Order-sensitive: two maps with the same entries in a different order differ.
impl<K: PartialEq, V: PartialEq> PartialEq for EMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a == b)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for EMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for EMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            ..Self::new()
        }
    }
}

impl<'a, K, V> IntoIterator for &'a EMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = indexmap::map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K, V> MoveTo for EMap<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Into<Value>,
    V: Clone + Into<Value>,
{
    fn move_to(&mut self, new_index: usize, old_index: usize) -> Result<(), ListError> {
        EMap::move_to(self, new_index, old_index)
    }
}

impl<K, V> PutEntry for EMap<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Into<Value> + TryFrom<Value>,
    V: Clone + Into<Value> + TryFrom<Value>,
{
    fn put_entry(&mut self, key: Value, value: Value) -> Result<Option<Value>, ListError> {
        let found = key.kind_name();
        let key = K::try_from(key).map_err(|_| ListError::TypeMismatch {
            expected: std::any::type_name::<K>(),
            found,
        })?;
        let found = value.kind_name();
        let value = V::try_from(value).map_err(|_| ListError::TypeMismatch {
            expected: std::any::type_name::<V>(),
            found,
        })?;
        Ok(self.put(key, value).map(Into::into))
    }
}

impl<K, V> Capabilities for EMap<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Into<Value> + TryFrom<Value>,
    V: Clone + Into<Value> + TryFrom<Value>,
{
    fn as_move_to(&self) -> Option<&dyn MoveTo> {
        Some(self)
    }

    fn as_move_to_mut(&mut self) -> Option<&mut dyn MoveTo> {
        Some(self)
    }

    fn as_put_entry(&self) -> Option<&dyn PutEntry> {
        Some(self)
    }

    fn as_put_entry_mut(&mut self) -> Option<&mut dyn PutEntry> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::error::ListenerError;

    fn record<K, V>(map: &EMap<K, V>) -> Arc<Mutex<Vec<Notification>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        map.attach(Arc::new(
            move |n: &Notification| -> Result<(), ListenerError> {
                sink.lock().push(n.clone());
                Ok(())
            },
        ));
        seen
    }

    #[test]
    fn test_put_existing_key_is_set_in_place() {
        let mut map: EMap<String, i64> = EMap::new();
        map.put("a".to_string(), 1);
        map.put("b".to_string(), 2);
        let seen = record(&map);

        assert_eq!(map.put("a".to_string(), 10), Some(1));
        assert_eq!(map.len(), 2);
        assert_eq!(map.index_of(&"a".to_string()), Some(0));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind(), EventType::Set);
        assert_eq!(seen[0].position(), Some(0));
        assert_eq!(
            seen[0].old_value(),
            &Payload::Entry(Value::from("a"), Value::Int(1))
        );
        assert_eq!(
            seen[0].new_value(),
            &Payload::Entry(Value::from("a"), Value::Int(10))
        );
    }

    #[test]
    fn test_put_new_key_appends() {
        let mut map: EMap<String, i64> = EMap::new();
        let seen = record(&map);
        assert_eq!(map.put("x".to_string(), 1), None);
        assert_eq!(map.put("y".to_string(), 2), None);

        let seen = seen.lock();
        assert_eq!(seen[1].kind(), EventType::Add);
        assert_eq!(seen[1].position(), Some(1));
    }

    #[test]
    fn test_remove_key_keeps_order() {
        let mut map: EMap<i64, String> =
            [(1, "one"), (2, "two"), (3, "three")]
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect();
        let seen = record(&map);

        assert_eq!(map.remove_key(&2), Ok(Some("two".to_string())));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 3]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind(), EventType::Remove);
        assert_eq!(seen[0].position(), Some(1));
    }

    #[test]
    fn test_remove_missing_key() {
        let mut lenient: EMap<i64, i64> = EMap::new();
        let seen = record(&lenient);
        assert_eq!(lenient.remove_key(&7), Ok(None));
        assert!(seen.lock().is_empty());

        let mut strict: EMap<i64, i64> = EMap::strict();
        assert_eq!(
            strict.remove_key(&7),
            Err(ListError::KeyNotFound {
                key: "7".to_string()
            })
        );
    }

    #[test]
    fn test_insert_unique() {
        let mut map: EMap<i64, i64> = EMap::new();
        map.insert_unique(1, 1).unwrap();
        assert_eq!(
            map.insert_unique(1, 2),
            Err(ListError::DuplicateKey {
                key: "1".to_string()
            })
        );
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn test_move_entry() {
        let mut map: EMap<i64, i64> = [(1, 10), (2, 20), (3, 30)].into_iter().collect();
        let seen = record(&map);

        map.move_to(0, 2).unwrap();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(map.get(&3), Some(&30));
        assert_eq!(
            map.move_to(3, 0),
            Err(ListError::IndexOutOfRange { index: 3, size: 3 })
        );

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].move_indices(), Some((2, 0)));
        assert_eq!(
            seen[0].new_value(),
            &Payload::Entry(Value::Int(3), Value::Int(30))
        );
    }

    #[test]
    fn test_put_all_emits_one_notification() {
        let mut map: EMap<i64, i64> = [(1, 10), (2, 20)].into_iter().collect();
        let seen = record(&map);

        let added = map.put_all(vec![(1, 11), (2, 20), (3, 30), (2, 21)]);
        assert_eq!(added, 1);
        assert_eq!(map.get(&1), Some(&11));
        assert_eq!(map.get(&2), Some(&21));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(map.put_all(Vec::new()), 0);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind(), EventType::AddMany);
        assert_eq!(seen[0].position(), Some(2));
        assert_eq!(
            seen[0].old_value(),
            &Payload::Entries(vec![
                (Value::Int(1), Value::Int(10)),
                (Value::Int(2), Value::Int(20)),
            ])
        );
        assert_eq!(
            seen[0].new_value(),
            &Payload::Entries(vec![
                (Value::Int(1), Value::Int(11)),
                (Value::Int(2), Value::Int(21)),
                (Value::Int(3), Value::Int(30)),
            ])
        );
    }

    #[test]
    fn test_put_all_of_existing_keys_only() {
        let mut map: EMap<i64, i64> = [(1, 10)].into_iter().collect();
        let seen = record(&map);

        assert_eq!(map.put_all(vec![(1, 12)]), 0);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind(), EventType::AddMany);
        assert_eq!(seen[0].position(), None);
    }

    #[test]
    fn test_insert_all_unique() {
        let mut map: EMap<i64, i64> = [(1, 10)].into_iter().collect();
        let seen = record(&map);

        assert_eq!(
            map.insert_all_unique(vec![(2, 20), (1, 11)]),
            Err(ListError::DuplicateKey {
                key: "1".to_string()
            })
        );
        assert_eq!(
            map.insert_all_unique(vec![(2, 20), (2, 21)]),
            Err(ListError::DuplicateKey {
                key: "2".to_string()
            })
        );
        assert_eq!(map.len(), 1);
        assert!(seen.lock().is_empty());

        assert_eq!(map.insert_all_unique(vec![(2, 20), (3, 30)]), Ok(2));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].old_value(), &Payload::None);
        assert_eq!(seen[0].position(), Some(1));
    }

    #[test]
    fn test_clear_and_equality() {
        let mut a: EMap<i64, i64> = [(1, 1), (2, 2)].into_iter().collect();
        let b: EMap<i64, i64> = [(2, 2), (1, 1)].into_iter().collect();
        assert_ne!(a, b);

        let seen = record(&a);
        assert_eq!(a.clear(), vec![(1, 1), (2, 2)]);
        assert!(a.is_empty());
        assert_eq!(seen.lock()[0].kind(), EventType::RemoveMany);
    }

    #[test]
    fn test_remove_at() {
        let mut map: EMap<i64, i64> = [(1, 1), (2, 2)].into_iter().collect();
        assert_eq!(map.remove_at(0), Ok((1, 1)));
        assert_eq!(
            map.remove_at(1),
            Err(ListError::IndexOutOfRange { index: 1, size: 1 })
        );
        assert_eq!(map.get_index(0), Ok((&2, &2)));
    }
}
