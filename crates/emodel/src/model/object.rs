//! Reflective objects.

use std::sync::Arc;

use uuid::Uuid;

use crate::collections::{Capabilities, EList, EMap, MoveTo, PutEntry};
use crate::error::{ListError, ModelError};
use crate::model::{EClass, FeatureKind, Multiplicity, ObjectId, Value};
use crate::notify::{Channel, EventType, Listener, ListenerId, Notification, NotifierId, Payload};

/// Storage for one feature of an object.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Single(Option<Value>),
    List(EList<Value>),
    Map(EMap<String, Value>),
}

impl Slot {
    pub fn as_list(&self) -> Option<&EList<Value>> {
        match self {
            Slot::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&EMap<String, Value>> {
        match self {
            Slot::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            Slot::Single(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Returns true if the slot holds at least one value.
    pub fn is_set(&self) -> bool {
        match self {
            Slot::Single(value) => value.is_some(),
            Slot::List(list) => !list.is_empty(),
            Slot::Map(map) => !map.is_empty(),
        }
    }

    /// Every value in the slot, in order. Map entries yield their values.
    pub fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Slot::Single(value) => Box::new(value.iter()),
            Slot::List(list) => Box::new(list.iter()),
            Slot::Map(map) => Box::new(map.values()),
        }
    }
}

impl Capabilities for Slot {
    fn as_move_to(&self) -> Option<&dyn MoveTo> {
        match self {
            Slot::Single(_) => None,
            Slot::List(list) => list.as_move_to(),
            Slot::Map(map) => map.as_move_to(),
        }
    }

    fn as_move_to_mut(&mut self) -> Option<&mut dyn MoveTo> {
        match self {
            Slot::Single(_) => None,
            Slot::List(list) => list.as_move_to_mut(),
            Slot::Map(map) => map.as_move_to_mut(),
        }
    }

    fn as_put_entry(&self) -> Option<&dyn PutEntry> {
        match self {
            Slot::Map(map) => map.as_put_entry(),
            _ => None,
        }
    }

    fn as_put_entry_mut(&mut self) -> Option<&mut dyn PutEntry> {
        match self {
            Slot::Map(map) => map.as_put_entry_mut(),
            _ => None,
        }
    }
}

/// An instance of an [`EClass`], owned by a [`Resource`](crate::model::Resource).
///
/// List and map features share the object's channel, so a listener attached
/// to the object sees changes to every feature.
#[derive(Debug)]
pub struct EObject {
    id: ObjectId,
    uuid: Uuid,
    class: Arc<EClass>,
    slots: Vec<Slot>,
    channel: Channel,
}

impl EObject {
    pub(crate) fn new(id: ObjectId, uuid: Uuid, class: Arc<EClass>, upstream: &Channel) -> Self {
        let channel = Channel::with_upstream(NotifierId::Object(id), upstream);
        let slots = class
            .features()
            .iter()
            .map(|f| match f.multiplicity() {
                Multiplicity::One => Slot::Single(None),
                Multiplicity::Many => {
                    Slot::List(EList::bound(channel.clone(), f.name_arc(), f.is_unique()))
                }
                Multiplicity::Map => Slot::Map(EMap::bound(channel.clone(), f.name_arc())),
            })
            .collect();
        Self {
            id,
            uuid,
            class,
            slots,
            channel,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn class(&self) -> &Arc<EClass> {
        &self.class
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
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

    fn feature_index(&self, name: &str) -> Result<usize, ModelError> {
        self.class
            .feature_index(name)
            .ok_or_else(|| ModelError::UnknownFeature {
                class: self.class.name().to_string(),
                feature: name.to_string(),
            })
    }

    /// Value of a single-valued feature.
    pub fn get(&self, feature: &str) -> Result<Option<&Value>, ModelError> {
        match &self.slots[self.feature_index(feature)?] {
            Slot::Single(value) => Ok(value.as_ref()),
            _ => Err(ModelError::NotSingleValued {
                feature: feature.to_string(),
            }),
        }
    }

    /// Returns true if the feature holds a value (non-empty for lists and maps).
    pub fn is_set(&self, feature: &str) -> Result<bool, ModelError> {
        Ok(self.slots[self.feature_index(feature)?].is_set())
    }

    /// Sets a single-valued feature, returning the previous value. Emits SET.
    pub fn set(&mut self, feature: &str, value: impl Into<Value>) -> Result<Option<Value>, ModelError> {
        let index = self.feature_index(feature)?;
        self.set_at(index, value.into())
    }

    pub(crate) fn set_at(&mut self, index: usize, value: Value) -> Result<Option<Value>, ModelError> {
        let feature = &self.class.features()[index];
        if feature.holds_objects() && !matches!(value, Value::Object(_) | Value::Proxy(_)) {
            return Err(ListError::TypeMismatch {
                expected: "object",
                found: value.kind_name(),
            }
            .into());
        }
        let name = feature.name_arc();
        let Slot::Single(slot) = &mut self.slots[index] else {
            return Err(ModelError::NotSingleValued {
                feature: name.to_string(),
            });
        };

        let new_payload = self
            .channel
            .is_notification_required()
            .then(|| Payload::One(value.clone()));
        let old = slot.replace(value);
        if let Some(new_value) = new_payload {
            let old_value = old.clone().map_or(Payload::None, Payload::One);
            self.emit(EventType::Set, name, old_value, new_value, None);
        }
        Ok(old)
    }

    /// Clears a feature, returning the previous single value.
    ///
    /// A single-valued feature emits UNSET (also when it was already unset);
    /// a list or map is cleared and emits REMOVE_MANY.
    pub fn unset(&mut self, feature: &str) -> Result<Option<Value>, ModelError> {
        let index = self.feature_index(feature)?;
        let name = self.class.features()[index].name_arc();
        match &mut self.slots[index] {
            Slot::Single(slot) => {
                let old = slot.take();
                if self.channel.is_notification_required() {
                    let old_value = old.clone().map_or(Payload::None, Payload::One);
                    self.emit(EventType::Unset, name, old_value, Payload::None, None);
                }
                Ok(old)
            }
            Slot::List(list) => {
                list.clear();
                Ok(None)
            }
            Slot::Map(map) => {
                map.clear();
                Ok(None)
            }
        }
    }

    pub fn list(&self, feature: &str) -> Result<&EList<Value>, ModelError> {
        match &self.slots[self.feature_index(feature)?] {
            Slot::List(list) => Ok(list),
            _ => Err(ModelError::NotMany {
                feature: feature.to_string(),
            }),
        }
    }

    pub fn list_mut(&mut self, feature: &str) -> Result<&mut EList<Value>, ModelError> {
        let index = self.feature_index(feature)?;
        match &mut self.slots[index] {
            Slot::List(list) => Ok(list),
            _ => Err(ModelError::NotMany {
                feature: feature.to_string(),
            }),
        }
    }

    pub fn map(&self, feature: &str) -> Result<&EMap<String, Value>, ModelError> {
        match &self.slots[self.feature_index(feature)?] {
            Slot::Map(map) => Ok(map),
            _ => Err(ModelError::NotMap {
                feature: feature.to_string(),
            }),
        }
    }

    pub fn map_mut(&mut self, feature: &str) -> Result<&mut EMap<String, Value>, ModelError> {
        let index = self.feature_index(feature)?;
        match &mut self.slots[index] {
            Slot::Map(map) => Ok(map),
            _ => Err(ModelError::NotMap {
                feature: feature.to_string(),
            }),
        }
    }

    /// Replaces every proxy in this object with the object `lookup` returns for
    /// its UUID. Emits one RESOLVE per replaced proxy and returns their count.
    pub(crate) fn resolve_proxies(
        &mut self,
        lookup: impl Fn(Uuid) -> Option<ObjectId>,
    ) -> Result<usize, ModelError> {
        let mut resolved = 0;
        for index in 0..self.slots.len() {
            let feature = self.class.features()[index].name_arc();
            let unresolved = |target: Uuid| ModelError::UnresolvedProxy {
                object: self.uuid,
                feature: feature.to_string(),
                target,
            };

            let pending: Vec<(usize, Uuid)> = self.slots[index]
                .values()
                .enumerate()
                .filter_map(|(i, v)| match v {
                    Value::Proxy(uuid) => Some((i, *uuid)),
                    _ => None,
                })
                .collect();

            for (position, target) in pending {
                let id = lookup(target).ok_or_else(|| unresolved(target))?;
                match &mut self.slots[index] {
                    Slot::Single(slot) => {
                        let old = slot.replace(Value::Object(id));
                        if self.channel.is_notification_required() {
                            let old_value = old.map_or(Payload::None, Payload::One);
                            self.emit(
                                EventType::Resolve,
                                feature.clone(),
                                old_value,
                                Payload::One(Value::Object(id)),
                                None,
                            );
                        }
                    }
                    Slot::List(list) => list.resolve_at(position, Value::Object(id))?,
                    Slot::Map(map) => map.resolve_value_at(position, Value::Object(id))?,
                }
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Returns true if any slot still holds a proxy.
    pub fn has_proxies(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.values().any(Value::is_proxy))
    }

    pub(crate) fn feature_kind(&self, index: usize) -> FeatureKind {
        self.class.features()[index].kind()
    }

    fn emit(
        &self,
        kind: EventType,
        feature: Arc<str>,
        old_value: Payload,
        new_value: Payload,
        position: Option<usize>,
    ) {
        let notification = Notification::new(
            kind,
            self.channel.notifier(),
            Some(feature),
            old_value,
            new_value,
            position,
        );
        self.channel.notify(&notification);
    }
}
