//! Resources: the unit of ownership and serialization.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use uuid::Uuid;

use crate::collections::EList;
use crate::error::ModelError;
use crate::model::{EClass, EObject, FeatureKind, ObjectId, Slot, Uri, Value};
use crate::notify::{Channel, Listener, ListenerId, NotifierId};

/// Feature name reported by notifications from the contents list.
pub const CONTENTS: &str = "contents";

/// An arena of objects plus the ordered list of root objects.
///
/// Objects are created through the resource and addressed by [`ObjectId`].
/// Every object forwards its notifications to the resource channel, so a
/// listener attached with [`Resource::attach`] observes the whole graph.
///
/// # Example
///
/// ```rust
/// use emodel::model::{EClass, Resource};
///
/// let class = EClass::builder("Node").attribute("name").build();
/// let mut resource = Resource::new("memory:nodes.emb");
/// let root = resource.create(&class);
/// resource.object_mut(root).unwrap().set("name", "root").unwrap();
/// resource.add_root(root).unwrap();
/// assert_eq!(resource.roots(), vec![root]);
/// ```
#[derive(Debug)]
pub struct Resource {
    uri: Uri,
    objects: Vec<EObject>,
    by_uuid: FxHashMap<Uuid, ObjectId>,
    contents: EList<Value>,
    channel: Channel,
}

impl Resource {
    pub fn new(uri: impl Into<Uri>) -> Self {
        let channel = Channel::new(NotifierId::Resource);
        Self {
            uri: uri.into(),
            objects: Vec::new(),
            by_uuid: FxHashMap::default(),
            contents: EList::bound(channel.clone(), Arc::from(CONTENTS), true),
            channel,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: impl Into<Uri>) {
        self.uri = uri.into();
    }

    /// Creates a new object with a random UUID.
    pub fn create(&mut self, class: &Arc<EClass>) -> ObjectId {
        loop {
            if let Ok(id) = self.create_with_uuid(class, Uuid::new_v4()) {
                return id;
            }
        }
    }

    /// Creates a new object with the given UUID.
    pub fn create_with_uuid(&mut self, class: &Arc<EClass>, uuid: Uuid) -> Result<ObjectId, ModelError> {
        if self.by_uuid.contains_key(&uuid) {
            return Err(ModelError::DuplicateUuid(uuid));
        }
        let id = ObjectId(self.objects.len() as u32);
        self.objects
            .push(EObject::new(id, uuid, class.clone(), &self.channel));
        self.by_uuid.insert(uuid, id);
        Ok(id)
    }

    pub fn object(&self, id: ObjectId) -> Result<&EObject, ModelError> {
        self.objects
            .get(id.index())
            .ok_or(ModelError::UnknownObject(id))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut EObject, ModelError> {
        self.objects
            .get_mut(id.index())
            .ok_or(ModelError::UnknownObject(id))
    }

    /// Looks up an object by UUID.
    pub fn find(&self, uuid: &Uuid) -> Option<ObjectId> {
        self.by_uuid.get(uuid).copied()
    }

    /// All objects, in creation order.
    pub fn objects(&self) -> impl Iterator<Item = &EObject> {
        self.objects.iter()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The root list. Duplicates are rejected.
    pub fn contents(&self) -> &EList<Value> {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut EList<Value> {
        &mut self.contents
    }

    /// Root objects, in contents order.
    pub fn roots(&self) -> Vec<ObjectId> {
        self.contents.iter().filter_map(Value::as_object).collect()
    }

    /// Appends an object to the root list. Emits ADD on the resource channel.
    pub fn add_root(&mut self, id: ObjectId) -> Result<(), ModelError> {
        self.object(id)?;
        self.contents.push(Value::Object(id))?;
        Ok(())
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Attaches a listener to the resource. It receives the notifications of
    /// the contents list and of every object in the resource.
    pub fn attach(&self, listener: Arc<dyn Listener>) -> ListenerId {
        self.channel.attach(listener)
    }

    pub fn detach(&self, id: ListenerId) -> bool {
        self.channel.detach(id)
    }

    /// Resolves the proxies held by the given objects against this resource.
    /// Returns the number of resolved proxies.
    pub fn resolve_proxies(&mut self, ids: &[ObjectId]) -> Result<usize, ModelError> {
        let by_uuid = &self.by_uuid;
        let mut resolved = 0;
        for id in ids {
            let object = self
                .objects
                .get_mut(id.index())
                .ok_or(ModelError::UnknownObject(*id))?;
            resolved += object.resolve_proxies(|uuid| by_uuid.get(&uuid).copied())?;
        }
        Ok(resolved)
    }

    /// Objects reachable from `start` through containment, in pre-order,
    /// `start` first. Objects already visited are skipped.
    pub fn all_contents(&self, start: ObjectId) -> Vec<ObjectId> {
        let mut order = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Ok(object) = self.object(id) else {
                continue;
            };
            order.push(id);
            let mut children: Vec<ObjectId> = Vec::new();
            for (index, slot) in object.slots().iter().enumerate() {
                if object.feature_kind(index) == FeatureKind::Containment {
                    children.extend(slot.values().filter_map(Value::as_object));
                }
            }
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Structural equality of the graphs reachable from the roots.
    ///
    /// Objects are matched by UUID, so two resources decoded from the same
    /// bytes compare equal even though their [`ObjectId`]s may differ.
    pub fn graph_eq(&self, other: &Resource) -> bool {
        let mine = self.reachable();
        let theirs = other.reachable();
        if mine.len() != theirs.len() {
            return false;
        }
        let root_uuids = |r: &Resource| -> Vec<Option<Uuid>> {
            r.roots().into_iter().map(|id| r.uuid_of(id)).collect()
        };
        if root_uuids(self) != root_uuids(other) {
            return false;
        }

        mine.iter().zip(theirs.iter()).all(|(&a, &b)| {
            let (Ok(a), Ok(b)) = (self.object(a), other.object(b)) else {
                return false;
            };
            a.uuid() == b.uuid()
                && a.class() == b.class()
                && a.slots().len() == b.slots().len()
                && a
                    .slots()
                    .iter()
                    .zip(b.slots())
                    .all(|(x, y)| {
                        let (x, y) = (self.canonical_slot(x), other.canonical_slot(y));
                        x.len() == y.len()
                            && x.iter()
                                .zip(&y)
                                .all(|((ka, va), (kb, vb))| ka == kb && same_value(va, vb))
                    })
        })
    }

    fn reachable(&self) -> Vec<ObjectId> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        for root in self.roots() {
            for id in self.all_contents(root) {
                if seen.insert(id) {
                    order.push(id);
                }
            }
        }
        order
    }

    fn uuid_of(&self, id: ObjectId) -> Option<Uuid> {
        self.object(id).ok().map(EObject::uuid)
    }

    /// Slot with object handles replaced by UUID proxies, for comparison
    /// across resources.
    fn canonical_slot(&self, slot: &Slot) -> Vec<(Option<String>, Value)> {
        let canonical = |v: &Value| match v {
            Value::Object(id) => self
                .uuid_of(*id)
                .map_or(Value::Bool(false), Value::Proxy),
            other => other.clone(),
        };
        match slot {
            Slot::Single(value) => value.iter().map(|v| (None, canonical(v))).collect(),
            Slot::List(list) => list.iter().map(|v| (None, canonical(v))).collect(),
            Slot::Map(map) => map
                .iter()
                .map(|(k, v)| (Some(k.clone()), canonical(v)))
                .collect(),
        }
    }
}

/// Value equality where floats compare by bit pattern, so NaN equals itself.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}
