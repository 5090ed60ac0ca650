//! Encoding plan: which objects to write, in which order.
//!
//! Objects are written in containment pre-order starting from the roots. The
//! plan is validated before a single byte is produced, so encoders never emit
//! partial output for an invalid graph.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use uuid::Uuid;

use crate::error::EncodeError;
use crate::model::{CONTENTS, EClass, EObject, FeatureKind, ObjectId, Resource, Value};

/// What a plan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Every root in the resource contents. References must stay inside
    /// the encoded graph.
    Resource,
    /// One object and its subtree. References may point at other objects of
    /// the resource; they are written by UUID and resolved by the decoder
    /// against its target resource.
    Subtree,
}

pub(crate) struct Plan<'r> {
    pub resource: &'r Resource,
    pub roots: Vec<ObjectId>,
    /// Objects in write order.
    pub order: Vec<ObjectId>,
    /// Class dictionary, in first-use order. Classes are keyed by identity.
    pub classes: Vec<Arc<EClass>>,
    class_index: FxHashMap<usize, usize>,
}

impl<'r> Plan<'r> {
    /// Plans a whole resource.
    pub fn for_resource(resource: &'r Resource) -> Result<Self, EncodeError> {
        let mut roots = Vec::with_capacity(resource.contents().len());
        for (index, value) in resource.contents().iter().enumerate() {
            match value {
                Value::Object(id) => roots.push(*id),
                _ => return Err(EncodeError::InvalidRoot { index }),
            }
        }
        Self::build(resource, roots, Scope::Resource)
    }

    /// Plans one object and its subtree.
    pub fn for_object(resource: &'r Resource, object: ObjectId) -> Result<Self, EncodeError> {
        Self::build(resource, vec![object], Scope::Subtree)
    }

    fn build(resource: &'r Resource, roots: Vec<ObjectId>, scope: Scope) -> Result<Self, EncodeError> {
        let mut placed: FxHashSet<ObjectId> = FxHashSet::default();
        let mut order = Vec::new();

        for &root in &roots {
            let object = lookup(resource, root)?;
            if !placed.insert(root) {
                return Err(EncodeError::MultipleContainers {
                    object: object.uuid(),
                    feature: CONTENTS.to_string(),
                });
            }
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                order.push(id);
                let object = lookup(resource, id)?;
                let mut children = Vec::new();
                for (feature, slot) in object.class().features().iter().zip(object.slots()) {
                    if feature.kind() != FeatureKind::Containment {
                        continue;
                    }
                    for value in slot.values() {
                        let child = match value {
                            Value::Object(child) => *child,
                            Value::Proxy(target) => {
                                return Err(EncodeError::UnresolvedProxy {
                                    object: object.uuid(),
                                    feature: feature.name().to_string(),
                                    target: *target,
                                });
                            }
                            _ => {
                                return Err(EncodeError::InvalidContainment {
                                    object: object.uuid(),
                                    feature: feature.name().to_string(),
                                });
                            }
                        };
                        let child_object = lookup(resource, child)?;
                        if !placed.insert(child) {
                            return Err(EncodeError::MultipleContainers {
                                object: child_object.uuid(),
                                feature: feature.name().to_string(),
                            });
                        }
                        children.push(child);
                    }
                }
                stack.extend(children.into_iter().rev());
            }
        }

        let mut plan = Plan {
            resource,
            roots,
            order: Vec::with_capacity(order.len()),
            classes: Vec::new(),
            class_index: FxHashMap::default(),
        };
        for id in order {
            let object = lookup(resource, id)?;
            check_references(resource, object, &placed, scope)?;
            plan.intern_class(object.class());
            plan.order.push(id);
        }
        Ok(plan)
    }

    fn intern_class(&mut self, class: &Arc<EClass>) {
        let key = Arc::as_ptr(class) as usize;
        if !self.class_index.contains_key(&key) {
            self.class_index.insert(key, self.classes.len());
            self.classes.push(class.clone());
        }
    }

    /// Dictionary index of an object's class.
    pub fn class_index(&self, class: &Arc<EClass>) -> usize {
        self.class_index
            .get(&(Arc::as_ptr(class) as usize))
            .copied()
            .unwrap_or_default()
    }

    pub fn object(&self, id: ObjectId) -> Result<&'r EObject, EncodeError> {
        lookup(self.resource, id)
    }

    /// UUID of a referenced object.
    pub fn uuid_of(&self, id: ObjectId) -> Result<Uuid, EncodeError> {
        Ok(lookup(self.resource, id)?.uuid())
    }
}

fn lookup(resource: &Resource, id: ObjectId) -> Result<&EObject, EncodeError> {
    resource.object(id).map_err(|_| EncodeError::UnknownObject(id))
}

fn check_references(
    resource: &Resource,
    object: &EObject,
    placed: &FxHashSet<ObjectId>,
    scope: Scope,
) -> Result<(), EncodeError> {
    for (feature, slot) in object.class().features().iter().zip(object.slots()) {
        if feature.kind() == FeatureKind::Containment {
            continue;
        }
        for value in slot.values() {
            match value {
                Value::Proxy(target) => {
                    return Err(EncodeError::UnresolvedProxy {
                        object: object.uuid(),
                        feature: feature.name().to_string(),
                        target: *target,
                    });
                }
                Value::Object(target) => {
                    let inside = placed.contains(target);
                    let allowed = match scope {
                        Scope::Resource => inside,
                        Scope::Subtree => inside || resource.object(*target).is_ok(),
                    };
                    if !allowed {
                        return Err(EncodeError::DanglingReference {
                            object: object.uuid(),
                            feature: feature.name().to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class() -> Arc<EClass> {
        EClass::builder("Node")
            .attribute("name")
            .containment_many("children")
            .reference("link")
            .build()
    }

    fn add_child(resource: &mut Resource, parent: ObjectId, child: ObjectId) {
        resource
            .object_mut(parent)
            .unwrap()
            .list_mut("children")
            .unwrap()
            .push(Value::Object(child))
            .unwrap();
    }

    #[test]
    fn test_pre_order_and_class_dictionary() {
        let node = class();
        let leaf = EClass::builder("Leaf").attribute("v").build();
        let mut resource = Resource::new("memory:a");
        let root = resource.create(&node);
        let a = resource.create(&node);
        let b = resource.create(&leaf);
        let a1 = resource.create(&leaf);
        resource.add_root(root).unwrap();
        add_child(&mut resource, root, a);
        add_child(&mut resource, root, b);
        add_child(&mut resource, a, a1);

        let plan = Plan::for_resource(&resource).unwrap();
        assert_eq!(plan.order, vec![root, a, a1, b]);
        assert_eq!(plan.classes.len(), 2);
        assert_eq!(plan.class_index(&leaf), 1);
    }

    #[test]
    fn test_shared_child_is_rejected() {
        let node = class();
        let mut resource = Resource::new("memory:a");
        let p1 = resource.create(&node);
        let p2 = resource.create(&node);
        let child = resource.create(&node);
        resource.add_root(p1).unwrap();
        resource.add_root(p2).unwrap();
        add_child(&mut resource, p1, child);
        add_child(&mut resource, p2, child);

        assert!(matches!(
            Plan::for_resource(&resource),
            Err(EncodeError::MultipleContainers { .. })
        ));
    }

    #[test]
    fn test_dangling_reference() {
        let node = class();
        let mut resource = Resource::new("memory:a");
        let root = resource.create(&node);
        let outside = resource.create(&node);
        resource.add_root(root).unwrap();
        resource
            .object_mut(root)
            .unwrap()
            .set("link", Value::Object(outside))
            .unwrap();

        let root_uuid = resource.object(root).unwrap().uuid();
        assert_eq!(
            Plan::for_resource(&resource).err(),
            Some(EncodeError::DanglingReference {
                object: root_uuid,
                feature: "link".to_string(),
            })
        );
        // A subtree may point at the rest of the resource.
        assert!(Plan::for_object(&resource, root).is_ok());
    }

    #[test]
    fn test_invalid_root_and_proxy() {
        let node = class();
        let mut resource = Resource::new("memory:a");
        resource.contents_mut().push(Value::from(1)).unwrap();
        assert_eq!(
            Plan::for_resource(&resource).err(),
            Some(EncodeError::InvalidRoot { index: 0 })
        );

        let mut resource = Resource::new("memory:b");
        let root = resource.create(&node);
        let target = Uuid::from_bytes([5; 16]);
        resource
            .object_mut(root)
            .unwrap()
            .set("link", Value::Proxy(target))
            .unwrap();
        assert!(matches!(
            Plan::for_object(&resource, root),
            Err(EncodeError::UnresolvedProxy { .. })
        ));
        assert!(matches!(
            Plan::for_object(&resource, ObjectId(99)),
            Err(EncodeError::UnknownObject(_))
        ));
    }
}
