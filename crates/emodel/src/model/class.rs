//! Class and feature descriptors.
//!
//! A class is an ordered list of features. Feature order is significant: it
//! fixes slot positions inside [`EObject`](crate::model::EObject) and the order
//! in which codecs write slots.
//!
//! # Example
//!
//! ```rust
//! use emodel::model::{EClass, FeatureKind, Multiplicity};
//!
//! let node = EClass::builder("Node")
//!     .attribute("name")
//!     .containment_many("children")
//!     .reference("next")
//!     .map("tags")
//!     .build();
//!
//! let children = node.feature("children").unwrap();
//! assert_eq!(children.kind(), FeatureKind::Containment);
//! assert_eq!(children.multiplicity(), Multiplicity::Many);
//! ```

use std::sync::Arc;

/// What a feature holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Plain data values.
    Attribute,
    /// Owned child objects; each object has at most one container.
    Containment,
    /// Non-owning links to objects of the same resource.
    Reference,
}

impl FeatureKind {
    pub fn as_u8(self) -> u8 {
        match self {
            FeatureKind::Attribute => 0,
            FeatureKind::Containment => 1,
            FeatureKind::Reference => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FeatureKind::Attribute),
            1 => Some(FeatureKind::Containment),
            2 => Some(FeatureKind::Reference),
            _ => None,
        }
    }
}

/// How many values a feature holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    /// Zero or one value.
    One,
    /// An [`EList`](crate::collections::EList).
    Many,
    /// An [`EMap`](crate::collections::EMap) with string keys.
    Map,
}

impl Multiplicity {
    pub fn as_u8(self) -> u8 {
        match self {
            Multiplicity::One => 0,
            Multiplicity::Many => 1,
            Multiplicity::Map => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Multiplicity::One),
            1 => Some(Multiplicity::Many),
            2 => Some(Multiplicity::Map),
            _ => None,
        }
    }
}

/// A named structural slot of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EFeature {
    name: Arc<str>,
    kind: FeatureKind,
    multiplicity: Multiplicity,
    unique: bool,
}

impl EFeature {
    pub fn new(name: impl Into<Arc<str>>, kind: FeatureKind, multiplicity: Multiplicity) -> Self {
        // Containment lists never hold the same child twice.
        let unique = kind == FeatureKind::Containment && multiplicity == Multiplicity::Many;
        Self {
            name: name.into(),
            kind,
            multiplicity,
            unique,
        }
    }

    /// Marks a list feature as rejecting duplicate elements.
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_many(&self) -> bool {
        self.multiplicity == Multiplicity::Many
    }

    /// Returns true for containment and reference features.
    pub fn holds_objects(&self) -> bool {
        self.kind != FeatureKind::Attribute
    }
}

/// Descriptor of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EClass {
    name: Arc<str>,
    features: Vec<EFeature>,
}

impl EClass {
    pub fn new(name: impl Into<Arc<str>>, features: Vec<EFeature>) -> Self {
        Self {
            name: name.into(),
            features,
        }
    }

    pub fn builder(name: impl Into<Arc<str>>) -> ClassBuilder {
        ClassBuilder {
            name: name.into(),
            features: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &[EFeature] {
        &self.features
    }

    /// Position of the named feature.
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name() == name)
    }

    pub fn feature(&self, name: &str) -> Option<&EFeature> {
        self.features.iter().find(|f| f.name() == name)
    }
}

/// Builder for [`EClass`].
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    name: Arc<str>,
    features: Vec<EFeature>,
}

impl ClassBuilder {
    /// Adds a feature. A feature with the same name replaces the earlier one
    /// in place.
    pub fn feature(mut self, feature: EFeature) -> Self {
        match self.features.iter().position(|f| f.name == feature.name) {
            Some(i) => self.features[i] = feature,
            None => self.features.push(feature),
        }
        self
    }

    pub fn attribute(self, name: &str) -> Self {
        self.feature(EFeature::new(name, FeatureKind::Attribute, Multiplicity::One))
    }

    pub fn attribute_many(self, name: &str) -> Self {
        self.feature(EFeature::new(name, FeatureKind::Attribute, Multiplicity::Many))
    }

    pub fn containment(self, name: &str) -> Self {
        self.feature(EFeature::new(name, FeatureKind::Containment, Multiplicity::One))
    }

    pub fn containment_many(self, name: &str) -> Self {
        self.feature(EFeature::new(name, FeatureKind::Containment, Multiplicity::Many))
    }

    pub fn reference(self, name: &str) -> Self {
        self.feature(EFeature::new(name, FeatureKind::Reference, Multiplicity::One))
    }

    pub fn reference_many(self, name: &str) -> Self {
        self.feature(EFeature::new(name, FeatureKind::Reference, Multiplicity::Many))
    }

    /// Adds a string-keyed map of attribute values.
    pub fn map(self, name: &str) -> Self {
        self.feature(EFeature::new(name, FeatureKind::Attribute, Multiplicity::Map))
    }

    pub fn build(self) -> Arc<EClass> {
        Arc::new(EClass {
            name: self.name,
            features: self.features,
        })
    }
}
