//! Reflective object model.
//!
//! - [`EClass`] / [`EFeature`]: type descriptors
//! - [`EObject`]: an instance with one [`Slot`] per feature
//! - [`Resource`]: arena of objects plus the ordered root list
//! - [`Value`]: dynamic feature values, including unresolved proxies
//! - [`Uri`]: resource locators

mod class;
mod object;
mod resource;
mod uri;
mod value;

pub use class::{ClassBuilder, EClass, EFeature, FeatureKind, Multiplicity};
pub use object::{EObject, Slot};
pub use resource::{CONTENTS, Resource};
pub use uri::Uri;
pub use value::{ObjectId, Value};
