//! Notifying object graphs with pluggable codecs.
//!
//! This crate provides a small reflective object model whose every structural
//! change is observable, plus an encode/decode pipeline that turns a model
//! into bytes and back.
//!
//! # Overview
//!
//! - **Notifications**: lists, maps, objects and resources emit a
//!   [`Notification`] for each committed mutation, delivered synchronously
//!   through a [`Channel`] to attached listeners.
//! - **Containers**: [`EList`] and [`EMap`] are ordered, support positional
//!   `move_to`, and are recognised generically through [`is_elist`] /
//!   [`is_emap`].
//! - **Codecs**: a [`CodecRegistry`] picks a [`Codec`] by URI protocol, then
//!   by file extension, then falls back to a no-op codec. Codecs create
//!   encoders and decoders with synchronous and streaming entry points.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use emodel::{EClass, ListenerError, Notification, Resource, Value};
//!
//! let class = EClass::builder("Library")
//!     .attribute("name")
//!     .attribute_many("shelves")
//!     .build();
//!
//! let mut resource = Resource::new("memory:library.emb");
//! let library = resource.create(&class);
//! resource.add_root(library).unwrap();
//!
//! let object = resource.object_mut(library).unwrap();
//! object.attach(Arc::new(|n: &Notification| -> Result<(), ListenerError> {
//!     println!("{} on {:?}", n.kind(), n.feature());
//!     Ok(())
//! }));
//!
//! let shelves = object.list_mut("shelves").unwrap();
//! shelves.add_all(vec![Value::from("a"), Value::from("b"), Value::from("c")]).unwrap();
//! shelves.move_to(0, 2).unwrap();
//! assert_eq!(shelves.as_slice(), &[Value::from("c"), Value::from("a"), Value::from("b")]);
//! ```
//!
//! # Modules
//!
//! - [`notify`]: notification channel, listeners and event kinds
//! - [`collections`]: notifying list and map
//! - [`model`]: classes, objects, resources, values and URIs
//! - [`codec`]: codec traits, registry and built-in codecs
//! - [`error`]: error types
//! - [`limits`]: wire constants and decoder limits
//!
//! # Security
//!
//! Decoders are meant for untrusted input: every count and length is checked
//! against [`limits`] before allocation, varints are bounded, and invalid data
//! is rejected with an error carrying an `Exxx` code.

pub mod codec;
pub mod collections;
pub mod error;
pub mod limits;
pub mod model;
pub mod notify;

// Re-export commonly used types at crate root
pub use codec::{
    BinaryCodec, Codec, CodecOptions, CodecRegistry, DecodeState, Decoder, Encoder, JsonCodec,
    NoopCodec,
};
pub use collections::{Capabilities, EList, EMap, MoveTo, PutEntry, is_elist, is_emap};
pub use error::{DecodeError, EncodeError, ErrorCode, ListError, ListenerError, ModelError};
pub use model::{
    ClassBuilder, EClass, EFeature, EObject, FeatureKind, Multiplicity, ObjectId, Resource, Slot,
    Uri, Value,
};
pub use notify::{Channel, EventType, Listener, ListenerId, NotifierId, Notification, Payload};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
