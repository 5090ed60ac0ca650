//! Notifying ordered containers.
//!
//! - [`EList`]: index-addressable sequence with positional move
//! - [`EMap`]: key-unique, position-ordered map with the same move semantics
//!
//! Generic graph-walking code tells the two apart by capability, not by type:
//! anything exposing [`MoveTo`] is list-like ([`is_elist`]), and anything that
//! additionally exposes [`PutEntry`] is map-like ([`is_emap`]). Containers from
//! other crates take part by implementing [`Capabilities`].

mod list;
mod map;

pub use list::EList;
pub use map::EMap;

use crate::error::ListError;
use crate::model::Value;

/// Positional reordering.
pub trait MoveTo {
    /// Moves the element at `old_index` to `new_index` in one step.
    fn move_to(&mut self, new_index: usize, old_index: usize) -> Result<(), ListError>;
}

/// Keyed insertion with dynamic keys and values.
pub trait PutEntry {
    /// Inserts or replaces the entry for `key`, returning the previous value.
    fn put_entry(&mut self, key: Value, value: Value) -> Result<Option<Value>, ListError>;
}

/// Capability discovery for values that may be containers.
///
/// Every method defaults to "not supported", so plain values implement this
/// with an empty `impl`.
pub trait Capabilities {
    fn as_move_to(&self) -> Option<&dyn MoveTo> {
        None
    }

    fn as_move_to_mut(&mut self) -> Option<&mut dyn MoveTo> {
        None
    }

    fn as_put_entry(&self) -> Option<&dyn PutEntry> {
        None
    }

    fn as_put_entry_mut(&mut self) -> Option<&mut dyn PutEntry> {
        None
    }
}

/// Returns true if `candidate` exposes the list capability (`move_to`).
pub fn is_elist<C: Capabilities + ?Sized>(candidate: &C) -> bool {
    candidate.as_move_to().is_some()
}

/// Returns true if `candidate` exposes both `move_to` and `put_entry`.
pub fn is_emap<C: Capabilities + ?Sized>(candidate: &C) -> bool {
    candidate.as_move_to().is_some() && candidate.as_put_entry().is_some()
}

impl Capabilities for Value {}
