//! Hash-based change tracking for generated artifacts.
//!
//! A [`Store`] maps keys to leaves (text buffers, scalars, arbitrary values).
//! Each compilation pass is a *generation*:
//!
//! ```text
//! reset() -> get(key)... -> run_deferred() -> done() -> changed()/deleted()
//! ```
//!
//! Writers re-create the full content of every artifact they still need on
//! every generation. Once `done()` has frozen the content digests, the store
//! can tell which artifacts were created, which changed, and which were not
//! written anymore. Writing byte-identical content yields no change, so a
//! no-op pass produces no diff at all.
//!
//! An artifact that is not written in a generation is reported as deleted
//! exactly once; it is physically dropped on the reset that follows the next
//! generation.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod any_leaf;
mod buffer_leaf;
mod item;
mod json_leaf;
mod scalar_leaf;
mod store;


pub use self::{
    any_leaf::{AnyLeaf, AnyStore},
    buffer_leaf::{BufferLeaf, BufferStore},
    item::{Item, State},
    json_leaf::{JsonLeaf, JsonStore},
    scalar_leaf::{ScalarLeaf, ScalarStore},
    store::Store,
};

/// A diff-tracked value.
pub trait Leaf {
    /// Clears the content so the leaf can be rewritten in the next
    /// generation.
    fn reset(&mut self);

    /// Digest of the current content. Zero is reserved to mean "no content".
    fn hash(&self) -> u64;
}
