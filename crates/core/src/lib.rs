//! Core library for the Lightweave lighting composer.
//!
//! A lighting system is described as a tree of nodes (objects, animations
//! and the functions driving them), each carrying typed fields. Fields may
//! derive their visibility or their length from other fields or from a
//! node's children; changes propagate synchronously through those
//! dependencies. The finished tree compiles to the space separated command
//! stream understood by the lighting controller.

pub mod block;
pub mod catalog;
pub mod config;
pub mod error;
pub mod field;
pub mod propagation;
pub mod wire;

pub use block::{Block, BlockId, IdAllocator, Outcome, Tree};
pub use catalog::{Catalog, CatalogEntry, FieldSpec, ItemType, LinkSource, SelectOption};
pub use config::{AppConfig, TreeConfig};
pub use error::{LightweaveError, Result};
pub use field::{Composite, Field, FieldArena, FieldId, FieldValue};
pub use propagation::{ChangeSink, Source};
pub use wire::{WireWriter, DELIMITER};
