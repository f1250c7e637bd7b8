//! # Inventory Model
//!
//! Plain data that crosses every boundary: store ↔ resolver ↔ projector ↔ client.
//!
//! Design rule: no I/O, no state, no async in this module.

pub mod entity;
pub mod path;
pub mod value;
pub mod field_map;

pub use entity::{Entity, EntityId, Ref, REAL_VARIANT, column};
pub use path::{InventoryPath, PathFragment, SEPARATOR};
pub use value::Value;
pub use field_map::FieldMap;
