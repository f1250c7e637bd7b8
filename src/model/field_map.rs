//! FieldMap: the typed payload carried by every entity.

use std::collections::BTreeMap;
use super::Value;

/// A map of field names to values. Ordered so serialized output is stable.
pub type FieldMap = BTreeMap<String, Value>;
