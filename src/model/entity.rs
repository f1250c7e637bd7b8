//! Entity in the inventory store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use super::{FieldMap, Value};

/// Discriminator value of a real (non-synthetic) entity.
pub const REAL_VARIANT: &str = "";

/// Built-in columns every entity exposes to predicates.
pub mod column {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const VARIANT: &str = "variant";
    pub const PARENT: &str = "parent";
    pub const REVISION: &str = "revision";
}

/// Stable entity identifier, unique within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self { EntityId(v.to_owned()) }
}

impl From<String> for EntityId {
    fn from(v: String) -> Self { EntityId(v) }
}

/// Reference to another entity: its collection and its ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ref {
    pub kind: String,
    pub id: EntityId,
}

impl Ref {
    pub fn new(kind: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self { kind: kind.into(), id: id.into() }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A record in the inventory store.
///
/// `kind` names the collection, `variant` distinguishes sub-kinds sharing
/// that collection. `revision` is assigned by the store on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: String,
    pub id: EntityId,
    pub variant: String,
    pub name: String,
    /// Direct owner in the containment hierarchy. `None` for a root.
    pub parent: Option<Ref>,
    pub revision: u64,
    pub fields: FieldMap,
    /// Named reference lists (e.g. `hosts`, `networks`).
    pub refs: BTreeMap<String, Vec<Ref>>,
}

impl Entity {
    pub fn new(kind: impl Into<String>, id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            variant: REAL_VARIANT.to_owned(),
            name: name.into(),
            parent: None,
            revision: 0,
            fields: FieldMap::new(),
            refs: BTreeMap::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn with_parent(mut self, parent: Ref) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_refs(mut self, key: impl Into<String>, refs: impl IntoIterator<Item = Ref>) -> Self {
        self.refs.insert(key.into(), refs.into_iter().collect());
        self
    }

    pub fn is_real(&self) -> bool {
        self.variant == REAL_VARIANT
    }

    /// Look up a column or payload field by name.
    ///
    /// Built-in columns shadow payload fields of the same name.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            column::ID => Some(Value::from(self.id.as_str())),
            column::NAME => Some(Value::from(self.name.as_str())),
            column::VARIANT => Some(Value::from(self.variant.as_str())),
            column::PARENT => Some(Value::from(self.parent.as_ref().map(|p| p.id.0.clone()))),
            column::REVISION => Some(Value::from(self.revision)),
            _ => self.fields.get(key).cloned(),
        }
    }
}
