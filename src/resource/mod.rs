//! Client-facing representations.
//!
//! An entity is projected at one of two detail levels and always carries
//! a self link built from a fixed route template. Clients keep the link
//! as a durable reference, so it must be byte-for-byte stable for a given
//! provider and entity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::*;

/// Route parameter naming the owning provider.
pub const PROVIDER_PARAM: &str = "provider";

/// Serialized names of `Resource`. Payload fields and reference lists with
/// these keys are withheld so they cannot shadow the canonical values. A
/// reference list named like a payload field is withheld as well.
pub const RESERVED_KEYS: &[&str] =
    &["id", "variant", "name", "parent", "revision", "path", "selfLink"];

// ============================================================================
// Detail
// ============================================================================

/// How much of an entity a representation carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detail {
    /// Identity and summary fields; no collection-typed fields.
    #[default]
    Minimal,
    /// Everything, including reference lists.
    Full,
}

impl Detail {
    /// Parse the `detail` query value. Integers above zero, `true` and
    /// `all` escalate to full; anything else is minimal.
    pub fn from_param(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) if n > 0 => Detail::Full,
            Ok(_) => Detail::Minimal,
            Err(_) if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("all") => {
                Detail::Full
            }
            Err(_) => Detail::Minimal,
        }
    }
}

// ============================================================================
// Provider and routes
// ============================================================================

/// The inventory source a request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub uid: String,
    /// Provider type, e.g. `vsphere`. Part of every route.
    pub kind: String,
}

impl Provider {
    pub fn new(uid: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { uid: uid.into(), kind: kind.into() }
    }
}

/// Route of one entity collection under a provider type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub provider_kind: String,
    /// Store collection and URL segment, e.g. `clusters`.
    pub collection: String,
    /// Route parameter naming the entity ID, e.g. `cluster`.
    pub param: String,
}

impl Route {
    pub fn new(
        provider_kind: impl Into<String>,
        collection: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        Self {
            provider_kind: provider_kind.into(),
            collection: collection.into(),
            param: param.into(),
        }
    }

    /// `/providers/<kind>/:provider/<collection>`
    pub fn collection_template(&self) -> String {
        format!("/providers/{}/:{PROVIDER_PARAM}/{}", self.provider_kind, self.collection)
    }

    /// `/providers/<kind>/:provider/<collection>/:<param>`
    pub fn template(&self) -> String {
        format!("{}/:{}", self.collection_template(), self.param)
    }

    /// Canonical self link for an entity of this collection.
    pub fn link(&self, provider_uid: &str, id: &EntityId) -> String {
        link(
            &self.template(),
            &[(PROVIDER_PARAM, provider_uid), (self.param.as_str(), id.as_str())],
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template())
    }
}

/// Substitute `:name` segments of a route template.
///
/// Whole segments only, so `:provider` never clobbers `:providers`.
/// Segments without a value are left as they are.
pub fn link(template: &str, params: &[(&str, &str)]) -> String {
    template
        .split(SEPARATOR)
        .map(|segment| {
            segment
                .strip_prefix(':')
                .and_then(|name| params.iter().find(|(k, _)| *k == name))
                .map_or(segment, |(_, v)| *v)
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Representation
// ============================================================================

/// Identity and summary fields common to every representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: EntityId,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub variant: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Ref>,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<InventoryPath>,
    pub self_link: String,
}

/// A resource plus every payload field and reference list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullResource {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(flatten)]
    pub fields: FieldMap,
    #[serde(flatten)]
    pub refs: BTreeMap<String, Vec<Ref>>,
}

/// An entity as a client sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Representation {
    Minimal(Resource),
    Full(Box<FullResource>),
}

impl Representation {
    pub fn resource(&self) -> &Resource {
        match self {
            Representation::Minimal(r) => r,
            Representation::Full(full) => &full.resource,
        }
    }

    pub fn detail(&self) -> Detail {
        match self {
            Representation::Minimal(_) => Detail::Minimal,
            Representation::Full(_) => Detail::Full,
        }
    }
}

// ============================================================================
// Projector
// ============================================================================

/// Projects entities of one collection for one provider.
#[derive(Debug, Clone)]
pub struct Projector {
    route: Route,
    provider: Provider,
}

impl Projector {
    pub fn new(route: Route, provider: Provider) -> Self {
        Self { route, provider }
    }

    pub fn link(&self, id: &EntityId) -> String {
        self.route.link(&self.provider.uid, id)
    }

    /// Total over well-formed entities.
    pub fn project(
        &self,
        entity: &Entity,
        path: Option<InventoryPath>,
        detail: Detail,
    ) -> Representation {
        let resource = Resource {
            id: entity.id.clone(),
            variant: entity.variant.clone(),
            name: entity.name.clone(),
            parent: entity.parent.clone(),
            revision: entity.revision,
            path,
            self_link: self.link(&entity.id),
        };
        match detail {
            Detail::Minimal => Representation::Minimal(resource),
            Detail::Full => {
                let fields: FieldMap = entity
                    .fields
                    .iter()
                    .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let refs = entity
                    .refs
                    .iter()
                    .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()) && !fields.contains_key(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Representation::Full(Box::new(FullResource { resource, fields, refs }))
            }
        }
    }
}
