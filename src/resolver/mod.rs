//! Path resolution: entity → `/root/.../leaf`.
//!
//! Entities only store a reference to their direct parent. The fully
//! qualified path is recomputed on demand by walking those references up to
//! a root (an entity with no parent).

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::model::*;
use crate::storage::EntityStore;
use crate::{Error, Result};

/// Ancestor hops allowed before the walk is abandoned.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// What the walk needs from each ancestor.
#[derive(Debug, Clone)]
struct Ancestor {
    name: String,
    parent: Option<Ref>,
}

/// Builds inventory paths against a store.
///
/// Ancestor lookups are cached for the builder's lifetime, so one builder
/// per request lets siblings share their parents' lookups. Do not keep a
/// builder across requests: the cache does not observe store mutations.
pub struct PathBuilder<'s, S: EntityStore + ?Sized> {
    store: &'s S,
    max_depth: usize,
    cache: HashMap<Ref, Ancestor>,
}

impl<'s, S: EntityStore + ?Sized> PathBuilder<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store, max_depth: DEFAULT_MAX_DEPTH, cache: HashMap::new() }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve the root-to-leaf path of `entity`.
    ///
    /// Fails with `CycleOrDepthExceeded` when more than `max_depth` ancestors
    /// are walked, and with `NotFound` when a parent reference dangles.
    pub async fn path(&mut self, entity: &Entity) -> Result<InventoryPath> {
        let mut segments = vec![entity.name.clone()];
        let mut next = entity.parent.clone();
        let mut depth = 0;

        while let Some(parent) = next {
            depth += 1;
            if depth > self.max_depth {
                return Err(Error::CycleOrDepthExceeded {
                    id: entity.id.to_string(),
                    max_depth: self.max_depth,
                });
            }
            let ancestor = self.ancestor(&parent).await?;
            segments.push(ancestor.name);
            next = ancestor.parent;
        }

        Ok(InventoryPath::from_leaf_up(segments))
    }

    /// Like `path`, but an unresolvable hierarchy yields `None`.
    ///
    /// For projection, where a transiently inconsistent store must not
    /// fail the request.
    pub async fn try_path(&mut self, entity: &Entity) -> Option<InventoryPath> {
        match self.path(entity).await {
            Ok(path) => Some(path),
            Err(err) => {
                debug!(id = %entity.id, error = %err, "path unresolved");
                None
            }
        }
    }

    async fn ancestor(&mut self, r: &Ref) -> Result<Ancestor> {
        if let Some(hit) = self.cache.get(r) {
            return Ok(hit.clone());
        }
        trace!(parent = %r, "path lookup");
        let entity = self
            .store
            .resolve(r)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ancestor {r}")))?;
        let ancestor = Ancestor { name: entity.name, parent: entity.parent };
        self.cache.insert(r.clone(), ancestor.clone());
        Ok(ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn seed(db: &MemoryStore) {
        db.put(Entity::new("datacenter", "d1", "dc1")).unwrap();
        db.put(Entity::new("folder", "f1", "host").with_parent(Ref::new("datacenter", "d1")))
            .unwrap();
    }

    #[tokio::test]
    async fn test_root_path_is_own_name() {
        let db = MemoryStore::new();
        seed(&db);
        let root = db.get("datacenter", &"d1".into()).await.unwrap().unwrap();
        let path = PathBuilder::new(&db).path(&root).await.unwrap();
        assert_eq!(path.to_string(), "/dc1");
    }

    #[tokio::test]
    async fn test_walks_across_collections() {
        let db = MemoryStore::new();
        seed(&db);
        let cluster = Entity::new("cluster", "c1", "prod").with_parent(Ref::new("folder", "f1"));
        let path = PathBuilder::new(&db).path(&cluster).await.unwrap();
        assert_eq!(path.segments(), ["dc1", "host", "prod"]);
    }

    #[tokio::test]
    async fn test_cycle_is_bounded() {
        let db = MemoryStore::new();
        db.put(Entity::new("folder", "a", "a").with_parent(Ref::new("folder", "b"))).unwrap();
        db.put(Entity::new("folder", "b", "b").with_parent(Ref::new("folder", "a"))).unwrap();

        let a = db.get("folder", &"a".into()).await.unwrap().unwrap();
        let err = PathBuilder::new(&db).with_max_depth(8).path(&a).await.unwrap_err();
        assert!(matches!(err, Error::CycleOrDepthExceeded { max_depth: 8, .. }));
    }

    #[tokio::test]
    async fn test_depth_limit_is_inclusive() {
        let db = MemoryStore::new();
        seed(&db);
        let cluster = Entity::new("cluster", "c1", "prod").with_parent(Ref::new("folder", "f1"));

        assert!(PathBuilder::new(&db).with_max_depth(2).path(&cluster).await.is_ok());
        assert!(PathBuilder::new(&db).with_max_depth(1).path(&cluster).await.is_err());
    }

    #[tokio::test]
    async fn test_dangling_parent_is_not_found() {
        let db = MemoryStore::new();
        let orphan = Entity::new("cluster", "c1", "prod").with_parent(Ref::new("folder", "gone"));
        let err = PathBuilder::new(&db).path(&orphan).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_try_path_is_best_effort() {
        let db = MemoryStore::new();
        seed(&db);
        let orphan = Entity::new("cluster", "c1", "prod").with_parent(Ref::new("folder", "gone"));
        let placed = Entity::new("cluster", "c2", "test").with_parent(Ref::new("folder", "f1"));

        let mut pb = PathBuilder::new(&db);
        assert_eq!(pb.try_path(&orphan).await, None);
        assert_eq!(pb.try_path(&placed).await.unwrap().to_string(), "/dc1/host/test");
    }

    #[tokio::test]
    async fn test_cache_survives_ancestor_removal() {
        let db = MemoryStore::new();
        seed(&db);
        let a = Entity::new("cluster", "c1", "a").with_parent(Ref::new("folder", "f1"));
        let b = Entity::new("cluster", "c2", "b").with_parent(Ref::new("folder", "f1"));

        let mut pb = PathBuilder::new(&db);
        pb.path(&a).await.unwrap();
        db.delete("folder", &"f1".into()).unwrap();
        assert_eq!(pb.path(&b).await.unwrap().to_string(), "/dc1/host/b");
    }
}
