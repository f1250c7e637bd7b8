//! Predicate building and structural (path) filtering.
//!
//! A list request is narrowed in two stages. The store evaluates a
//! predicate: the baseline "real entity" check, the leaf of any name
//! fragment, and the caller's own filter. When that still leaves several
//! same-named entities and the client supplied a partial path, the
//! candidates' resolved paths are compared against the fragment.

use tracing::debug;

use crate::model::*;
use crate::predicate::{Predicate, eq};
use crate::query::ListQuery;
use crate::resolver::PathBuilder;
use crate::storage::EntityStore;
use crate::{Error, Result};

/// Real entities only: the variant discriminator holds its canonical empty
/// value.
pub fn baseline() -> Predicate {
    eq(column::VARIANT, REAL_VARIANT)
}

/// Store predicate for a list or watch request.
///
/// Always contains the baseline. A name fragment contributes an equality on
/// its last segment. The caller's predicate is conjoined, never replaced.
pub fn build_predicate(query: &ListQuery) -> Predicate {
    let mut predicate = baseline();
    if let Some(name) = &query.name {
        if let Some(leaf) = PathFragment::parse(name).leaf() {
            predicate = predicate.and(eq(column::NAME, leaf));
        }
    }
    match &query.predicate {
        Some(caller) => caller.clone().and(predicate),
        None => predicate,
    }
}

/// Structural filtering only kicks in for an ambiguous result and a name
/// that looks like a partial path. A name without segments (`/`, `//`)
/// filters nothing.
pub fn needs_structural_filter(candidates: usize, name: Option<&str>) -> bool {
    candidates > 1
        && name.is_some_and(|n| {
            PathFragment::is_path_like(n) && PathFragment::parse(n).leaf().is_some()
        })
}

/// Keep the candidates whose resolved path matches the `name` fragment.
///
/// Returns the list untouched when filtering does not apply. Any path
/// resolution failure fails the whole operation with `FilterFailed`.
pub async fn structural_filter<S>(
    pb: &mut PathBuilder<'_, S>,
    list: Vec<Entity>,
    name: Option<&str>,
) -> Result<Vec<Entity>>
where
    S: EntityStore + ?Sized,
{
    let Some(name) = name.filter(|n| needs_structural_filter(list.len(), Some(*n))) else {
        return Ok(list);
    };
    let fragment = PathFragment::parse(name);
    let before = list.len();

    let mut kept = Vec::with_capacity(before);
    for entity in list {
        let path = pb.path(&entity).await.map_err(|err| Error::FilterFailed {
            id: entity.id.to_string(),
            reason: err.to_string(),
        })?;
        if path.matches(&fragment) {
            kept.push(entity);
        }
    }

    debug!(name, before, after = kept.len(), "structural filter");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use proptest::prelude::*;

    fn seed_two_prods(db: &MemoryStore) {
        db.put(Entity::new("datacenter", "d1", "dc1")).unwrap();
        db.put(Entity::new("datacenter", "d2", "dc2")).unwrap();
        db.put(Entity::new("cluster", "1", "prod").with_parent(Ref::new("datacenter", "d1")))
            .unwrap();
        db.put(Entity::new("cluster", "2", "prod").with_parent(Ref::new("datacenter", "d2")))
            .unwrap();
    }

    #[test]
    fn test_baseline_always_present() {
        let p = build_predicate(&ListQuery::default());
        assert_eq!(p, baseline());
    }

    #[test]
    fn test_name_uses_leaf_segment() {
        let p = build_predicate(&ListQuery::default().with_name("dc1/prod"));
        assert_eq!(p, baseline().and(eq(column::NAME, "prod")));
    }

    #[test]
    fn test_caller_predicate_is_conjoined() {
        let caller = eq("drsEnabled", true);
        let p = build_predicate(&ListQuery::default().with_predicate(caller.clone()));
        assert_eq!(p, Predicate::And(vec![caller, baseline()]));

        let synthetic = Entity::new("cluster", "x", "x")
            .with_variant("Synthetic")
            .with_field("drsEnabled", true);
        assert!(!p.matches(&synthetic));
    }

    #[test]
    fn test_activation_rules() {
        assert!(!needs_structural_filter(1, Some("dc1/prod")));
        assert!(!needs_structural_filter(2, None));
        assert!(!needs_structural_filter(2, Some("prod")));
        assert!(needs_structural_filter(2, Some("dc1/prod")));
        assert!(!needs_structural_filter(2, Some("/")));
        assert!(!needs_structural_filter(2, Some("//")));
    }

    #[tokio::test]
    async fn test_separator_only_name_filters_nothing() {
        let db = MemoryStore::new();
        seed_two_prods(&db);
        let query = ListQuery::default().with_name("/");
        assert_eq!(build_predicate(&query), baseline());

        let list = db.list("cluster", &build_predicate(&query)).await.unwrap();
        let mut pb = PathBuilder::new(&db);
        let kept = structural_filter(&mut pb, list, Some("/")).await.unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[tokio::test]
    async fn test_disambiguates_by_path() {
        let db = MemoryStore::new();
        seed_two_prods(&db);
        let list = db.list("cluster", &baseline()).await.unwrap();

        let mut pb = PathBuilder::new(&db);
        let kept = structural_filter(&mut pb, list, Some("dc1/prod")).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, EntityId::from("1"));
    }

    #[tokio::test]
    async fn test_resolution_failure_fails_everything() {
        let db = MemoryStore::new();
        seed_two_prods(&db);
        let list = db.list("cluster", &baseline()).await.unwrap();
        db.delete("datacenter", &"d2".into()).unwrap();

        let mut pb = PathBuilder::new(&db);
        let err = structural_filter(&mut pb, list, Some("dc1/prod")).await.unwrap_err();
        assert!(matches!(err, Error::FilterFailed { ref id, .. } if id == "2"));
    }

    #[tokio::test]
    async fn test_bare_name_skips_resolution() {
        let db = MemoryStore::new();
        // Dangling parents would fail resolution if it were attempted.
        db.put(Entity::new("cluster", "1", "prod").with_parent(Ref::new("folder", "gone")))
            .unwrap();
        db.put(Entity::new("cluster", "2", "prod").with_parent(Ref::new("folder", "gone")))
            .unwrap();
        let list = db.list("cluster", &baseline()).await.unwrap();

        let mut pb = PathBuilder::new(&db);
        let kept = structural_filter(&mut pb, list, Some("prod")).await.unwrap();
        assert_eq!(kept.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_single_result_is_unchanged(name in "[a-z]{1,4}(/[a-z]{1,4}){0,3}") {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let db = MemoryStore::new();
                let only = db.put(Entity::new("cluster", "1", "prod")).unwrap().entity;
                let mut pb = PathBuilder::new(&db);
                let kept = structural_filter(&mut pb, vec![only.clone()], Some(&name))
                    .await
                    .unwrap();
                assert_eq!(kept, vec![only]);
            });
        }
    }
}
