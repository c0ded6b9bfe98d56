//! Hierarchical discovery of a country's boundary relations.
//!
//! Admin levels are walked in ascending order. Until a level produces
//! relations, each level is probed with the country-root query (the root
//! level itself may be empty in countries whose hierarchy starts deeper).
//! Once a level has accepted relations, every subsequent level fans out
//! child-within-parent queries over the previously accepted set.
//!
//! Admin-level numbering is not dense in all countries, so an empty level
//! is skipped rather than aborting: the parent set is kept unchanged and
//! the next level is probed against the same parents.

use std::collections::{BTreeMap, BTreeSet};

use crate::{OverpassClient, OverpassError, query};

/// Source of relation ids for discovery.
///
/// Factoring the two query shapes behind a trait keeps the level-walking
/// logic testable without a live Overpass endpoint.
pub trait RelationSource {
    /// Ids of a country's root boundary relations at `level`.
    fn country_roots(
        &self,
        iso3: &str,
        level: u8,
    ) -> impl std::future::Future<Output = Result<Vec<i64>, OverpassError>> + Send;

    /// Ids of child boundary relations at `level` within the parent
    /// relation's area.
    fn children_of(
        &self,
        parent_relation_id: i64,
        level: u8,
    ) -> impl std::future::Future<Output = Result<Vec<i64>, OverpassError>> + Send;
}

impl RelationSource for OverpassClient {
    async fn country_roots(&self, iso3: &str, level: u8) -> Result<Vec<i64>, OverpassError> {
        self.run_ids_query(&query::country_roots(iso3, level)).await
    }

    async fn children_of(
        &self,
        parent_relation_id: i64,
        level: u8,
    ) -> Result<Vec<i64>, OverpassError> {
        self.run_ids_query(&query::children_of(parent_relation_id, level))
            .await
    }
}

/// Walks admin levels `min_level..=max_level` and returns the discovered
/// relation ids per level.
///
/// Within a level, ids are deduplicated into a set — the same boundary can
/// appear under multiple parents at land borders, and downstream consumers
/// must not rely on order. The walk is sequential: each level's search
/// areas are the previous accepted level's relations.
///
/// # Errors
///
/// Returns [`OverpassError::NoRelations`] when every level in the range is
/// empty, or the underlying query error if a fetch fails (which aborts the
/// country).
pub async fn discover_levels(
    source: &impl RelationSource,
    iso3: &str,
    min_level: u8,
    max_level: u8,
) -> Result<BTreeMap<u8, BTreeSet<i64>>, OverpassError> {
    let mut levels: BTreeMap<u8, BTreeSet<i64>> = BTreeMap::new();
    let mut parents: BTreeSet<i64> = BTreeSet::new();

    for level in min_level..=max_level {
        let ids: BTreeSet<i64> = if parents.is_empty() {
            source.country_roots(iso3, level).await?.into_iter().collect()
        } else {
            let mut children = BTreeSet::new();
            for &parent in &parents {
                children.extend(source.children_of(parent, level).await?);
            }
            children
        };

        if ids.is_empty() {
            log::info!("{iso3}: no relations at admin level {level}, skipping");
            continue;
        }

        log::info!("{iso3}: {} relations at admin level {level}", ids.len());
        parents = ids.clone();
        levels.insert(level, ids);
    }

    if levels.is_empty() {
        return Err(OverpassError::NoRelations {
            iso3: iso3.to_string(),
        });
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted relation source keyed by (level, parent).
    struct FakeSource {
        roots: BTreeMap<u8, Vec<i64>>,
        children: BTreeMap<(i64, u8), Vec<i64>>,
    }

    impl RelationSource for FakeSource {
        async fn country_roots(&self, _iso3: &str, level: u8) -> Result<Vec<i64>, OverpassError> {
            Ok(self.roots.get(&level).cloned().unwrap_or_default())
        }

        async fn children_of(
            &self,
            parent_relation_id: i64,
            level: u8,
        ) -> Result<Vec<i64>, OverpassError> {
            Ok(self
                .children
                .get(&(parent_relation_id, level))
                .cloned()
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn walks_children_from_the_root_level() {
        let source = FakeSource {
            roots: BTreeMap::from([(4, vec![10, 11])]),
            children: BTreeMap::from([
                ((10, 5), vec![100, 101]),
                ((11, 5), vec![102]),
                ((100, 6), vec![1000]),
            ]),
        };

        let levels = discover_levels(&source, "BEL", 4, 6).await.unwrap();

        assert_eq!(levels[&4], BTreeSet::from([10, 11]));
        assert_eq!(levels[&5], BTreeSet::from([100, 101, 102]));
        assert_eq!(levels[&6], BTreeSet::from([1000]));
    }

    #[tokio::test]
    async fn empty_intermediate_level_keeps_the_parent_set() {
        // Level 5 is empty; level 6 must still be probed against the
        // level-4 parents.
        let source = FakeSource {
            roots: BTreeMap::from([(4, vec![10])]),
            children: BTreeMap::from([((10, 6), vec![60, 61])]),
        };

        let levels = discover_levels(&source, "BEL", 4, 6).await.unwrap();

        assert!(!levels.contains_key(&5));
        assert_eq!(levels[&6], BTreeSet::from([60, 61]));
    }

    #[tokio::test]
    async fn empty_root_level_probes_deeper_roots() {
        // Nothing at level 2; the country's hierarchy starts at 4.
        let source = FakeSource {
            roots: BTreeMap::from([(4, vec![40])]),
            children: BTreeMap::from([((40, 5), vec![50])]),
        };

        let levels = discover_levels(&source, "BEL", 2, 5).await.unwrap();

        assert!(!levels.contains_key(&2));
        assert!(!levels.contains_key(&3));
        assert_eq!(levels[&4], BTreeSet::from([40]));
        assert_eq!(levels[&5], BTreeSet::from([50]));
    }

    #[tokio::test]
    async fn shared_children_are_deduplicated() {
        // Relation 100 borders both parents and is returned by each
        // child query.
        let source = FakeSource {
            roots: BTreeMap::from([(4, vec![10, 11])]),
            children: BTreeMap::from([((10, 5), vec![100]), ((11, 5), vec![100, 101])]),
        };

        let levels = discover_levels(&source, "BEL", 4, 5).await.unwrap();
        assert_eq!(levels[&5], BTreeSet::from([100, 101]));
    }

    #[tokio::test]
    async fn all_levels_empty_is_an_error() {
        let source = FakeSource {
            roots: BTreeMap::new(),
            children: BTreeMap::new(),
        };

        let err = discover_levels(&source, "XKX", 4, 6).await.unwrap_err();
        assert!(matches!(err, OverpassError::NoRelations { .. }));
        assert!(err.to_string().contains("no relations found"));
    }
}
