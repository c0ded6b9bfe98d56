//! Overpass QL query text builders.
//!
//! Three query shapes cover the whole pipeline: country roots by ISO3 tag,
//! children within a parent relation's area, and full geometry for a batch
//! of relation ids. All use JSON output and a 90 second server-side
//! timeout.

use std::fmt::Write as _;

/// Server-side evaluation timeout declared in every query.
pub const QUERY_TIMEOUT_SECS: u32 = 90;

/// Offset turning an OSM relation id into an Overpass area id.
pub const AREA_ID_OFFSET: i64 = 3_600_000_000;

/// Overpass area id for a relation, used as a spatial search area in
/// child-discovery queries.
#[must_use]
pub const fn area_id(relation_id: i64) -> i64 {
    AREA_ID_OFFSET + relation_id
}

/// Query for a country's root boundary relations at one admin level,
/// selected by the `ISO3166-1:alpha3` tag. Ids only, to minimise payload.
#[must_use]
pub fn country_roots(iso3: &str, level: u8) -> String {
    format!(
        "[out:json][timeout:{QUERY_TIMEOUT_SECS}];\
         relation[\"boundary\"=\"administrative\"][\"admin_level\"=\"{level}\"][\"ISO3166-1:alpha3\"=\"{iso3}\"];\
         out ids;"
    )
}

/// Query for child boundary relations at `level` spatially within the
/// parent relation's area. Ids only.
#[must_use]
pub fn children_of(parent_relation_id: i64, level: u8) -> String {
    let area = area_id(parent_relation_id);
    format!(
        "[out:json][timeout:{QUERY_TIMEOUT_SECS}];\
         relation[\"boundary\"=\"administrative\"][\"admin_level\"=\"{level}\"](area:{area});\
         out ids;"
    )
}

/// Query for a batch of relations plus the ways they reference, with full
/// geometry on every element.
#[must_use]
pub fn relation_geometries(relation_ids: &[i64]) -> String {
    let mut ids = String::new();
    for (i, id) in relation_ids.iter().enumerate() {
        if i > 0 {
            ids.push(',');
        }
        write!(ids, "{id}").expect("writing to a String cannot fail");
    }

    format!(
        "[out:json][timeout:{QUERY_TIMEOUT_SECS}];\
         relation(id:{ids})->.rels;\
         (.rels;way(r.rels););\
         out geom;"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_root_query_filters_on_iso3_tag() {
        let q = country_roots("BEL", 4);
        assert!(q.starts_with("[out:json][timeout:90];"));
        assert!(q.contains("[\"boundary\"=\"administrative\"]"));
        assert!(q.contains("[\"admin_level\"=\"4\"]"));
        assert!(q.contains("[\"ISO3166-1:alpha3\"=\"BEL\"]"));
        assert!(q.ends_with("out ids;"));
    }

    #[test]
    fn child_query_uses_the_derived_area_id() {
        let q = children_of(52411, 6);
        assert!(q.contains("(area:3600052411)"));
        assert!(q.contains("[\"admin_level\"=\"6\"]"));
        assert!(q.ends_with("out ids;"));
    }

    #[test]
    fn area_id_offsets_the_relation_id() {
        assert_eq!(area_id(1), 3_600_000_001);
        assert_eq!(area_id(52411), 3_600_052_411);
    }

    #[test]
    fn geometry_query_recurses_into_member_ways() {
        let q = relation_geometries(&[1, 2, 3]);
        assert!(q.contains("relation(id:1,2,3)->.rels;"));
        assert!(q.contains("way(r.rels)"));
        assert!(q.ends_with("out geom;"));
    }
}
