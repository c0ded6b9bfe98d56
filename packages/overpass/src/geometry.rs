//! Geometry fetching and assembly for discovered boundary relations.
//!
//! Relations are fetched in paced batches; each response interleaves the
//! relations with the raw ways they reference. Ways are indexed by id,
//! partitioned into outer/inner fragments per relation, and handed to
//! the spatial crate for ring merging and EWKT serialisation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use boundary_map_fetch::progress::ProgressCallback;
use boundary_map_overpass_models::{BoundaryRelation, OverpassResponse};
use boundary_map_spatial::{EMPTY_POLYGON_EWKT, Point, assemble, to_ewkt};

use crate::{OverpassClient, OverpassError, query};

/// Relations fetched per geometry query.
pub const GEOMETRY_BATCH_SIZE: usize = 100;

/// Pause between geometry batches; the pipeline's only Overpass
/// backpressure mechanism.
pub const GEOMETRY_BATCH_DELAY: Duration = Duration::from_millis(250);

/// Fetches and assembles geometry for every relation id in the slice.
///
/// Ids are split into batches of [`GEOMETRY_BATCH_SIZE`] with a
/// [`GEOMETRY_BATCH_DELAY`] sleep between batches. A batch whose fetch
/// exhausts its retries aborts the whole level — an incomplete set must
/// not be persisted as if it were complete.
///
/// Relations missing a `name` or `admin_level` tag are dropped from the
/// result. Relations whose geometry cannot be assembled are kept with the
/// empty-polygon placeholder (the transform stage rejects them later).
///
/// # Errors
///
/// Returns [`OverpassError`] if any batch fails after retries.
pub async fn fetch_level_geometries(
    client: &OverpassClient,
    relation_ids: &[i64],
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<BoundaryRelation>, OverpassError> {
    let mut relations = Vec::with_capacity(relation_ids.len());

    for (batch_index, batch) in relation_ids.chunks(GEOMETRY_BATCH_SIZE).enumerate() {
        if batch_index > 0 {
            tokio::time::sleep(GEOMETRY_BATCH_DELAY).await;
        }

        let response = client.run_query(&query::relation_geometries(batch)).await?;
        relations.extend(parse_geometry_response(&response));
        progress.inc(batch.len() as u64);
    }

    Ok(relations)
}

/// Parses one geometry response into boundary relation records.
#[must_use]
pub fn parse_geometry_response(response: &OverpassResponse) -> Vec<BoundaryRelation> {
    // Index every way's point sequence by id. WKT wants lon-lat axis order.
    let ways: BTreeMap<i64, Vec<Point>> = response
        .elements
        .iter()
        .filter(|e| e.is_way())
        .map(|e| {
            let points: Vec<Point> = e.geometry.iter().map(|p| [p.lon, p.lat]).collect();
            (e.id, points)
        })
        .collect();

    let mut relations = Vec::new();

    for element in response.elements.iter().filter(|e| e.is_relation()) {
        let Some(name) = element.tags.get("name").filter(|n| !n.is_empty()) else {
            log::debug!("relation {}: no name tag, skipping", element.id);
            continue;
        };
        let Some(admin_level) = element
            .tags
            .get("admin_level")
            .and_then(|l| l.parse::<u8>().ok())
        else {
            log::debug!("relation {}: no usable admin_level tag, skipping", element.id);
            continue;
        };

        let mut outer_fragments: Vec<Vec<Point>> = Vec::new();
        let mut inner_fragments: Vec<Vec<Point>> = Vec::new();

        for member in element.members.iter().filter(|m| m.kind == "way") {
            let Some(points) = ways.get(&member.member_ref) else {
                continue;
            };
            if member.is_inner() {
                inner_fragments.push(points.clone());
            } else {
                // Empty roles are treated as outer.
                outer_fragments.push(points.clone());
            }
        }

        let geometry_ewkt = assemble(&outer_fragments, &inner_fragments).map_or_else(
            || {
                log::warn!(
                    "relation {} ({name}): no assemblable outer ring, storing placeholder",
                    element.id
                );
                EMPTY_POLYGON_EWKT.to_string()
            },
            |geometry| to_ewkt(&geometry),
        );

        let wikidata_id = element
            .tags
            .get("wikidata")
            .filter(|id| is_wikidata_id(id))
            .cloned();

        relations.push(BoundaryRelation {
            relation_id: element.id,
            admin_level,
            name: name.clone(),
            wikidata_id,
            tags: element.tags.clone(),
            geometry_ewkt,
        });
    }

    relations
}

/// Returns `true` for canonical wikidata identifiers (`Q` + digits).
/// The `Q` prefix is part of the identifier and is preserved end-to-end.
#[must_use]
pub fn is_wikidata_id(id: &str) -> bool {
    let mut chars = id.chars();
    chars.next() == Some('Q') && {
        let rest = chars.as_str();
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> OverpassResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn assembles_split_ways_into_one_polygon() {
        // Three outer fragments, one reversed, forming a single ring.
        let resp = response(json!({
            "elements": [
                {
                    "type": "relation",
                    "id": 52411,
                    "tags": {
                        "name": "Testland",
                        "admin_level": "4",
                        "wikidata": "Q1234",
                        "boundary": "administrative"
                    },
                    "members": [
                        {"type": "way", "ref": 1, "role": "outer"},
                        {"type": "way", "ref": 2, "role": "outer"},
                        {"type": "way", "ref": 3, "role": "outer"}
                    ]
                },
                {"type": "way", "id": 1, "geometry": [
                    {"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 1.0}
                ]},
                {"type": "way", "id": 2, "geometry": [
                    {"lat": 0.0, "lon": 2.0}, {"lat": 0.0, "lon": 1.0}
                ]},
                {"type": "way", "id": 3, "geometry": [
                    {"lat": 0.0, "lon": 2.0}, {"lat": 1.0, "lon": 2.0},
                    {"lat": 1.0, "lon": 0.0}, {"lat": 0.0, "lon": 0.0}
                ]}
            ]
        }));

        let relations = parse_geometry_response(&resp);
        assert_eq!(relations.len(), 1);

        let relation = &relations[0];
        assert_eq!(relation.relation_id, 52411);
        assert_eq!(relation.admin_level, 4);
        assert_eq!(relation.name, "Testland");
        assert_eq!(relation.wikidata_id.as_deref(), Some("Q1234"));
        assert!(relation.geometry_ewkt.starts_with("SRID=4326;POLYGON(("));
        assert!(boundary_map_spatial::validate_ewkt(&relation.geometry_ewkt));
    }

    #[test]
    fn empty_role_counts_as_outer() {
        let resp = response(json!({
            "elements": [
                {
                    "type": "relation",
                    "id": 7,
                    "tags": {"name": "Roleless", "admin_level": "6"},
                    "members": [{"type": "way", "ref": 1, "role": ""}]
                },
                {"type": "way", "id": 1, "geometry": [
                    {"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 4.0},
                    {"lat": 4.0, "lon": 4.0}, {"lat": 0.0, "lon": 0.0}
                ]}
            ]
        }));

        let relations = parse_geometry_response(&resp);
        assert_eq!(relations.len(), 1);
        assert_ne!(relations[0].geometry_ewkt, EMPTY_POLYGON_EWKT);
    }

    #[test]
    fn drops_relations_without_name_or_level() {
        let resp = response(json!({
            "elements": [
                {
                    "type": "relation",
                    "id": 1,
                    "tags": {"admin_level": "4"},
                    "members": []
                },
                {
                    "type": "relation",
                    "id": 2,
                    "tags": {"name": "No Level"},
                    "members": []
                }
            ]
        }));

        assert!(parse_geometry_response(&resp).is_empty());
    }

    #[test]
    fn inner_only_relation_gets_the_placeholder() {
        let resp = response(json!({
            "elements": [
                {
                    "type": "relation",
                    "id": 9,
                    "tags": {"name": "Hole Only", "admin_level": "8"},
                    "members": [{"type": "way", "ref": 1, "role": "inner"}]
                },
                {"type": "way", "id": 1, "geometry": [
                    {"lat": 2.0, "lon": 2.0}, {"lat": 2.0, "lon": 8.0},
                    {"lat": 8.0, "lon": 8.0}, {"lat": 2.0, "lon": 2.0}
                ]}
            ]
        }));

        let relations = parse_geometry_response(&resp);
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].geometry_ewkt, EMPTY_POLYGON_EWKT);
    }

    #[test]
    fn malformed_wikidata_tags_are_discarded() {
        let resp = response(json!({
            "elements": [
                {
                    "type": "relation",
                    "id": 3,
                    "tags": {
                        "name": "Bad Tag",
                        "admin_level": "4",
                        "wikidata": "1234"
                    },
                    "members": []
                }
            ]
        }));

        let relations = parse_geometry_response(&resp);
        assert_eq!(relations[0].wikidata_id, None);
    }

    #[test]
    fn wikidata_id_shape() {
        assert!(is_wikidata_id("Q1"));
        assert!(is_wikidata_id("Q1234567"));
        assert!(!is_wikidata_id("1234"));
        assert!(!is_wikidata_id("Q"));
        assert!(!is_wikidata_id("q1234"));
        assert!(!is_wikidata_id("Q12a4"));
    }
}
