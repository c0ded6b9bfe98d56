#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wire types for the Overpass interpreter and the canonical parsed
//! boundary record.
//!
//! Overpass returns a flat `elements` array mixing relations and ways; the
//! structs here deserialize that shape permissively (absent fields default)
//! so `out ids;` and `out geom;` responses both decode with the same types.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level Overpass JSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassResponse {
    /// Mixed relation/way elements; empty when the query matched nothing.
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

/// One element from an Overpass response.
///
/// Which fields are populated depends on the element kind and the output
/// mode: `out ids;` yields only `type` + `id`; `out geom;` adds `tags` and
/// `members` on relations and `geometry` on ways.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassElement {
    /// Element kind: `"relation"`, `"way"`, or `"node"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// OSM object id (unique per kind).
    pub id: i64,
    /// Tag map, verbatim from OSM.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Member references (relations only).
    #[serde(default)]
    pub members: Vec<RelationMember>,
    /// Ordered way geometry (ways only, `out geom;` responses).
    #[serde(default)]
    pub geometry: Vec<GeometryPoint>,
}

impl OverpassElement {
    /// Returns `true` for relation elements.
    #[must_use]
    pub fn is_relation(&self) -> bool {
        self.kind == "relation"
    }

    /// Returns `true` for way elements.
    #[must_use]
    pub fn is_way(&self) -> bool {
        self.kind == "way"
    }
}

/// A member entry inside a relation element.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationMember {
    /// Member kind: `"way"`, `"node"`, or `"relation"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Id of the referenced object.
    #[serde(rename = "ref")]
    pub member_ref: i64,
    /// Membership role; boundary relations use `"outer"`, `"inner"`, or
    /// the empty string (treated as outer).
    #[serde(default)]
    pub role: String,
}

impl RelationMember {
    /// Returns `true` when this member contributes an inner (hole) ring.
    /// An empty role counts as outer, matching how OSM data is mapped in
    /// practice.
    #[must_use]
    pub fn is_inner(&self) -> bool {
        self.role == "inner"
    }
}

/// One coordinate of a way's geometry.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeometryPoint {
    /// Latitude, WGS84.
    pub lat: f64,
    /// Longitude, WGS84.
    pub lon: f64,
}

/// A fully parsed administrative boundary relation, ready to persist.
#[derive(Debug, Clone)]
pub struct BoundaryRelation {
    /// OSM relation id.
    pub relation_id: i64,
    /// Administrative level, 2 (country) through 11.
    pub admin_level: u8,
    /// The relation's `name` tag.
    pub name: String,
    /// The relation's `wikidata` tag (`Q…`), when present.
    pub wikidata_id: Option<String>,
    /// Full tag map, preserved verbatim.
    pub tags: BTreeMap<String, String>,
    /// Assembled geometry as EWKT (possibly the empty-polygon placeholder).
    pub geometry_ewkt: String,
}
