//! Typed view of a decoded OSM entity.
//!
//! The analyses never touch `osmpbf` types directly; the pipeline converts
//! every element into an [`EntityRecord`] at the decoder boundary so handlers
//! stay independent of the input format and can be exercised with hand-built
//! records in tests.

use std::collections::HashMap;

use osmpbf::{DenseNode, HeaderBlock, Node, Relation, RelMemberType, Way};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Way,
    Relation,
    Area,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Way => "way",
            EntityKind::Relation => "relation",
            EntityKind::Area => "area",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberRef {
    pub kind: EntityKind,
    pub id: i64,
    pub role: String,
}

/// One entity from the stream. `version` is 0 when the input carries no
/// metadata, `uid` 0 means anonymous, `user` may be empty.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: i64,
    pub version: u32,
    pub uid: i64,
    pub user: String,
    pub timestamp: Option<String>,
    pub tags: HashMap<String, String>,
    /// Node position as (lat, lon); absent for other kinds.
    pub coord: Option<(f64, f64)>,
    /// Ordered node references of a way.
    pub refs: Vec<i64>,
    pub members: Vec<MemberRef>,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self {
            kind,
            id,
            version: 0,
            uid: 0,
            user: String::new(),
            timestamp: None,
            tags: HashMap::new(),
            coord: None,
            refs: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    pub fn from_node(node: &Node) -> Self {
        let info = node.info();
        Self {
            kind: EntityKind::Node,
            id: node.id(),
            version: info.version().map(|v| v.max(0) as u32).unwrap_or(0),
            uid: info.uid().map(i64::from).unwrap_or(0),
            user: info
                .user()
                .and_then(|user| user.ok())
                .map(|s| s.to_string())
                .unwrap_or_default(),
            timestamp: info.milli_timestamp().and_then(format_timestamp_millis),
            tags: build_tag_map(node.tags()),
            coord: Some((node.lat(), node.lon())),
            refs: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn from_dense_node(node: &DenseNode) -> Self {
        let info = node.info();
        Self {
            kind: EntityKind::Node,
            id: node.id(),
            version: info
                .as_ref()
                .map(|i| i.version().max(0) as u32)
                .unwrap_or(0),
            uid: info.as_ref().map(|i| i64::from(i.uid())).unwrap_or(0),
            user: info
                .as_ref()
                .and_then(|i| i.user().ok())
                .map(|s| s.to_string())
                .unwrap_or_default(),
            timestamp: info
                .as_ref()
                .and_then(|i| format_timestamp_millis(i.milli_timestamp())),
            tags: build_tag_map(node.tags()),
            coord: Some((node.lat(), node.lon())),
            refs: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn from_way(way: &Way) -> Self {
        let info = way.info();
        Self {
            kind: EntityKind::Way,
            id: way.id(),
            version: info.version().map(|v| v.max(0) as u32).unwrap_or(0),
            uid: info.uid().map(i64::from).unwrap_or(0),
            user: info
                .user()
                .and_then(|user| user.ok())
                .map(|s| s.to_string())
                .unwrap_or_default(),
            timestamp: info.milli_timestamp().and_then(format_timestamp_millis),
            tags: build_tag_map(way.tags()),
            coord: None,
            refs: way.refs().collect(),
            members: Vec::new(),
        }
    }

    pub fn from_relation(relation: &Relation) -> Self {
        let info = relation.info();
        let members = relation
            .members()
            .map(|member| MemberRef {
                kind: match member.member_type {
                    RelMemberType::Node => EntityKind::Node,
                    RelMemberType::Way => EntityKind::Way,
                    RelMemberType::Relation => EntityKind::Relation,
                },
                id: member.member_id,
                role: member.role().map(|r| r.to_string()).unwrap_or_default(),
            })
            .collect();
        Self {
            kind: EntityKind::Relation,
            id: relation.id(),
            version: info.version().map(|v| v.max(0) as u32).unwrap_or(0),
            uid: info.uid().map(i64::from).unwrap_or(0),
            user: info
                .user()
                .and_then(|user| user.ok())
                .map(|s| s.to_string())
                .unwrap_or_default(),
            timestamp: info.milli_timestamp().and_then(format_timestamp_millis),
            tags: build_tag_map(relation.tags()),
            coord: None,
            refs: Vec::new(),
            members,
        }
    }
}

/// Header/provenance metadata surfaced once per stream.
#[derive(Debug, Clone, Default)]
pub struct HeaderMeta {
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
}

impl HeaderMeta {
    pub fn from_header(header: &HeaderBlock) -> Self {
        Self {
            required_features: header
                .required_features()
                .iter()
                .map(|f| f.to_string())
                .collect(),
            optional_features: header
                .optional_features()
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

pub fn build_tag_map<'a, I>(tags: I) -> HashMap<String, String>
where
    I: Iterator<Item = (&'a str, &'a str)>,
{
    tags.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn format_timestamp_millis(millis: i64) -> Option<String> {
    let nanos = i128::from(millis) * 1_000_000;
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    dt.format(&Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_lookup() {
        let mut entity = EntityRecord::new(EntityKind::Node, 1);
        entity
            .tags
            .insert("amenity".to_string(), "restaurant".to_string());
        assert_eq!(entity.tag("amenity"), Some("restaurant"));
        assert!(entity.has_tag("amenity"));
        assert!(!entity.has_tag("shop"));
    }

    #[test]
    fn timestamp_renders_rfc3339() {
        assert_eq!(
            format_timestamp_millis(1_700_000_000_000).as_deref(),
            Some("2023-11-14T22:13:20Z")
        );
    }
}
