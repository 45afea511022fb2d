//! Multi-category predicate matching over single entities.
//!
//! A [`MatchSpec`] holds up to five category sets plus an optional version
//! constraint. An entity matches when every non-empty category accepts it;
//! within a category any configured value suffices. Empty categories are
//! unconstrained.

use anyhow::{Result, bail};
use std::collections::HashMap;

use crate::entity::{EntityKind, EntityRecord, HeaderMeta};
use crate::pipeline::{Advance, Phase, StreamHandler};
use crate::sinks::EntitySink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    /// The `*` wildcard: any value, key presence suffices.
    Any,
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagExpr {
    pub key: String,
    pub value: TagValue,
}

impl TagExpr {
    /// Parses `key=value` or `key=*`. Both sides must be non-empty.
    pub fn parse(expr: &str) -> Result<Self> {
        let Some((key, value)) = expr.split_once('=') else {
            bail!("tag expression '{expr}' must be key=value or key=*");
        };
        if key.is_empty() || value.is_empty() {
            bail!("tag expression '{expr}' must be key=value or key=*");
        }
        let value = if value == "*" {
            TagValue::Any
        } else {
            TagValue::Literal(value.to_string())
        };
        Ok(Self {
            key: key.to_string(),
            value,
        })
    }

    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        match tags.get(&self.key) {
            None => false,
            Some(_) if self.value == TagValue::Any => true,
            Some(actual) => matches!(&self.value, TagValue::Literal(wanted) if wanted == actual),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSign {
    Exact,
    Greater,
    Less,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionFilter {
    pub magnitude: u32,
    pub sign: VersionSign,
}

impl VersionFilter {
    /// Parses `N`, `N+` or `N-`.
    pub fn parse(text: &str) -> Result<Self> {
        let (digits, sign) = match text.strip_suffix('+') {
            Some(rest) => (rest, VersionSign::Greater),
            None => match text.strip_suffix('-') {
                Some(rest) => (rest, VersionSign::Less),
                None => (text, VersionSign::Exact),
            },
        };
        let magnitude = digits
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("version filter '{text}' must be N, N+ or N-"))?;
        Ok(Self { magnitude, sign })
    }

    /// Equality passes regardless of sign; this mirrors the historical tool
    /// and is kept deliberately (see DESIGN.md).
    pub fn matches(&self, version: u32) -> bool {
        if version == self.magnitude {
            return true;
        }
        match self.sign {
            VersionSign::Exact => false,
            VersionSign::Greater => version > self.magnitude,
            VersionSign::Less => version < self.magnitude,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchSpec {
    pub kinds: Vec<EntityKind>,
    pub ids: Vec<i64>,
    pub uids: Vec<i64>,
    pub users: Vec<String>,
    pub exprs: Vec<TagExpr>,
    pub version: Option<VersionFilter>,
}

impl MatchSpec {
    pub fn matches(&self, entity: &EntityRecord) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&entity.kind) {
            return false;
        }
        if !self.ids.is_empty() && !self.ids.contains(&entity.id) {
            return false;
        }
        if !self.uids.is_empty() && !self.uids.contains(&entity.uid) {
            return false;
        }
        if !self.users.is_empty() && !self.users.iter().any(|u| *u == entity.user) {
            return false;
        }
        if !self.exprs.is_empty() && !self.exprs.iter().any(|e| e.matches(&entity.tags)) {
            return false;
        }
        if let Some(version) = &self.version {
            if !version.matches(entity.version) {
                return false;
            }
        }
        true
    }

    fn wants(&self, kind: EntityKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

/// Counts matching entities per kind and optionally forwards them verbatim to
/// a sink.
pub struct GrepHandler {
    spec: MatchSpec,
    sink: Option<Box<dyn EntitySink>>,
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
}

impl GrepHandler {
    pub fn new(spec: MatchSpec, sink: Option<Box<dyn EntitySink>>) -> Self {
        Self {
            spec,
            sink,
            nodes: 0,
            ways: 0,
            relations: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.nodes + self.ways + self.relations
    }

    fn accept(&mut self, entity: &EntityRecord) -> Result<bool> {
        if !self.spec.matches(entity) {
            return Ok(false);
        }
        if let Some(sink) = &mut self.sink {
            sink.entity(entity)?;
        }
        Ok(true)
    }
}

impl StreamHandler for GrepHandler {
    fn header(&mut self, header: &HeaderMeta) -> Result<()> {
        if let Some(sink) = &mut self.sink {
            sink.header(header)?;
        }
        Ok(())
    }

    fn node(&mut self, entity: &EntityRecord) -> Result<Advance> {
        if self.accept(entity)? {
            self.nodes += 1;
        }
        Ok(Advance::Continue)
    }

    fn way(&mut self, entity: &EntityRecord) -> Result<Advance> {
        if self.accept(entity)? {
            self.ways += 1;
        }
        Ok(Advance::Continue)
    }

    fn relation(&mut self, entity: &EntityRecord) -> Result<Advance> {
        if self.accept(entity)? {
            self.relations += 1;
        }
        Ok(Advance::Continue)
    }

    fn end_phase(&mut self, phase: Phase) -> Result<Advance> {
        match phase {
            Phase::Nodes if self.spec.wants(EntityKind::Node) => {
                println!("nodes: {}", self.nodes);
            }
            Phase::Ways if self.spec.wants(EntityKind::Way) => {
                println!("ways: {}", self.ways);
            }
            Phase::Relations if self.spec.wants(EntityKind::Relation) => {
                println!("relations: {}", self.relations);
            }
            _ => {}
        }
        Ok(Advance::Continue)
    }

    fn finish(&mut self) -> Result<()> {
        println!("total: {}", self.total());
        if let Some(sink) = &mut self.sink {
            sink.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::feed;

    fn node(id: i64) -> EntityRecord {
        EntityRecord::new(EntityKind::Node, id)
    }

    fn tagged(kind: EntityKind, id: i64, pairs: &[(&str, &str)]) -> EntityRecord {
        let mut entity = EntityRecord::new(kind, id);
        for (k, v) in pairs {
            entity.tags.insert(k.to_string(), v.to_string());
        }
        entity
    }

    #[test]
    fn empty_spec_matches_everything() {
        let spec = MatchSpec::default();
        assert!(spec.matches(&node(1)));
        assert!(spec.matches(&EntityRecord::new(EntityKind::Relation, 2)));
    }

    #[test]
    fn tag_exprs_are_ored() {
        let spec = MatchSpec {
            exprs: vec![
                TagExpr::parse("amenity=restaurant").unwrap(),
                TagExpr::parse("shop=*").unwrap(),
            ],
            ..Default::default()
        };
        assert!(spec.matches(&tagged(EntityKind::Node, 1, &[("amenity", "restaurant")])));
        assert!(spec.matches(&tagged(EntityKind::Node, 2, &[("shop", "bakery")])));
        assert!(!spec.matches(&tagged(EntityKind::Node, 3, &[("amenity", "school")])));
        assert!(!spec.matches(&node(4)));
    }

    #[test]
    fn categories_are_anded() {
        let spec = MatchSpec {
            kinds: vec![EntityKind::Node],
            uids: vec![5, 7],
            ..Default::default()
        };
        let mut matching = node(1);
        matching.uid = 5;
        assert!(spec.matches(&matching));

        let mut wrong_kind = EntityRecord::new(EntityKind::Way, 2);
        wrong_kind.uid = 5;
        assert!(!spec.matches(&wrong_kind));

        let mut wrong_uid = node(3);
        wrong_uid.uid = 6;
        assert!(!spec.matches(&wrong_uid));
    }

    #[test]
    fn user_names_match_exactly() {
        let spec = MatchSpec {
            users: vec!["alice".to_string()],
            ..Default::default()
        };
        let mut entity = node(1);
        entity.user = "alice".to_string();
        assert!(spec.matches(&entity));
        entity.user = "Alice".to_string();
        assert!(!spec.matches(&entity));
    }

    #[test]
    fn version_equality_passes_any_sign() {
        let below = VersionFilter::parse("3-").unwrap();
        assert!(below.matches(1));
        assert!(below.matches(2));
        assert!(below.matches(3));
        assert!(!below.matches(4));

        let above = VersionFilter::parse("3+").unwrap();
        assert!(above.matches(3));
        assert!(above.matches(4));
        assert!(!above.matches(2));

        let exact = VersionFilter::parse("3").unwrap();
        assert!(exact.matches(3));
        assert!(!exact.matches(2));
        assert!(!exact.matches(4));
    }

    #[test]
    fn bad_expressions_are_rejected() {
        assert!(TagExpr::parse("amenity").is_err());
        assert!(TagExpr::parse("=value").is_err());
        assert!(TagExpr::parse("key=").is_err());
        assert!(VersionFilter::parse("x+").is_err());
    }

    #[test]
    fn unconstrained_grep_counts_all_kinds() {
        let mut handler = GrepHandler::new(MatchSpec::default(), None);
        feed(
            [
                node(1),
                node(2),
                EntityRecord::new(EntityKind::Way, 3),
                EntityRecord::new(EntityKind::Relation, 4),
            ],
            &mut handler,
        )
        .unwrap();
        assert_eq!(handler.nodes, 2);
        assert_eq!(handler.ways, 1);
        assert_eq!(handler.relations, 1);
        assert_eq!(handler.total(), 4);
    }

    struct CollectingSink {
        ids: std::sync::Arc<std::sync::Mutex<Vec<i64>>>,
    }

    impl EntitySink for CollectingSink {
        fn header(&mut self, _header: &HeaderMeta) -> Result<()> {
            Ok(())
        }

        fn entity(&mut self, entity: &EntityRecord) -> Result<()> {
            self.ids.lock().unwrap().push(entity.id);
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_receives_only_matches_in_order() {
        let spec = MatchSpec {
            uids: vec![5],
            ..Default::default()
        };
        let ids = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Box::new(CollectingSink { ids: ids.clone() });
        let mut handler = GrepHandler::new(spec, Some(sink));
        let mut a = node(1);
        a.uid = 5;
        let b = node(2);
        let mut c = EntityRecord::new(EntityKind::Way, 3);
        c.uid = 5;
        feed([a, b, c], &mut handler).unwrap();
        assert_eq!(handler.nodes, 1);
        assert_eq!(handler.ways, 1);
        assert_eq!(*ids.lock().unwrap(), vec![1, 3]);
    }
}
