//! Histogram of how often ways reference each node.
//!
//! Reference counts saturate at 255. The histogram covers every id from 0 up
//! to the highest node id in the file, so bucket 0 counts the nodes no way
//! touches; references to ids beyond the node phase are recorded but fall
//! outside the reported range.

use anyhow::Result;
use std::collections::HashMap;

use crate::entity::EntityRecord;
use crate::pipeline::{Advance, Phase, StreamHandler};

#[derive(Debug, Default)]
pub struct NodeRefHandler {
    refs: HashMap<i64, u8>,
    max_node_id: i64,
}

impl NodeRefHandler {
    /// Bucket `n` holds the number of node ids in `0..=max_node_id` that are
    /// referenced by exactly `n` ways (saturated at 255).
    pub fn histogram(&self) -> [u64; 256] {
        let mut buckets = [0u64; 256];
        buckets[0] = self.max_node_id.max(0) as u64 + 1;
        for (&id, &count) in &self.refs {
            if id < 0 || id > self.max_node_id {
                continue;
            }
            buckets[0] -= 1;
            buckets[count as usize] += 1;
        }
        buckets
    }
}

impl StreamHandler for NodeRefHandler {
    fn node(&mut self, entity: &EntityRecord) -> Result<Advance> {
        // sorted input, so the last id seen is the highest
        self.max_node_id = entity.id;
        Ok(Advance::Continue)
    }

    fn way(&mut self, entity: &EntityRecord) -> Result<Advance> {
        for &id in &entity.refs {
            let count = self.refs.entry(id).or_insert(0);
            *count = count.saturating_add(1);
        }
        Ok(Advance::Continue)
    }

    fn end_phase(&mut self, phase: Phase) -> Result<Advance> {
        if phase == Phase::Ways {
            for (count, nodes) in self.histogram().iter().enumerate() {
                println!("{count},{nodes}");
            }
            return Ok(Advance::Stop);
        }
        Ok(Advance::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::pipeline::feed;

    fn way_with_refs(id: i64, refs: Vec<i64>) -> EntityRecord {
        let mut entity = EntityRecord::new(EntityKind::Way, id);
        entity.refs = refs;
        entity
    }

    #[test]
    fn histogram_counts_references_and_untouched_ids() {
        let mut handler = NodeRefHandler::default();
        feed(
            [
                EntityRecord::new(EntityKind::Node, 1),
                EntityRecord::new(EntityKind::Node, 2),
                EntityRecord::new(EntityKind::Node, 3),
                way_with_refs(100, vec![1, 2]),
                way_with_refs(101, vec![2]),
            ],
            &mut handler,
        )
        .unwrap();
        let buckets = handler.histogram();
        // ids 0 and 3 are never referenced
        assert_eq!(buckets[0], 2);
        assert_eq!(buckets[1], 1);
        assert_eq!(buckets[2], 1);
        assert_eq!(buckets[3..].iter().sum::<u64>(), 0);
    }

    #[test]
    fn reference_counts_saturate() {
        let mut handler = NodeRefHandler::default();
        let mut records = vec![EntityRecord::new(EntityKind::Node, 1)];
        for i in 0..300 {
            records.push(way_with_refs(100 + i, vec![1]));
        }
        feed(records, &mut handler).unwrap();
        let buckets = handler.histogram();
        assert_eq!(buckets[255], 1);
    }

    #[test]
    fn references_beyond_the_node_phase_stay_out_of_range() {
        let mut handler = NodeRefHandler::default();
        feed(
            [
                EntityRecord::new(EntityKind::Node, 2),
                way_with_refs(100, vec![5]),
            ],
            &mut handler,
        )
        .unwrap();
        let buckets = handler.histogram();
        assert_eq!(buckets[0], 3);
        assert_eq!(buckets[1..].iter().sum::<u64>(), 0);
    }
}
