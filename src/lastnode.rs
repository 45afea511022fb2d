//! Reports the highest node id in the input.

use anyhow::Result;

use crate::entity::EntityRecord;
use crate::pipeline::{Advance, Phase, StreamHandler};

/// Nodes arrive sorted by id, so the last one seen is the highest. Nothing
/// after the node phase is read.
#[derive(Debug, Default)]
pub struct LastNodeHandler {
    pub last_id: i64,
}

impl StreamHandler for LastNodeHandler {
    fn node(&mut self, entity: &EntityRecord) -> Result<Advance> {
        self.last_id = entity.id;
        Ok(Advance::Continue)
    }

    fn end_phase(&mut self, phase: Phase) -> Result<Advance> {
        if phase == Phase::Nodes {
            println!("{}", self.last_id);
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

    #[test]
    fn keeps_the_last_node_id() {
        let mut handler = LastNodeHandler::default();
        feed(
            [
                EntityRecord::new(EntityKind::Node, 3),
                EntityRecord::new(EntityKind::Node, 17),
                EntityRecord::new(EntityKind::Way, 99),
            ],
            &mut handler,
        )
        .unwrap();
        assert_eq!(handler.last_id, 17);
    }

    #[test]
    fn empty_stream_reports_zero() {
        let mut handler = LastNodeHandler::default();
        feed([], &mut handler).unwrap();
        assert_eq!(handler.last_id, 0);
    }
}
