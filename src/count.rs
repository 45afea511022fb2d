//! Plain per-kind entity counts, reported as each phase ends.

use anyhow::Result;

use crate::entity::EntityRecord;
use crate::pipeline::{Advance, Phase, StreamHandler};

#[derive(Debug, Default)]
pub struct CountHandler {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
}

impl StreamHandler for CountHandler {
    fn node(&mut self, _entity: &EntityRecord) -> Result<Advance> {
        self.nodes += 1;
        Ok(Advance::Continue)
    }

    fn way(&mut self, _entity: &EntityRecord) -> Result<Advance> {
        self.ways += 1;
        Ok(Advance::Continue)
    }

    fn relation(&mut self, _entity: &EntityRecord) -> Result<Advance> {
        self.relations += 1;
        Ok(Advance::Continue)
    }

    fn end_phase(&mut self, phase: Phase) -> Result<Advance> {
        match phase {
            Phase::Nodes => println!("nodes: {}", self.nodes),
            Phase::Ways => println!("ways: {}", self.ways),
            Phase::Relations => println!("relations: {}", self.relations),
        }
        Ok(Advance::Continue)
    }
}
