//! Sequential streaming driver.
//!
//! Reads a PBF blob by blob, converts each element into an [`EntityRecord`]
//! and dispatches it to a [`StreamHandler`]. The input is guaranteed to be
//! ordered nodes, then ways, then relations; the driver derives phase
//! boundaries from the element kinds and fires `end_phase` callbacks at each
//! transition. Handlers signal early stop with [`Advance::Stop`] instead of
//! unwinding, so a phase that has all the data it needs ends the read loop
//! cleanly.

use anyhow::{Context, Result};
use osmpbf::{BlobDecode, BlobReader, Element};
use std::path::Path;

use crate::entity::{EntityKind, EntityRecord, HeaderMeta};
use crate::utils::ProgressCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Nodes,
    Ways,
    Relations,
}

impl Phase {
    const ORDER: [Phase; 3] = [Phase::Nodes, Phase::Ways, Phase::Relations];

    fn of(kind: EntityKind) -> Phase {
        match kind {
            EntityKind::Node => Phase::Nodes,
            // Assembled areas arrive interleaved with or after ways.
            EntityKind::Way | EntityKind::Area => Phase::Ways,
            EntityKind::Relation => Phase::Relations,
        }
    }

    fn index(&self) -> usize {
        match self {
            Phase::Nodes => 0,
            Phase::Ways => 1,
            Phase::Relations => 2,
        }
    }
}

/// Whether the handler still needs entities from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Continue,
    Stop,
}

pub trait StreamHandler {
    fn header(&mut self, _header: &HeaderMeta) -> Result<()> {
        Ok(())
    }

    fn node(&mut self, _entity: &EntityRecord) -> Result<Advance> {
        Ok(Advance::Continue)
    }

    fn way(&mut self, _entity: &EntityRecord) -> Result<Advance> {
        Ok(Advance::Continue)
    }

    fn relation(&mut self, _entity: &EntityRecord) -> Result<Advance> {
        Ok(Advance::Continue)
    }

    /// Assembled polygon from an external area assembler. Never produced by
    /// the PBF driver itself.
    fn area(&mut self, _entity: &EntityRecord) -> Result<Advance> {
        Ok(Advance::Continue)
    }

    /// Called once per phase, after the last entity of that phase. Phases the
    /// stream skips entirely still get their callback, in order.
    fn end_phase(&mut self, _phase: Phase) -> Result<Advance> {
        Ok(Advance::Continue)
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Derives phase transitions from the kinds flowing past.
pub struct PhaseTracker {
    current: usize,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self { current: 0 }
    }

    /// Phases that ended before an entity of `kind` can be dispatched.
    pub fn observe(&mut self, kind: EntityKind) -> Vec<Phase> {
        let target = Phase::of(kind).index();
        let mut closed = Vec::new();
        while self.current < target {
            closed.push(Phase::ORDER[self.current]);
            self.current += 1;
        }
        closed
    }

    /// Phases still open when the stream ends.
    pub fn close_remaining(&mut self) -> Vec<Phase> {
        let mut closed = Vec::new();
        while self.current < Phase::ORDER.len() {
            closed.push(Phase::ORDER[self.current]);
            self.current += 1;
        }
        closed
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch<H: StreamHandler>(
    handler: &mut H,
    tracker: &mut PhaseTracker,
    entity: &EntityRecord,
) -> Result<Advance> {
    for phase in tracker.observe(entity.kind) {
        if handler.end_phase(phase)? == Advance::Stop {
            return Ok(Advance::Stop);
        }
    }
    match entity.kind {
        EntityKind::Node => handler.node(entity),
        EntityKind::Way => handler.way(entity),
        EntityKind::Relation => handler.relation(entity),
        EntityKind::Area => handler.area(entity),
    }
}

fn close_stream<H: StreamHandler>(handler: &mut H, tracker: &mut PhaseTracker) -> Result<()> {
    for phase in tracker.close_remaining() {
        if handler.end_phase(phase)? == Advance::Stop {
            break;
        }
    }
    handler.finish()
}

/// Runs one sequential pass over the file, feeding every entity to `handler`.
pub fn run_stream<H: StreamHandler>(
    path: &Path,
    handler: &mut H,
    label: &'static str,
) -> Result<()> {
    let reader = BlobReader::from_path(path)
        .with_context(|| format!("Pipeline: Failed to open {}", path.display()))?;
    let mut tracker = PhaseTracker::new();
    let mut progress = ProgressCounter::new(label, 500_000);
    let mut stopped = false;

    'blobs: for blob_result in reader {
        let blob = blob_result?;
        let block = match blob.decode() {
            Ok(BlobDecode::OsmHeader(header)) => {
                handler.header(&HeaderMeta::from_header(&header))?;
                continue;
            }
            Ok(BlobDecode::OsmData(block)) => block,
            Ok(BlobDecode::Unknown(unknown)) => {
                tracing::info!("Unknown blob: {}", unknown);
                continue;
            }
            Err(error) => return Err(error.into()),
        };

        for element in block.elements() {
            let record = match element {
                Element::Node(ref node) => EntityRecord::from_node(node),
                Element::DenseNode(ref node) => EntityRecord::from_dense_node(node),
                Element::Way(ref way) => EntityRecord::from_way(way),
                Element::Relation(ref relation) => EntityRecord::from_relation(relation),
            };
            progress.inc(1);
            if dispatch(handler, &mut tracker, &record)? == Advance::Stop {
                stopped = true;
                break 'blobs;
            }
        }
    }

    progress.finish();
    if stopped {
        tracing::debug!("Stream stopped early by handler");
        handler.finish()
    } else {
        close_stream(handler, &mut tracker)
    }
}

/// Test driver: runs the same phase bookkeeping as [`run_stream`] over
/// in-memory records.
#[cfg(test)]
pub fn feed<H, I>(records: I, handler: &mut H) -> Result<()>
where
    H: StreamHandler,
    I: IntoIterator<Item = EntityRecord>,
{
    let mut tracker = PhaseTracker::new();
    for record in records {
        if dispatch(handler, &mut tracker, &record)? == Advance::Stop {
            return handler.finish();
        }
    }
    close_stream(handler, &mut tracker)
}
