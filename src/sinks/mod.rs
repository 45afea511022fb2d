use anyhow::Result;

pub mod jsonl;

pub use self::jsonl::JsonlSink;

use crate::entity::{EntityRecord, HeaderMeta};

/// Marker written into forwarded header metadata in place of whatever
/// generator produced the input.
pub const GENERATOR: &str = concat!("osmaudit/", env!("CARGO_PKG_VERSION"));

/// Receives matched entities, in stream order, untouched.
pub trait EntitySink: Send {
    fn header(&mut self, header: &HeaderMeta) -> Result<()>;
    fn entity(&mut self, entity: &EntityRecord) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}
