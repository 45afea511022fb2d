//! House-number census with address-range interpolation.
//!
//! The node phase records every `addr:housenumber` it sees into a
//! [`HouseNumberTable`]; the way phase resolves `addr:interpolation` ways
//! against it. Stream order (nodes before ways) is the only thing that makes
//! this sound; an out-of-order input degrades to missing-endpoint errors,
//! never to a crash.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::entity::EntityRecord;
use crate::pipeline::{Advance, Phase, StreamHandler};

/// Id-to-house-number correlation table. Write-once during the node phase,
/// read-only afterwards.
#[derive(Debug, Default)]
pub struct HouseNumberTable {
    numbers: HashMap<i64, u16>,
}

impl HouseNumberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the leading numeric prefix of a house-number tag. Text without
    /// a leading digit records nothing, so `lookup` keeps "no number" and a
    /// genuine house number 0 apart. Duplicate ids overwrite.
    pub fn record(&mut self, id: i64, text: &str) {
        if let Some(number) = leading_number(text) {
            self.numbers.insert(id, number);
        }
    }

    pub fn lookup(&self, id: i64) -> Option<u16> {
        self.numbers.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

/// Parses a leading run of ASCII digits, saturating at `u16::MAX`.
fn leading_number(text: &str) -> Option<u16> {
    let digits: &str = {
        let end = text
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        &text[..end]
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    for digit in digits.bytes() {
        value = value
            .saturating_mul(10)
            .saturating_add(u32::from(digit - b'0'));
        if value > u32::from(u16::MAX) {
            return Some(u16::MAX);
        }
    }
    Some(value as u16)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    Even,
    Odd,
    Both,
    All,
}

impl InterpolationMode {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "even" => Some(Self::Even),
            "odd" => Some(Self::Odd),
            "both" => Some(Self::Both),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Even => "even",
            Self::Odd => "odd",
            Self::Both => "both",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for InterpolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    #[error("endpoint without recorded house number (first known: {from_known}, last known: {to_known})")]
    MissingEndpoint { from_known: bool, to_known: bool },
    #[error("house numbers {low} and {high} do not satisfy addr:interpolation={mode}")]
    ParityMismatch {
        mode: InterpolationMode,
        low: u16,
        high: u16,
    },
    #[error("unrecognized interpolation mode '{0}'")]
    UnknownMode(String),
}

/// Number of addresses inferred between two endpoint house numbers.
///
/// Endpoints are ordered before use, so swapped inputs give the same result.
/// Tight spacing that would go negative is floored at zero and is not an
/// error. Intermediate nodes that carry their own `addr:housenumber` are
/// counted twice (once directly, once here); known limitation inherited from
/// the data model.
pub fn interpolate(
    mode: &str,
    from: Option<u16>,
    to: Option<u16>,
) -> Result<u64, InterpolationError> {
    let (Some(from), Some(to)) = (from, to) else {
        return Err(InterpolationError::MissingEndpoint {
            from_known: from.is_some(),
            to_known: to.is_some(),
        });
    };
    let mode = InterpolationMode::parse(mode)
        .ok_or_else(|| InterpolationError::UnknownMode(mode.to_string()))?;

    let low = from.min(to);
    let high = from.max(to);

    match mode {
        InterpolationMode::Even | InterpolationMode::Odd => {
            let wanted_odd = mode == InterpolationMode::Odd;
            if (low % 2 == 1) != wanted_odd || (high % 2 == 1) != wanted_odd {
                return Err(InterpolationError::ParityMismatch { mode, low, high });
            }
            Ok(u64::from((high - low) / 2).saturating_sub(1))
        }
        InterpolationMode::Both | InterpolationMode::All => {
            Ok(u64::from(high - low).saturating_sub(1))
        }
    }
}

/// Per-kind address counts with the tag refinements of the census report.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressCounts {
    pub overall: u64,
    pub with_street: u64,
    pub with_city: u64,
    pub with_postcode: u64,
    pub with_country: u64,
}

impl AddressCounts {
    fn observe(&mut self, entity: &EntityRecord) -> Option<String> {
        self.overall += 1;
        if entity.has_tag("addr:street") {
            self.with_street += 1;
        }
        if entity.has_tag("addr:city") {
            self.with_city += 1;
        }
        if entity.has_tag("addr:country") {
            self.with_country += 1;
        }
        if let Some(postcode) = entity.tag("addr:postcode") {
            self.with_postcode += 1;
            return Some(postcode.to_string());
        }
        None
    }
}

/// Streams nodes and ways, tallies house numbers and interpolation ranges,
/// and stops reading once the way phase ends.
pub struct AddressAudit {
    table: HouseNumberTable,
    pub nodes: AddressCounts,
    pub ways: AddressCounts,
    pub interpolation_ways: u64,
    pub interpolation_errors: u64,
    pub interpolated_numbers: u64,
    pub postcode_boundaries: u64,
    postcodes: HashSet<String>,
    debug: bool,
}

impl AddressAudit {
    pub fn new(debug: bool) -> Self {
        Self {
            table: HouseNumberTable::new(),
            nodes: AddressCounts::default(),
            ways: AddressCounts::default(),
            interpolation_ways: 0,
            interpolation_errors: 0,
            interpolated_numbers: 0,
            postcode_boundaries: 0,
            postcodes: HashSet::new(),
            debug,
        }
    }

    pub fn distinct_postcodes(&self) -> usize {
        self.postcodes.len()
    }

    pub fn grand_total(&self) -> u64 {
        self.interpolated_numbers + self.nodes.overall + self.ways.overall
    }

    fn resolve_interpolation(&mut self, entity: &EntityRecord, mode: &str) {
        self.interpolation_ways += 1;
        let first = entity.refs.first().copied();
        let last = entity.refs.last().copied();
        let from = first.and_then(|id| self.table.lookup(id));
        let to = last.and_then(|id| self.table.lookup(id));
        match interpolate(mode, from, to) {
            Ok(count) => self.interpolated_numbers += count,
            Err(error) => {
                self.interpolation_errors += 1;
                if self.debug {
                    tracing::debug!(
                        way = entity.id,
                        first = ?first,
                        last = ?last,
                        "interpolation ignored: {error}"
                    );
                }
            }
        }
    }

    fn report(&self) {
        println!("                      nodes      ways      total");
        let rows: [(&str, u64, u64); 5] = [
            ("with house number ", self.nodes.overall, self.ways.overall),
            (
                "... and street    ",
                self.nodes.with_street,
                self.ways.with_street,
            ),
            (
                "... and city      ",
                self.nodes.with_city,
                self.ways.with_city,
            ),
            (
                "... and post code ",
                self.nodes.with_postcode,
                self.ways.with_postcode,
            ),
            (
                "... and country   ",
                self.nodes.with_country,
                self.ways.with_country,
            ),
        ];
        for (label, nodes, ways) in rows {
            println!("{label}  {nodes:8}   {ways:8}   {:8}", nodes + ways);
        }
        println!(
            "\ntotal interpolations: {} ({} ignored)",
            self.interpolation_ways, self.interpolation_errors
        );
        println!(
            "\nhouse numbers added through interpolation: {}",
            self.interpolated_numbers
        );
        println!(
            "\ngrand total (interpolation, ways, nodes): {}",
            self.grand_total()
        );
        println!(
            "\nnumber of different post codes: {}",
            self.distinct_postcodes()
        );
        println!(
            "\nnumber of post code boundaries: {}",
            self.postcode_boundaries
        );
    }
}

impl StreamHandler for AddressAudit {
    fn node(&mut self, entity: &EntityRecord) -> Result<Advance> {
        if let Some(housenumber) = entity.tag("addr:housenumber") {
            self.table.record(entity.id, housenumber);
            if let Some(postcode) = self.nodes.observe(entity) {
                self.postcodes.insert(postcode);
            }
        }
        Ok(Advance::Continue)
    }

    fn way(&mut self, entity: &EntityRecord) -> Result<Advance> {
        if let Some(mode) = entity.tag("addr:interpolation") {
            self.resolve_interpolation(entity, mode);
        } else if entity.has_tag("addr:housenumber") {
            if let Some(postcode) = self.ways.observe(entity) {
                self.postcodes.insert(postcode);
            }
        } else if entity.tag("boundary") == Some("postal_code") {
            self.postcode_boundaries += 1;
            if let Some(reference) = entity.tag("ref") {
                self.postcodes.insert(reference.to_string());
            }
        }
        Ok(Advance::Continue)
    }

    fn end_phase(&mut self, phase: Phase) -> Result<Advance> {
        match phase {
            Phase::Nodes => {
                tracing::info!(
                    "Node phase done: {} house numbers recorded",
                    self.table.len()
                );
                Ok(Advance::Continue)
            }
            // Everything needed is in by now; relations are not read.
            Phase::Ways => {
                self.report();
                Ok(Advance::Stop)
            }
            Phase::Relations => Ok(Advance::Continue),
        }
    }
}
