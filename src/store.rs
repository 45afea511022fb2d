//! Node coordinate store for the way-length pass.
//!
//! Nodes precede ways in the stream, so one pass suffices: every node
//! coordinate is written during the node phase, the store is finalized at the
//! phase boundary, and ways read it afterwards. Two backends: an in-memory
//! map for regular extracts and a dense memory-mapped temp file for
//! planet-scale inputs (8 bytes per node id, coordinates as 1e-7 degree
//! fixed-point).

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use memmap2::{Mmap, MmapMut};
use std::collections::HashMap;
use std::path::Path;
use tempfile::NamedTempFile;

const SLOT_SIZE: usize = 8;
const SCALE_FACTOR: f64 = 10_000_000.0;

/// Bias added to the stored latitude so an occupied slot is never all zero
/// bits. Valid latitudes (±90°, fixed-point ±900_000_000) keep the biased
/// value inside i32 range, and a node at exactly (0.0, 0.0) stays
/// distinguishable from an empty slot.
const LAT_BIAS: i32 = 1_000_000_001;

/// Inputs at least this large default to the mmap-backed store.
const DENSE_THRESHOLD_BYTES: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheMode {
    Auto,
    Memory,
    Dense,
}

impl CacheMode {
    /// Resolves `Auto` to a concrete mode based on input file size.
    pub fn resolve(self, input: &Path) -> CacheMode {
        match self {
            CacheMode::Auto => {
                let file_size = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
                if file_size >= DENSE_THRESHOLD_BYTES {
                    CacheMode::Dense
                } else {
                    CacheMode::Memory
                }
            }
            mode => mode,
        }
    }
}

pub struct LocationStoreWriter {
    inner: WriterImpl,
}

pub struct LocationStoreReader {
    inner: ReaderImpl,
}

enum WriterImpl {
    Memory(HashMap<i64, (i32, i32)>),
    Dense {
        mmap: MmapMut,
        max_nodes: u64,
        temp_file: NamedTempFile,
    },
}

enum ReaderImpl {
    Memory(HashMap<i64, (i32, i32)>),
    Dense {
        mmap: Mmap,
        max_nodes: u64,
        /// File is deleted when this struct is dropped.
        _temp_file: NamedTempFile,
    },
}

fn to_fixed(degrees: f64) -> i32 {
    (degrees * SCALE_FACTOR) as i32
}

fn from_fixed(fixed: i32) -> f64 {
    fixed as f64 / SCALE_FACTOR
}

impl LocationStoreWriter {
    pub fn new_memory() -> Self {
        Self {
            inner: WriterImpl::Memory(HashMap::new()),
        }
    }

    /// Dense store backed by a sparse temp file sized for `max_nodes` slots.
    pub fn new_dense_temp(max_nodes: u64) -> Result<Self> {
        let temp_file = NamedTempFile::new()
            .context("LocationStore: Failed to create temporary dense cache file")?;
        let file_size = max_nodes
            .checked_mul(SLOT_SIZE as u64)
            .context("LocationStore: Dense cache size overflow")?;
        temp_file
            .as_file()
            .set_len(file_size)
            .context("LocationStore: Failed to set dense cache file length")?;

        // SAFETY: the file handle is exclusively owned by this struct and the
        // mapping stays valid for the lifetime of the NamedTempFile. Writes
        // happen on a single thread before the map is made read-only.
        let mmap = unsafe {
            MmapMut::map_mut(temp_file.as_file())
                .context("LocationStore: Failed to map dense cache file")?
        };

        Ok(Self {
            inner: WriterImpl::Dense {
                mmap,
                max_nodes,
                temp_file,
            },
        })
    }

    pub fn for_mode(mode: CacheMode, max_nodes: u64) -> Result<Self> {
        match mode {
            CacheMode::Memory => Ok(Self::new_memory()),
            CacheMode::Dense => Self::new_dense_temp(max_nodes),
            CacheMode::Auto => Err(anyhow!("LocationStore: Auto mode must be resolved first")),
        }
    }

    pub fn put(&mut self, id: i64, lat: f64, lon: f64) -> Result<()> {
        match &mut self.inner {
            WriterImpl::Memory(nodes) => {
                nodes.insert(id, (to_fixed(lat), to_fixed(lon)));
                Ok(())
            }
            WriterImpl::Dense {
                mmap, max_nodes, ..
            } => {
                if id < 0 || id as u64 >= *max_nodes {
                    return Err(anyhow!(
                        "LocationStore: Node id {} exceeds dense cache capacity of {} nodes",
                        id,
                        max_nodes
                    ));
                }
                let offset = id as usize * SLOT_SIZE;
                let lat = to_fixed(lat).saturating_add(LAT_BIAS);
                mmap[offset..offset + 4].copy_from_slice(&lat.to_le_bytes());
                mmap[offset + 4..offset + 8].copy_from_slice(&to_fixed(lon).to_le_bytes());
                Ok(())
            }
        }
    }

    pub fn finalize(self) -> Result<LocationStoreReader> {
        match self.inner {
            WriterImpl::Memory(nodes) => Ok(LocationStoreReader {
                inner: ReaderImpl::Memory(nodes),
            }),
            WriterImpl::Dense {
                mmap,
                max_nodes,
                temp_file,
            } => {
                mmap.flush()
                    .context("LocationStore: Failed to flush dense cache")?;
                let mmap = mmap
                    .make_read_only()
                    .context("LocationStore: Failed to remap dense cache read-only")?;
                Ok(LocationStoreReader {
                    inner: ReaderImpl::Dense {
                        mmap,
                        max_nodes,
                        _temp_file: temp_file,
                    },
                })
            }
        }
    }
}

impl LocationStoreReader {
    /// Returns (lat, lon) or `None` when the node was never recorded.
    pub fn get(&self, id: i64) -> Option<(f64, f64)> {
        match &self.inner {
            ReaderImpl::Memory(nodes) => nodes
                .get(&id)
                .map(|&(lat, lon)| (from_fixed(lat), from_fixed(lon))),
            ReaderImpl::Dense {
                mmap, max_nodes, ..
            } => {
                if id < 0 || id as u64 >= *max_nodes {
                    return None;
                }
                let offset = id as usize * SLOT_SIZE;
                let lat = i32::from_le_bytes(mmap[offset..offset + 4].try_into().ok()?);
                // An empty slot reads back as zero bits; occupied slots
                // carry the latitude bias and never do.
                if lat == 0 {
                    return None;
                }
                let lon = i32::from_le_bytes(mmap[offset + 4..offset + 8].try_into().ok()?);
                Some((from_fixed(lat - LAT_BIAS), from_fixed(lon)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let mut writer = LocationStoreWriter::new_memory();
        writer.put(42, 52.52, 13.405).unwrap();
        let reader = writer.finalize().unwrap();
        let (lat, lon) = reader.get(42).unwrap();
        assert!((lat - 52.52).abs() < 1e-6);
        assert!((lon - 13.405).abs() < 1e-6);
        assert!(reader.get(43).is_none());
    }

    #[test]
    fn dense_store_round_trips() {
        let mut writer = LocationStoreWriter::new_dense_temp(1_000).unwrap();
        writer.put(7, -33.86, 151.21).unwrap();
        writer.put(999, 52.52, 13.405).unwrap();
        let reader = writer.finalize().unwrap();
        let (lat, lon) = reader.get(7).unwrap();
        assert!((lat + 33.86).abs() < 1e-6);
        assert!((lon - 151.21).abs() < 1e-6);
        assert!(reader.get(8).is_none());
    }

    #[test]
    fn dense_store_keeps_null_island_node() {
        let mut writer = LocationStoreWriter::new_dense_temp(10).unwrap();
        writer.put(3, 0.0, 0.0).unwrap();
        let reader = writer.finalize().unwrap();
        assert_eq!(reader.get(3), Some((0.0, 0.0)));
        assert!(reader.get(4).is_none());
    }

    #[test]
    fn dense_store_rejects_out_of_range_ids() {
        let mut writer = LocationStoreWriter::new_dense_temp(10).unwrap();
        assert!(writer.put(10, 0.0, 0.0).is_err());
        assert!(writer.put(-1, 0.0, 0.0).is_err());
    }

    #[test]
    fn auto_mode_picks_memory_for_missing_file() {
        let mode = CacheMode::Auto.resolve(Path::new("/nonexistent.osm.pbf"));
        assert_eq!(mode, CacheMode::Memory);
    }
}
