//! Tag-driven classification with two rule disciplines.
//!
//! Road classification is a first-match cascade: the first of `highway`,
//! `waterway`, `railway`, `power` that is present decides the outcome, and a
//! present key with an unrecognized value consumes the way without selecting
//! a bucket. The POI cascade is the opposite discipline: every rule is
//! evaluated independently and one entity may increment several buckets.

use anyhow::{Context, Result};

use crate::entity::EntityRecord;
use crate::pipeline::{Advance, Phase, StreamHandler};
use crate::store::{LocationStoreReader, LocationStoreWriter};
use crate::utils::haversine_length;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadBucket {
    MotorwayTrunk,
    PrimarySecondary,
    OtherRoad,
    Residential,
    Path,
    River,
    Railway,
    PowerLine,
}

/// Outcome of the first-match road cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadCascade {
    Bucket(RoadBucket),
    /// A cascade key was present but its value selects no bucket; later keys
    /// and the POI cascade are not consulted.
    Consumed,
    /// No cascade key present; the way falls through to the POI cascade.
    NoMatch,
}

pub fn classify_road(entity: &EntityRecord) -> RoadCascade {
    if let Some(highway) = entity.tag("highway") {
        return match highway {
            "motorway" | "trunk" => RoadCascade::Bucket(RoadBucket::MotorwayTrunk),
            "primary" | "secondary" => RoadCascade::Bucket(RoadBucket::PrimarySecondary),
            "tertiary" | "unclassified" => RoadCascade::Bucket(RoadBucket::OtherRoad),
            "residential" => RoadCascade::Bucket(RoadBucket::Residential),
            "track" | "path" | "service" | "footway" | "cycleway" => {
                RoadCascade::Bucket(RoadBucket::Path)
            }
            _ => RoadCascade::Consumed,
        };
    }
    if let Some(waterway) = entity.tag("waterway") {
        return match waterway {
            "river" => RoadCascade::Bucket(RoadBucket::River),
            _ => RoadCascade::Consumed,
        };
    }
    if let Some(railway) = entity.tag("railway") {
        return match railway {
            "rail" | "light_rail" => RoadCascade::Bucket(RoadBucket::Railway),
            _ => RoadCascade::Consumed,
        };
    }
    if let Some(power) = entity.tag("power") {
        return match power {
            "line" | "minor_line" => RoadCascade::Bucket(RoadBucket::PowerLine),
            _ => RoadCascade::Consumed,
        };
    }
    RoadCascade::NoMatch
}

/// Length accumulators in meters; rendered as kilometers at report time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LengthBuckets {
    pub motorway_trunk: f64,
    pub primary_secondary: f64,
    pub other_road: f64,
    pub residential: f64,
    pub residential_named: f64,
    pub path: f64,
    pub river: f64,
    pub railway: f64,
    pub powerline: f64,
}

impl LengthBuckets {
    pub fn add(&mut self, bucket: RoadBucket, named: bool, length: f64) {
        match bucket {
            RoadBucket::MotorwayTrunk => self.motorway_trunk += length,
            RoadBucket::PrimarySecondary => self.primary_secondary += length,
            RoadBucket::OtherRoad => self.other_road += length,
            RoadBucket::Residential => {
                self.residential += length;
                if named {
                    self.residential_named += length;
                }
            }
            RoadBucket::Path => self.path += length,
            RoadBucket::River => self.river += length,
            RoadBucket::Railway => self.railway += length,
            RoadBucket::PowerLine => self.powerline += length,
        }
    }

    /// Share of residential road length that carries a name, in percent.
    /// Derived here rather than accumulated.
    pub fn residential_named_percent(&self) -> f64 {
        if self.residential > 0.0 {
            self.residential_named * 100.0 / self.residential
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PoiCounts {
    pub buildings: u64,
    pub housenumbers: u64,
    pub named_places: u64,
    pub green_landuse: u64,
    pub farmland: u64,
    pub builtup_landuse: u64,
    pub amenities: u64,
    pub shops: u64,
    pub tourism_spots: u64,
    pub bus_stops: u64,
    pub aerodromes: u64,
    pub rail_stations: u64,
    pub power_facilities: u64,
    pub woods: u64,
    pub waters: u64,
}

/// Independent-match cascade: every recognized tag increments its own bucket.
/// Returns whether any bucket fired.
pub fn classify_generic(entity: &EntityRecord, counts: &mut PoiCounts) -> bool {
    let mut fired = false;
    let mut hit = |counter: &mut u64| {
        *counter += 1;
        fired = true;
    };

    match entity.tag("landuse") {
        Some("forest") | Some("meadow") | Some("grass") | Some("orchard") | Some("vineyard") => {
            hit(&mut counts.green_landuse)
        }
        Some("farmland") | Some("farm") | Some("farmyard") => hit(&mut counts.farmland),
        Some("residential") | Some("industrial") | Some("commercial") | Some("retail") => {
            hit(&mut counts.builtup_landuse)
        }
        _ => {}
    }
    if entity.has_tag("amenity") {
        hit(&mut counts.amenities);
    }
    if entity.has_tag("shop") {
        hit(&mut counts.shops);
    }
    if entity.has_tag("tourism") {
        hit(&mut counts.tourism_spots);
    }
    if entity.tag("highway") == Some("bus_stop") {
        hit(&mut counts.bus_stops);
    }
    if entity.tag("aeroway") == Some("aerodrome") {
        hit(&mut counts.aerodromes);
    }
    if matches!(entity.tag("railway"), Some("station") | Some("halt")) {
        hit(&mut counts.rail_stations);
    }
    if matches!(
        entity.tag("power"),
        Some("station") | Some("generator") | Some("transformer")
    ) {
        hit(&mut counts.power_facilities);
    }
    match entity.tag("natural") {
        Some("wood") => hit(&mut counts.woods),
        Some("water") => hit(&mut counts.waters),
        _ => {}
    }

    fired
}

/// Streams nodes and ways, accumulating road lengths and POI counts. Node
/// coordinates are captured during the node phase so way lengths can be
/// resolved in the same pass.
pub struct StatsHandler {
    store_writer: Option<LocationStoreWriter>,
    store: Option<LocationStoreReader>,
    pub lengths: LengthBuckets,
    pub counts: PoiCounts,
}

impl StatsHandler {
    pub fn new(store_writer: LocationStoreWriter) -> Self {
        Self {
            store_writer: Some(store_writer),
            store: None,
            lengths: LengthBuckets::default(),
            counts: PoiCounts::default(),
        }
    }

    fn way_length(&self, refs: &[i64]) -> f64 {
        let Some(store) = &self.store else {
            return 0.0;
        };
        // Nodes the store never saw are skipped, shortening the way.
        let coords: Vec<(f64, f64)> = refs.iter().filter_map(|&id| store.get(id)).collect();
        haversine_length(&coords)
    }

    fn classify_node(&mut self, entity: &EntityRecord) {
        if entity.has_tag("place") && entity.has_tag("name") {
            self.counts.named_places += 1;
            return;
        }
        let fired = classify_generic(entity, &mut self.counts);
        if !fired && entity.has_tag("addr:housenumber") {
            self.counts.housenumbers += 1;
        }
    }

    fn classify_way(&mut self, entity: &EntityRecord) {
        match classify_road(entity) {
            RoadCascade::Bucket(bucket) => {
                let length = self.way_length(&entity.refs);
                self.lengths.add(bucket, entity.has_tag("name"), length);
            }
            RoadCascade::Consumed => {}
            RoadCascade::NoMatch => {
                self.classify_tagged_area(entity);
            }
        }
    }

    fn classify_tagged_area(&mut self, entity: &EntityRecord) {
        if entity.has_tag("building") {
            self.counts.buildings += 1;
        }
        if entity.has_tag("addr_housenumber") {
            self.counts.housenumbers += 1;
        }
        classify_generic(entity, &mut self.counts);
    }

    pub fn report(&self) {
        let km = |meters: f64| meters / 1000.0;
        println!(
            "motorways and trunk roads ....... {:5.0} km",
            km(self.lengths.motorway_trunk)
        );
        println!(
            "primary and secondary roads ..... {:5.0} km",
            km(self.lengths.primary_secondary)
        );
        println!(
            "other connecting roads .......... {:5.0} km",
            km(self.lengths.other_road)
        );
        println!(
            "residential roads ............... {:5.0} km",
            km(self.lengths.residential)
        );
        println!(
            "   thereof, with names .......... {:5.0}%",
            self.lengths.residential_named_percent()
        );
        println!(
            "tracks, service ways, paths ..... {:5.0} km",
            km(self.lengths.path)
        );
        println!(
            "rivers .......................... {:5.0} km",
            km(self.lengths.river)
        );
        println!(
            "railways ........................ {:5.0} km",
            km(self.lengths.railway)
        );
        println!(
            "power lines ..................... {:5.0} km",
            km(self.lengths.powerline)
        );
        println!();
        println!("buildings ....................... {:5}", self.counts.buildings);
        println!("house numbers ................... {:5}", self.counts.housenumbers);
        println!("named places .................... {:5}", self.counts.named_places);
        println!("green landuse ................... {:5}", self.counts.green_landuse);
        println!("farmland ........................ {:5}", self.counts.farmland);
        println!("built-up landuse ................ {:5}", self.counts.builtup_landuse);
        println!("amenities ....................... {:5}", self.counts.amenities);
        println!("shops ........................... {:5}", self.counts.shops);
        println!("tourism ......................... {:5}", self.counts.tourism_spots);
        println!("bus stops ....................... {:5}", self.counts.bus_stops);
        println!("aerodromes ...................... {:5}", self.counts.aerodromes);
        println!("railway stations ................ {:5}", self.counts.rail_stations);
        println!("power facilities ................ {:5}", self.counts.power_facilities);
        println!("natural woods ................... {:5}", self.counts.woods);
        println!("natural waters .................. {:5}", self.counts.waters);
    }
}

impl StreamHandler for StatsHandler {
    fn node(&mut self, entity: &EntityRecord) -> Result<Advance> {
        if let (Some(writer), Some((lat, lon))) = (&mut self.store_writer, entity.coord) {
            writer
                .put(entity.id, lat, lon)
                .context("Stats: Failed to record node location")?;
        }
        self.classify_node(entity);
        Ok(Advance::Continue)
    }

    fn way(&mut self, entity: &EntityRecord) -> Result<Advance> {
        self.classify_way(entity);
        Ok(Advance::Continue)
    }

    fn area(&mut self, entity: &EntityRecord) -> Result<Advance> {
        self.classify_tagged_area(entity);
        Ok(Advance::Continue)
    }

    fn end_phase(&mut self, phase: Phase) -> Result<Advance> {
        match phase {
            Phase::Nodes => {
                if let Some(writer) = self.store_writer.take() {
                    self.store = Some(
                        writer
                            .finalize()
                            .context("Stats: Failed to finalize location store")?,
                    );
                }
                Ok(Advance::Continue)
            }
            // Relations carry nothing this report needs.
            Phase::Ways => Ok(Advance::Stop),
            Phase::Relations => Ok(Advance::Continue),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.report();
        Ok(())
    }
}
