use std::io::Write;

use geo::{Haversine, Length};
use geo_types::LineString;

pub struct ProgressCounter {
    label: &'static str,
    interval: u64,
    count: u64,
}

impl ProgressCounter {
    pub fn new(label: &'static str, interval: u64) -> Self {
        let counter = Self {
            label,
            interval: interval.max(1),
            count: 0,
        };
        counter.print(0);
        counter
    }

    pub fn inc(&mut self, delta: u64) {
        let prev = self.count;
        self.count += delta;
        // Print if we crossed an interval boundary
        if prev / self.interval < self.count / self.interval {
            self.print(self.count);
        }
    }

    pub fn finish(&self) {
        self.print(self.count);
        eprintln!();
    }

    fn print(&self, current: u64) {
        eprint!("\r{}: {}", self.label, current);
        let _ = std::io::stderr().flush();
    }
}

/// Great-circle length in meters along a (lat, lon) sequence.
pub fn haversine_length(coords: &[(f64, f64)]) -> f64 {
    if coords.len() < 2 {
        return 0.0;
    }
    let line: LineString<f64> = coords.iter().map(|&(lat, lon)| (lon, lat)).collect();
    Haversine.length(&line)
}
