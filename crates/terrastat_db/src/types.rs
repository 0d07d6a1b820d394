//! Dimension and fact types stored per project.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Dimension ids
// ============================================================================

/// Id assigned to a (shapefile, field) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneFieldId(pub i32);

/// Id assigned to a (zone field, zone name) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub i32);

impl fmt::Display for ZoneFieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Dimension keys
// ============================================================================

/// Natural key of the zone field dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneFieldKey {
    pub shapefile: String,
    pub field: String,
}

impl ZoneFieldKey {
    pub fn new(shapefile: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            shapefile: shapefile.into(),
            field: field.into(),
        }
    }
}

/// Natural key of the zone dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    pub zone_field_id: ZoneFieldId,
    pub name: String,
}

impl ZoneKey {
    pub fn new(zone_field_id: ZoneFieldId, name: impl Into<String>) -> Self {
        Self {
            zone_field_id,
            name: name.into(),
        }
    }
}

// ============================================================================
// Environmental index
// ============================================================================

/// Environmental index a statistic was computed from.
///
/// `code()` is the value persisted in `zonal_stats.index_code`. Codes are
/// assigned explicitly and must never be renumbered; new variants take new codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentalIndex {
    Ndvi,
    Evi,
    Ndwi5,
    Ndwi6,
    Savi,
    LstDay,
    LstNight,
    LstMean,
    Trmm,
    Eto,
}

impl EnvironmentalIndex {
    pub const ALL: [EnvironmentalIndex; 10] = [
        EnvironmentalIndex::Ndvi,
        EnvironmentalIndex::Evi,
        EnvironmentalIndex::Ndwi5,
        EnvironmentalIndex::Ndwi6,
        EnvironmentalIndex::Savi,
        EnvironmentalIndex::LstDay,
        EnvironmentalIndex::LstNight,
        EnvironmentalIndex::LstMean,
        EnvironmentalIndex::Trmm,
        EnvironmentalIndex::Eto,
    ];

    /// Stable storage code.
    pub fn code(self) -> i32 {
        match self {
            EnvironmentalIndex::Ndvi => 1,
            EnvironmentalIndex::Evi => 2,
            EnvironmentalIndex::Ndwi5 => 3,
            EnvironmentalIndex::Ndwi6 => 4,
            EnvironmentalIndex::Savi => 5,
            EnvironmentalIndex::LstDay => 6,
            EnvironmentalIndex::LstNight => 7,
            EnvironmentalIndex::LstMean => 8,
            EnvironmentalIndex::Trmm => 9,
            EnvironmentalIndex::Eto => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|index| index.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentalIndex::Ndvi => "ndvi",
            EnvironmentalIndex::Evi => "evi",
            EnvironmentalIndex::Ndwi5 => "ndwi5",
            EnvironmentalIndex::Ndwi6 => "ndwi6",
            EnvironmentalIndex::Savi => "savi",
            EnvironmentalIndex::LstDay => "lst_day",
            EnvironmentalIndex::LstNight => "lst_night",
            EnvironmentalIndex::LstMean => "lst_mean",
            EnvironmentalIndex::Trmm => "trmm",
            EnvironmentalIndex::Eto => "eto",
        }
    }
}

impl fmt::Display for EnvironmentalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentalIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|index| index.as_str() == wanted)
            .ok_or_else(|| format!("Unknown environmental index: {}", s))
    }
}

// ============================================================================
// Facts
// ============================================================================

/// Time/index part of a zonal statistic's key. The zone completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactKey {
    pub index: EnvironmentalIndex,
    pub year: i32,
    /// Day of year, 1..=366
    pub day: i32,
}

/// Aggregates of a raster inside one zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZonalStats {
    pub count: f64,
    pub sum: f64,
    pub mean: f64,
    pub stdev: f64,
}

/// One statistic addressed by natural keys; dimensions are resolved on write.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonalStatRecord {
    pub zone_field: ZoneFieldKey,
    pub zone: String,
    pub key: FactKey,
    pub stats: ZonalStats,
}
