use std::fmt;

use chrono::NaiveDate;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of vehicle slots on every board
pub const VEHICLE_COUNT: usize = 8;

/// Prefix of the default vehicle names (`車1` .. `車8`)
pub const DEFAULT_VEHICLE_PREFIX: &str = "車";

/// Opaque student identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    /// Generates a fresh random id
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(7)
            .map(char::from)
            .collect();
        StudentId(id.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StudentId {
    fn from(value: &str) -> Self {
        StudentId(value.to_string())
    }
}

impl From<String> for StudentId {
    fn from(value: String) -> Self {
        StudentId(value)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A person who rides the vehicles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    #[serde(default)]
    pub group: String,
}

/// A facility-wide label used to color students
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub color: String,
}

impl Group {
    pub fn new(name: &str, color: &str) -> Self {
        Group {
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

/// One of the eight fixed vehicles, identified by its 1-based ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct VehicleId(u8);

impl VehicleId {
    pub const FIRST: VehicleId = VehicleId(1);

    /// Returns the vehicle for an ordinal in `1..=8`
    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        if (1..=VEHICLE_COUNT as u32).contains(&ordinal) {
            Some(VehicleId(ordinal as u8))
        } else {
            None
        }
    }

    /// Returns the vehicle at a zero-based position
    pub fn from_index(index: usize) -> Option<Self> {
        Self::from_ordinal(index as u32 + 1)
    }

    pub fn ordinal(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// All vehicles in board order
    pub fn all() -> impl Iterator<Item = VehicleId> {
        (1..=VEHICLE_COUNT as u8).map(VehicleId)
    }

    /// Name a vehicle carries until someone renames it
    pub fn default_name(self) -> String {
        format!("{}{}", DEFAULT_VEHICLE_PREFIX, self.0)
    }
}

impl TryFrom<u8> for VehicleId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        VehicleId::from_ordinal(value as u32).ok_or_else(|| format!("vehicle ordinal {} is out of range", value))
    }
}

impl From<VehicleId> for u8 {
    fn from(value: VehicleId) -> Self {
        value.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Mutable presentation state of a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSlot {
    pub name: String,
    pub enabled: bool,
}

impl VehicleSlot {
    /// True while the name still follows the `車N` default pattern
    pub fn has_default_name(&self) -> bool {
        self.name.starts_with(DEFAULT_VEHICLE_PREFIX)
    }
}

/// Trip direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "go")]
    Outbound,
    #[serde(rename = "back")]
    Inbound,
}

impl Direction {
    /// Label used in CSV files
    pub fn label(self) -> &'static str {
        match self {
            Direction::Outbound => "行き",
            Direction::Inbound => "帰り",
        }
    }

    /// Short key used in file names and the persisted record
    pub fn key(self) -> &'static str {
        match self {
            Direction::Outbound => "go",
            Direction::Inbound => "back",
        }
    }

    /// Parses a CSV label or key
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "行き" | "go" | "outbound" => Some(Direction::Outbound),
            "帰り" | "back" | "inbound" => Some(Direction::Inbound),
            _ => None,
        }
    }
}

/// A pickup of one student in a vehicle list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub student_id: StudentId,
    #[serde(default)]
    pub pickup: String,
}

/// The (date, direction) pair every board operation works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub date: NaiveDate,
    pub direction: Direction,
}

impl Scope {
    pub fn new(date: NaiveDate, direction: Direction) -> Self {
        Scope { date, direction }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.direction.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_ordinals() {
        assert!(VehicleId::from_ordinal(0).is_none());
        assert!(VehicleId::from_ordinal(9).is_none());
        let v3 = VehicleId::from_ordinal(3).unwrap();
        assert_eq!(v3.index(), 2);
        assert_eq!(v3.default_name(), "車3");
        assert_eq!(VehicleId::all().count(), VEHICLE_COUNT);
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::from_label("行き"), Some(Direction::Outbound));
        assert_eq!(Direction::from_label(" back "), Some(Direction::Inbound));
        assert_eq!(Direction::from_label("?"), None);
        assert_eq!(serde_json::to_string(&Direction::Inbound).unwrap(), "\"back\"");
    }

    #[test]
    fn test_student_ids_are_distinct() {
        let a = StudentId::generate();
        let b = StudentId::generate();
        assert_eq!(a.as_str().len(), 7);
        assert_ne!(a, b);
    }
}
