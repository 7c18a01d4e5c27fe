use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::board::VehicleId;

/// `車3`, `車 3` (marker first) or `3号車` (number first)
fn vehicle_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"車\s*(\d+)|(\d+)\s*号車").expect("vehicle token pattern is valid"))
}

/// Runs of whitespace, commas (ASCII, ideographic, full-width) and middle dots
fn name_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,、，・･]+").expect("separator pattern is valid"))
}

fn is_label_separator(c: char) -> bool {
    c == ':' || c == '：'
}

/// One recognized line that names a vehicle and at least one rider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub vehicle: VehicleId,
    pub names: Vec<String>,
}

/// The ordinal of the first vehicle token in a line, whatever its value
pub fn vehicle_ordinal(line: &str) -> Option<u32> {
    let caps = vehicle_token().captures(line)?;
    let digits = caps.get(1).or_else(|| caps.get(2))?;
    digits.as_str().parse().ok()
}

/// Splits text into rider names.
///
/// Text before a colon-like separator is treated as a label and dropped, and
/// vehicle tokens are removed before splitting.
pub fn name_candidates(text: &str) -> Vec<String> {
    let body = if text.contains(is_label_separator) {
        text.split(is_label_separator).skip(1).collect::<Vec<_>>().join(" ")
    } else {
        text.to_string()
    };
    let body = vehicle_token().replace_all(&body, " ");
    name_separator()
        .split(&body)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses one line of a whole-board recognition. Lines without a vehicle in
/// `1..=8` or without names yield `None`.
pub fn parse_line(line: &str) -> Option<LineEntry> {
    let ordinal = vehicle_ordinal(line)?;
    let vehicle = match VehicleId::from_ordinal(ordinal) {
        Some(v) => v,
        None => {
            debug!(line, ordinal, "vehicle ordinal out of range");
            return None;
        }
    };
    let names = name_candidates(line);
    if names.is_empty() {
        return None;
    }
    Some(LineEntry { vehicle, names })
}

/// Parses a whole-board recognition result, dropping lines that do not parse
pub fn parse_lines(text: &str) -> Vec<LineEntry> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let entry = parse_line(line);
            if entry.is_none() {
                debug!(line, "skipping unparseable line");
            }
            entry
        })
        .collect()
}

/// Names found in the text recognized from one grid cell
pub fn parse_cell(text: &str) -> Vec<String> {
    text.lines().flat_map(name_candidates).collect()
}
