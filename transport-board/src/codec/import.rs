use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Schema;
use crate::board::{parse_date, AssignmentStore, Direction, Scope, VehicleId};

/// Outcome of one CSV import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub schema: Option<Schema>,
    pub rows_read: usize,
    pub imported: usize,
    pub skipped: usize,
    pub students_created: usize,
    pub vehicles_renamed: Vec<(VehicleId, String)>,
}

/// Schema and header presence, judged from the first field of the file
fn detect_schema(first_field: &str) -> (Schema, bool) {
    let field = first_field.trim();
    if field.contains("日付") || field.eq_ignore_ascii_case("date") {
        (Schema::Full, true)
    } else if field.contains("車両") || field.eq_ignore_ascii_case("vehicle") {
        (Schema::Compact, true)
    } else if parse_date(field).is_some() {
        (Schema::Full, false)
    } else {
        (Schema::Compact, false)
    }
}

/// One data row after schema mapping
struct Row<'a> {
    date: &'a str,
    direction: &'a str,
    vehicle: &'a str,
    name: &'a str,
    group: &'a str,
    pickup: &'a str,
}

impl<'a> Row<'a> {
    fn from_record(record: &'a StringRecord, schema: Schema) -> Option<Self> {
        let field = move |i: usize| record.get(i).unwrap_or("");
        let (date, direction, offset) = match schema {
            Schema::Full => (field(0), field(1), 2),
            Schema::Compact => ("", "", 0),
        };
        // Rows too short to carry a name are incomplete
        if record.len() <= offset + 1 {
            return None;
        }
        Some(Row {
            date,
            direction,
            vehicle: field(offset),
            name: field(offset + 1),
            group: field(offset + 2),
            pickup: field(offset + 3),
        })
    }
}

/// Imports CSV text into the store.
///
/// Compact rows land in `active`; full rows carry their own date and
/// direction. Malformed rows are skipped and counted, never reported as errors.
/// Every line is parsed on its own, so a quote left open cannot pull the
/// following rows into one field.
pub fn import_csv(store: &mut AssignmentStore, text: &str, active: Scope) -> ImportSummary {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut summary = ImportSummary::default();
    let mut detected_schema = None;

    for (line, raw) in text.lines().enumerate() {
        let record = match parse_line(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line + 1, error = %e, "skipping unreadable CSV row");
                summary.skipped += 1;
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let schema = match detected_schema {
            Some(s) => s,
            None => {
                let (detected, has_header) = detect_schema(record.get(0).unwrap_or(""));
                debug!(?detected, has_header, "CSV schema detected");
                detected_schema = Some(detected);
                summary.schema = Some(detected);
                if has_header {
                    continue;
                }
                detected
            }
        };

        summary.rows_read += 1;
        match import_row(store, &record, schema, active, &mut summary) {
            Some(()) => summary.imported += 1,
            None => summary.skipped += 1,
        }
    }

    info!(
        rows = summary.rows_read,
        imported = summary.imported,
        skipped = summary.skipped,
        created = summary.students_created,
        "CSV import finished"
    );
    summary
}

/// Reads a single line as one record. A quote left open ends at the line end.
fn parse_line(line: &str) -> Result<StringRecord, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::None)
        .from_reader(line.as_bytes());
    let mut record = StringRecord::new();
    reader.read_record(&mut record)?;
    Ok(record)
}

fn import_row(
    store: &mut AssignmentStore,
    record: &StringRecord,
    schema: Schema,
    active: Scope,
    summary: &mut ImportSummary,
) -> Option<()> {
    let row = Row::from_record(record, schema)?;

    let date = if row.date.trim().is_empty() {
        active.date
    } else {
        match parse_date(row.date) {
            Some(d) => d,
            None => {
                warn!(date = row.date, "skipping row with unparseable date");
                return None;
            }
        }
    };
    let direction = match schema {
        Schema::Compact => active.direction,
        Schema::Full if row.direction.trim().is_empty() => active.direction,
        Schema::Full => Direction::from_label(row.direction).unwrap_or(Direction::Inbound),
    };
    let scope = store.ensure_scope(Scope::new(date, direction));

    if row.name.is_empty() {
        return None;
    }

    let (id, created) = store.ensure_student(row.name, row.group);
    if created {
        summary.students_created += 1;
    } else if !row.group.is_empty() {
        store.set_student_group(&id, row.group).ok()?;
    }

    let (vehicle, renamed) = store.resolve_import_vehicle(row.vehicle);
    if renamed {
        summary.vehicles_renamed.push((vehicle, row.vehicle.to_string()));
    }

    store.assign(scope, &id, vehicle, row.pickup).ok()
}
