use csv::{QuoteStyle, Terminator, WriterBuilder};

use super::{Schema, COMPACT_HEADER, FULL_HEADER};
use crate::board::{format_date, AssignmentStore, Scope};

/// Serializes one scope as CSV.
///
/// Only enabled vehicles are written, in vehicle order and then list order.
/// Every field is quoted.
pub fn export_csv(store: &AssignmentStore, scope: Scope, schema: Schema) -> Result<String, csv::Error> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    match schema {
        Schema::Full => wtr.write_record(FULL_HEADER)?,
        Schema::Compact => wtr.write_record(COMPACT_HEADER)?,
    }

    let scope = store.scope(scope.date, scope.direction);
    let board = store.board(scope);
    let date = format_date(scope.date);

    for (vehicle, slot) in store.enabled_vehicles() {
        for assignment in board.lane(vehicle) {
            let (name, group) = store
                .student(&assignment.student_id)
                .map(|s| (s.name.as_str(), s.group.as_str()))
                .unwrap_or(("", ""));
            match schema {
                Schema::Full => wtr.write_record([
                    date.as_str(),
                    scope.direction.label(),
                    slot.name.as_str(),
                    name,
                    group,
                    assignment.pickup.as_str(),
                ])?,
                Schema::Compact => wtr.write_record([slot.name.as_str(), name, group, assignment.pickup.as_str()])?,
            }
        }
    }

    wtr.flush()?;
    let bytes = wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Suggested download name, e.g. `送迎_2025-01-10_go.csv`
pub fn export_file_name(scope: Scope) -> String {
    format!("送迎_{}_{}.csv", format_date(scope.date), scope.direction.key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Direction, VehicleId};
    use chrono::NaiveDate;

    fn setup() -> (AssignmentStore, Scope) {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let mut store = AssignmentStore::new(today);
        let scope = Scope::new(today, Direction::Outbound);
        let a = store.add_student("山田 \"やま\" 太郎", "赤").unwrap();
        let b = store.add_student("佐藤", "青").unwrap();
        store.assign(scope, &b, VehicleId::from_ordinal(2).unwrap(), "15:30").unwrap();
        store.assign(scope, &a, VehicleId::FIRST, "").unwrap();
        (store, scope)
    }

    #[test]
    fn test_full_export_quotes_every_field() {
        let (store, scope) = setup();
        let csv = export_csv(&store, scope, Schema::Full).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], r#""日付","便","車両","氏名","所属","ピックアップ""#);
        assert_eq!(lines[1], r#""2025-01-10","行き","車1","山田 ""やま"" 太郎","赤","""#);
        assert_eq!(lines[2], r#""2025-01-10","行き","車2","佐藤","青","15:30""#);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_disabled_vehicles_are_not_exported() {
        let (mut store, scope) = setup();
        store.set_vehicle_enabled(VehicleId::FIRST, false);
        let csv = export_csv(&store, scope, Schema::Compact).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec![r#""車両","氏名","所属","ピックアップ""#, r#""車2","佐藤","青","15:30""#]);
    }

    #[test]
    fn test_file_name() {
        let scope = Scope::new(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(), Direction::Inbound);
        assert_eq!(export_file_name(scope), "送迎_2025-01-10_back.csv");
    }
}
