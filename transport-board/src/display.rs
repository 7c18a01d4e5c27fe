use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;

use crate::board::{AssignmentStore, Scope};

/// Formats a rider name with group tag
pub fn format_rider_name(group: &str, name: &str) -> String {
    if group.is_empty() {
        name.to_string()
    } else {
        format!("[{}] {}", group, name)
    }
}

/// Renders one scope as plain text: enabled vehicles in order, then the
/// students nobody picked up
pub fn render_board(store: &AssignmentStore, scope: Scope) -> String {
    let scope = store.scope(scope.date, scope.direction);
    let board = store.board(scope);
    let unassigned = store.unassigned(scope);
    let mut out = String::new();

    let _ = writeln!(out, "=== {} {} ===", scope.date.format("%Y-%m-%d"), scope.direction.label());
    let _ = writeln!(out, "Assigned: {}  Unassigned: {}", board.len(), unassigned.len());

    for (vehicle, slot) in store.enabled_vehicles() {
        let lane = board.lane(vehicle);
        let _ = writeln!(out, "\n{} ({})", slot.name, lane.len());
        if lane.is_empty() {
            let _ = writeln!(out, "  [EMPTY]");
        }
        for assignment in lane {
            let name = match store.student(&assignment.student_id) {
                Some(s) => format_rider_name(&s.group, &s.name),
                None => assignment.student_id.to_string(),
            };
            if assignment.pickup.is_empty() {
                let _ = writeln!(out, "  - {}", name);
            } else {
                let _ = writeln!(out, "  - {}  {}", name, assignment.pickup);
            }
        }
    }

    if !unassigned.is_empty() {
        let _ = writeln!(out, "\n⚠️  Unassigned ({}):", unassigned.len());
        for student in unassigned {
            let _ = writeln!(out, "  - {}", format_rider_name(&student.group, &student.name));
        }
    }
    out
}

/// Prints one scope to stdout
pub fn print_board(store: &AssignmentStore, scope: Scope) {
    println!("\n{}", render_board(store, scope));
}

/// Writes the rendered board to a file
pub fn write_board_to_file(store: &AssignmentStore, scope: Scope, filename: &str) -> std::io::Result<()> {
    let mut file = File::create(filename)?;
    file.write_all(render_board(store, scope).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Direction, VehicleId};
    use chrono::NaiveDate;

    #[test]
    fn test_render_lists_riders_and_unassigned() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let mut store = AssignmentStore::new(today);
        let scope = Scope::new(today, Direction::Inbound);
        let a = store.add_student("山田", "赤").unwrap();
        store.add_student("佐藤", "青").unwrap();
        store.assign(scope, &a, VehicleId::from_ordinal(2).unwrap(), "16:30").unwrap();
        store.set_vehicle_enabled(VehicleId::from_ordinal(8).unwrap(), false);

        let text = render_board(&store, scope);
        assert!(text.starts_with("=== 2025-06-15 帰り ===\nAssigned: 1  Unassigned: 1\n"));
        assert!(text.contains("\n車2 (1)\n  - [赤] 山田  16:30\n"));
        assert!(text.contains("  - [青] 佐藤\n"));
        assert!(!text.contains("車8"));
    }

    #[test]
    fn test_write_board_to_file() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let store = AssignmentStore::new(today);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.txt");
        write_board_to_file(&store, store.selection(), path.to_str().unwrap()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[EMPTY]"));
    }
}
