use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::dates::DateWindow;
use super::groups::GroupCatalog;
use super::types::{
    Assignment, Direction, Group, Scope, Student, StudentId, VehicleId, VehicleSlot, VEHICLE_COUNT,
};
use crate::error::StoreError;
use crate::imaging::GridSpec;
use crate::persist::SavedState;

/// Assignment lists of the eight vehicles for one scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Board {
    lanes: [Vec<Assignment>; VEHICLE_COUNT],
}

impl Board {
    pub fn lane(&self, vehicle: VehicleId) -> &[Assignment] {
        &self.lanes[vehicle.index()]
    }

    /// Lanes in vehicle order
    pub fn lanes(&self) -> impl Iterator<Item = (VehicleId, &[Assignment])> {
        VehicleId::all().map(move |v| (v, self.lane(v)))
    }

    /// The vehicle a student rides in, if any
    pub fn vehicle_of(&self, student: &StudentId) -> Option<VehicleId> {
        self.lanes()
            .find(|(_, lane)| lane.iter().any(|a| &a.student_id == student))
            .map(|(v, _)| v)
    }

    pub fn contains(&self, student: &StudentId) -> bool {
        self.vehicle_of(student).is_some()
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_student(&mut self, student: &StudentId) -> bool {
        let before = self.len();
        for lane in self.lanes.iter_mut() {
            lane.retain(|a| &a.student_id != student);
        }
        self.len() != before
    }

    fn retain_students(&mut self, live: &HashSet<&StudentId>) -> usize {
        let before = self.len();
        for lane in self.lanes.iter_mut() {
            lane.retain(|a| live.contains(&a.student_id));
        }
        before - self.len()
    }
}

/// Outbound and inbound boards of one date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayBoards {
    #[serde(rename = "go")]
    pub outbound: Arc<Board>,
    #[serde(rename = "back")]
    pub inbound: Arc<Board>,
}

impl DayBoards {
    pub fn get(&self, direction: Direction) -> &Arc<Board> {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    fn get_mut(&mut self, direction: Direction) -> &mut Arc<Board> {
        match direction {
            Direction::Outbound => &mut self.outbound,
            Direction::Inbound => &mut self.inbound,
        }
    }
}

/// Layout preferences that travel with the saved state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub panel_width: u32,
    pub grid: GridSpec,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            panel_width: 360,
            grid: GridSpec::default(),
        }
    }
}

fn default_vehicles() -> [VehicleSlot; VEHICLE_COUNT] {
    std::array::from_fn(|i| VehicleSlot {
        name: format!("{}{}", super::types::DEFAULT_VEHICLE_PREFIX, i + 1),
        enabled: true,
    })
}

/// The single source of truth for students, settings and assignments.
///
/// Every board is held behind an `Arc`; a mutation copies a board only while
/// some reader still holds a snapshot of it, so snapshots handed out by
/// [`AssignmentStore::board`] never change underneath their holder.
#[derive(Debug, Clone)]
pub struct AssignmentStore {
    window: DateWindow,
    students: Vec<Student>,
    groups: GroupCatalog,
    vehicles: [VehicleSlot; VEHICLE_COUNT],
    by_date: BTreeMap<NaiveDate, DayBoards>,
    selection: Scope,
    prefs: Preferences,
}

impl AssignmentStore {
    /// Creates an empty board for `today` with default settings
    pub fn new(today: NaiveDate) -> Self {
        let mut by_date = BTreeMap::new();
        by_date.insert(today, DayBoards::default());
        AssignmentStore {
            window: DateWindow::new(today),
            students: Vec::new(),
            groups: GroupCatalog::default(),
            vehicles: default_vehicles(),
            by_date,
            selection: Scope::new(today, Direction::Outbound),
            prefs: Preferences::default(),
        }
    }

    /// Rebuilds a store from persisted state, repairing anything that breaks
    /// the store invariants
    pub fn from_saved(saved: SavedState, today: NaiveDate) -> Self {
        let window = DateWindow::new(today);
        let mut store = AssignmentStore {
            window,
            students: saved.students,
            groups: GroupCatalog {
                groups: saved.groups,
                locked: saved.group_lock,
            },
            vehicles: saved.vehicles,
            by_date: saved.by_date,
            selection: Scope::new(window.clamp(saved.selected_date), saved.mode),
            prefs: Preferences {
                panel_width: saved.panel_width,
                grid: saved.grid,
            },
        };
        store.ensure_date(store.selection.date);

        let live: HashSet<&StudentId> = store.students.iter().map(|s| &s.id).collect();
        let mut dropped = 0;
        for day in store.by_date.values_mut() {
            for direction in [Direction::Outbound, Direction::Inbound] {
                let board = day.get_mut(direction);
                if board.lanes.iter().flatten().any(|a| !live.contains(&a.student_id)) {
                    dropped += Arc::make_mut(board).retain_students(&live);
                }
            }
        }
        if dropped > 0 {
            warn!(dropped, "removed assignments referencing unknown students");
        }
        store.recoerce_groups();
        store
    }

    /// Captures the full state for persistence
    pub fn to_saved(&self) -> SavedState {
        SavedState {
            students: self.students.clone(),
            groups: self.groups.groups.clone(),
            group_lock: self.groups.locked,
            vehicles: self.vehicles.clone(),
            panel_width: self.prefs.panel_width,
            grid: self.prefs.grid.clone(),
            by_date: self.by_date.clone(),
            selected_date: self.selection.date,
            mode: self.selection.direction,
        }
    }

    // ---- dates and selection

    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn today(&self) -> NaiveDate {
        self.window.today()
    }

    /// Clamps a scope's date into the window
    pub fn scope(&self, date: NaiveDate, direction: Direction) -> Scope {
        Scope::new(self.window.clamp(date), direction)
    }

    pub fn selection(&self) -> Scope {
        self.selection
    }

    /// Selects a date (clamped) and creates its boards if needed
    pub fn select_date(&mut self, date: NaiveDate) -> NaiveDate {
        let date = self.window.clamp(date);
        self.ensure_date(date);
        self.selection.date = date;
        date
    }

    /// Moves the selection by whole days
    pub fn shift_selection(&mut self, delta: i64) -> NaiveDate {
        let date = self.window.shift(self.selection.date, delta);
        self.select_date(date)
    }

    pub fn select_direction(&mut self, direction: Direction) {
        self.selection.direction = direction;
    }

    /// Dates that have boards, in calendar order
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.by_date.keys().copied()
    }

    /// Creates the boards of a scope if it has never been referenced
    pub fn ensure_scope(&mut self, scope: Scope) -> Scope {
        let scope = self.scope(scope.date, scope.direction);
        self.ensure_date(scope.date);
        scope
    }

    fn ensure_date(&mut self, date: NaiveDate) {
        self.by_date.entry(date).or_default();
    }

    // ---- boards

    /// Returns an immutable snapshot of a scope's board
    pub fn board(&self, scope: Scope) -> Arc<Board> {
        let scope = self.scope(scope.date, scope.direction);
        self.by_date
            .get(&scope.date)
            .map(|day| Arc::clone(day.get(scope.direction)))
            .unwrap_or_default()
    }

    fn board_mut(&mut self, scope: Scope) -> &mut Board {
        let scope = self.ensure_scope(scope);
        let day = self.by_date.entry(scope.date).or_default();
        Arc::make_mut(day.get_mut(scope.direction))
    }

    /// Places a student in a vehicle, removing them from any other vehicle of
    /// the same scope first
    pub fn assign(
        &mut self,
        scope: Scope,
        student: &StudentId,
        vehicle: VehicleId,
        pickup: &str,
    ) -> Result<(), StoreError> {
        if self.student(student).is_none() {
            return Err(StoreError::UnknownStudent(student.clone()));
        }
        let board = self.board_mut(scope);
        board.remove_student(student);
        board.lanes[vehicle.index()].push(Assignment {
            student_id: student.clone(),
            pickup: pickup.to_string(),
        });
        debug!(%scope, %student, %vehicle, "assigned");
        Ok(())
    }

    /// Takes a student off every vehicle of a scope
    pub fn unassign(&mut self, scope: Scope, student: &StudentId) -> bool {
        if !self.board(scope).contains(student) {
            return false;
        }
        self.board_mut(scope).remove_student(student)
    }

    /// Updates the pickup time of one assignment; returns false when the
    /// student is not in that vehicle
    pub fn update_pickup_time(
        &mut self,
        scope: Scope,
        vehicle: VehicleId,
        student: &StudentId,
        value: &str,
    ) -> bool {
        if !self.board(scope).lane(vehicle).iter().any(|a| &a.student_id == student) {
            return false;
        }
        let lane = &mut self.board_mut(scope).lanes[vehicle.index()];
        match lane.iter_mut().find(|a| &a.student_id == student) {
            Some(assignment) => {
                assignment.pickup = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Empties one vehicle list of a scope
    pub fn clear_vehicle(&mut self, scope: Scope, vehicle: VehicleId) {
        self.board_mut(scope).lanes[vehicle.index()].clear();
    }

    /// Empties every vehicle list of a scope
    pub fn clear_board(&mut self, scope: Scope) {
        *self.board_mut(scope) = Board::default();
    }

    // ---- students

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn student(&self, id: &StudentId) -> Option<&Student> {
        self.students.iter().find(|s| &s.id == id)
    }

    /// Exact-name lookup; two people sharing a name are the same student
    pub fn student_by_name(&self, name: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.name == name)
    }

    /// Students with no assignment in a scope, in roster order
    pub fn unassigned(&self, scope: Scope) -> Vec<&Student> {
        let board = self.board(scope);
        self.students.iter().filter(|s| !board.contains(&s.id)).collect()
    }

    /// Adds a student to the roster
    pub fn add_student(&mut self, name: &str, group: &str) -> Result<StudentId, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        Ok(self.insert_student(name, group))
    }

    /// Finds a student by exact name or creates one. Returns the id and
    /// whether the student was created.
    pub fn ensure_student(&mut self, name: &str, group: &str) -> (StudentId, bool) {
        match self.student_by_name(name) {
            Some(s) => (s.id.clone(), false),
            None => (self.insert_student(name, group), true),
        }
    }

    fn insert_student(&mut self, name: &str, group: &str) -> StudentId {
        let id = StudentId::generate();
        self.students.push(Student {
            id: id.clone(),
            name: name.to_string(),
            group: self.groups.coerce(group),
        });
        debug!(%id, name, "student created");
        id
    }

    pub fn set_student_group(&mut self, id: &StudentId, group: &str) -> Result<(), StoreError> {
        let coerced = self.groups.coerce(group);
        let student = self
            .students
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| StoreError::UnknownStudent(id.clone()))?;
        student.group = coerced;
        Ok(())
    }

    /// Removes a student and every assignment referencing them, across all
    /// dates and directions
    pub fn remove_student(&mut self, id: &StudentId) -> Result<Student, StoreError> {
        let pos = self
            .students
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| StoreError::UnknownStudent(id.clone()))?;
        let student = self.students.remove(pos);

        for day in self.by_date.values_mut() {
            for direction in [Direction::Outbound, Direction::Inbound] {
                let board = day.get_mut(direction);
                if board.contains(id) {
                    Arc::make_mut(board).remove_student(id);
                }
            }
        }
        Ok(student)
    }

    // ---- groups

    pub fn groups(&self) -> &GroupCatalog {
        &self.groups
    }

    pub fn set_group_lock(&mut self, locked: bool) {
        self.groups.locked = locked;
        self.recoerce_groups();
    }

    pub fn add_group(&mut self, name: &str, color: &str) -> Result<(), StoreError> {
        if self.groups.groups.iter().any(|g| g.name == name) {
            return Err(StoreError::DuplicateGroup(name.to_string()));
        }
        self.groups.groups.push(Group::new(name, color));
        Ok(())
    }

    /// Edits a group in place; students carrying the old name follow the rename
    pub fn update_group(&mut self, index: usize, name: &str, color: &str) -> Result<(), StoreError> {
        if index >= self.groups.groups.len() {
            return Err(StoreError::UnknownGroup(index));
        }
        // Group names are unique
        if self.groups.groups.iter().enumerate().any(|(i, g)| i != index && g.name == name) {
            return Err(StoreError::DuplicateGroup(name.to_string()));
        }
        let group = &mut self.groups.groups[index];
        let old = std::mem::replace(&mut group.name, name.to_string());
        group.color = color.to_string();
        if old != name {
            for student in self.students.iter_mut().filter(|s| s.group == old) {
                student.group = name.to_string();
            }
        }
        self.recoerce_groups();
        Ok(())
    }

    pub fn remove_group(&mut self, index: usize) -> Result<Group, StoreError> {
        if index >= self.groups.groups.len() {
            return Err(StoreError::UnknownGroup(index));
        }
        let removed = self.groups.groups.remove(index);
        self.recoerce_groups();
        Ok(removed)
    }

    fn recoerce_groups(&mut self) {
        if !self.groups.locked {
            return;
        }
        for student in self.students.iter_mut() {
            let coerced = self.groups.coerce(&student.group);
            if coerced != student.group {
                debug!(student = %student.id, from = %student.group, to = %coerced, "group coerced");
                student.group = coerced;
            }
        }
    }

    // ---- vehicles

    pub fn vehicles(&self) -> &[VehicleSlot; VEHICLE_COUNT] {
        &self.vehicles
    }

    pub fn vehicle(&self, id: VehicleId) -> &VehicleSlot {
        &self.vehicles[id.index()]
    }

    /// Enabled vehicles in board order
    pub fn enabled_vehicles(&self) -> impl Iterator<Item = (VehicleId, &VehicleSlot)> {
        VehicleId::all()
            .map(move |v| (v, self.vehicle(v)))
            .filter(|(_, slot)| slot.enabled)
    }

    pub fn rename_vehicle(&mut self, id: VehicleId, name: &str) {
        self.vehicles[id.index()].name = name.to_string();
    }

    pub fn set_vehicle_enabled(&mut self, id: VehicleId, enabled: bool) {
        self.vehicles[id.index()].enabled = enabled;
    }

    pub fn vehicle_by_name(&self, name: &str) -> Option<VehicleId> {
        VehicleId::all().find(|v| self.vehicle(*v).name == name)
    }

    /// Resolves an imported vehicle label. Unknown labels take over the first
    /// vehicle still carrying a default name (or the first vehicle), which is
    /// renamed to the label. Returns the vehicle and whether it was renamed.
    pub fn resolve_import_vehicle(&mut self, label: &str) -> (VehicleId, bool) {
        if let Some(v) = self.vehicle_by_name(label) {
            return (v, false);
        }
        let fallback = VehicleId::all()
            .find(|v| self.vehicle(*v).has_default_name())
            .unwrap_or(VehicleId::FIRST);
        if label.is_empty() {
            return (fallback, false);
        }
        warn!(vehicle = %fallback, from = %self.vehicle(fallback).name, to = label, "renaming vehicle for unmatched import label");
        self.rename_vehicle(fallback, label);
        (fallback, true)
    }

    // ---- preferences

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    pub fn set_panel_width(&mut self, width: u32) {
        self.prefs.panel_width = width;
    }

    pub fn set_grid(&mut self, grid: GridSpec) {
        self.prefs.grid = grid;
    }

    /// Wipes students, assignments, groups and vehicle names back to defaults
    pub fn reset_all(&mut self, confirmed: bool) -> Result<(), StoreError> {
        if !confirmed {
            return Err(StoreError::ResetNotConfirmed);
        }
        let prefs = self.prefs.clone();
        *self = AssignmentStore::new(self.today());
        self.prefs = prefs;
        warn!("board reset to defaults");
        Ok(())
    }
}
