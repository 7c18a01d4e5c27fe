pub mod types;
pub mod dates;
pub mod groups;
pub mod store;
pub mod handle;

pub use types::{
    Assignment, Direction, Group, Scope, Student, StudentId, VehicleId, VehicleSlot, DEFAULT_VEHICLE_PREFIX,
    VEHICLE_COUNT,
};
pub use dates::{format_date, parse_date, DateWindow, WINDOW_DAYS};
pub use groups::{default_groups, GroupCatalog, FALLBACK_COLOR};
pub use store::{AssignmentStore, Board, DayBoards, Preferences};
pub use handle::BoardHandle;
