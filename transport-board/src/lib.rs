//! Daily seat assignment board for a transport service: who rides which of
//! eight vehicles, per date and direction, with CSV exchange and photo import.

pub mod board;
pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod imaging;
pub mod ocr;
pub mod persist;
pub mod web;

pub use board::{AssignmentStore, BoardHandle, Direction, Scope, StudentId, VehicleId};
pub use config::Settings;
pub use error::{ImagingError, OcrError, PersistError, RecognizeError, StoreError};
