pub mod export;
pub mod import;

use serde::{Deserialize, Serialize};

pub use export::{export_csv, export_file_name};
pub use import::{import_csv, ImportSummary};

/// Header of the six-column file carrying its own date and direction
pub const FULL_HEADER: [&str; 6] = ["日付", "便", "車両", "氏名", "所属", "ピックアップ"];

/// Header of the four-column file imported into the active scope
pub const COMPACT_HEADER: [&str; 4] = ["車両", "氏名", "所属", "ピックアップ"];

/// CSV record shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    Full,
    Compact,
}
