pub mod parse;
pub mod recognizer;
pub mod import;

pub use parse::{name_candidates, parse_cell, parse_line, parse_lines, vehicle_ordinal, LineEntry};
pub use recognizer::{
    RecognizeOptions, TesseractCli, TextRecognizer, DEFAULT_LANGUAGE, DEFAULT_PROGRAM, DEFAULT_WHITELIST,
};
pub use import::{apply_lines, import_board_cells, import_board_photo, OcrImportOptions, OcrMode, OcrReport};
