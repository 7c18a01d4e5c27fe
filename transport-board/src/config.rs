use std::path::PathBuf;

use tracing::warn;

use crate::ocr::{OcrImportOptions, TesseractCli, DEFAULT_LANGUAGE, DEFAULT_PROGRAM};
use crate::persist::StateFile;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "data";

/// Runtime settings, read once at start-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `BOARD_DATA_DIR`
    pub data_dir: PathBuf,
    /// `BOARD_PORT`
    pub port: u16,
    /// `TESSERACT_BIN`
    pub tesseract_bin: String,
    /// `OCR_LANG`
    pub ocr_lang: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            port: DEFAULT_PORT,
            tesseract_bin: DEFAULT_PROGRAM.to_string(),
            ocr_lang: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset or blank keys keep defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Settings::default();

        if let Some(dir) = get("BOARD_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = get("BOARD_PORT") {
            match port.parse() {
                Ok(p) => settings.port = p,
                Err(_) => warn!(value = %port, "ignoring invalid BOARD_PORT"),
            }
        }
        if let Some(bin) = get("TESSERACT_BIN") {
            settings.tesseract_bin = bin;
        }
        if let Some(lang) = get("OCR_LANG") {
            settings.ocr_lang = lang;
        }
        settings
    }

    pub fn state_file(&self) -> StateFile {
        StateFile::in_dir(&self.data_dir)
    }

    pub fn recognizer(&self) -> TesseractCli {
        TesseractCli::new(self.tesseract_bin.clone())
    }

    pub fn ocr_options(&self) -> OcrImportOptions {
        OcrImportOptions {
            language: self.ocr_lang.clone(),
            ..OcrImportOptions::default()
        }
    }
}
