use std::process::Stdio;

use async_trait::async_trait;
use image::GrayImage;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::RecognizeError;
use crate::imaging::encode_png;

pub const DEFAULT_LANGUAGE: &str = "jpn";
pub const DEFAULT_PROGRAM: &str = "tesseract";

/// Characters a board is expected to carry besides names: Latin letters,
/// digits, kanji numerals, vehicle markers, directions and separators
pub const DEFAULT_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789一二三四五六七八九十〇零号車行帰名・、,-:： 　";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizeOptions {
    /// Passed to the engine as a hint; `None` lets it emit anything
    pub char_whitelist: Option<String>,
}

impl Default for RecognizeOptions {
    fn default() -> Self {
        RecognizeOptions {
            char_whitelist: Some(DEFAULT_WHITELIST.to_string()),
        }
    }
}

/// Turns a preprocessed image into plain text
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(
        &self,
        image: &GrayImage,
        language: &str,
        options: &RecognizeOptions,
    ) -> Result<String, RecognizeError>;
}

/// Runs the `tesseract` command line tool, feeding a PNG on stdin
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: String,
}

impl TesseractCli {
    pub fn new(program: impl Into<String>) -> Self {
        TesseractCli {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        TesseractCli::new(DEFAULT_PROGRAM)
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    async fn recognize(
        &self,
        image: &GrayImage,
        language: &str,
        options: &RecognizeOptions,
    ) -> Result<String, RecognizeError> {
        let png = encode_png(image)?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("stdin").arg("stdout").arg("-l").arg(language);
        if let Some(whitelist) = &options.char_whitelist {
            cmd.arg("-c").arg(format!("tessedit_char_whitelist={}", whitelist));
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| RecognizeError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        debug!(program = %self.program, language, bytes = png.len(), "recognizer started");

        // Tesseract reads the whole image before writing anything
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RecognizeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_carry_whitelist() {
        let options = RecognizeOptions::default();
        let whitelist = options.char_whitelist.unwrap();
        for c in ['車', '号', '：', '、', '7'] {
            assert!(whitelist.contains(c));
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let cli = TesseractCli::new("definitely-not-a-real-recognizer-binary");
        let image = GrayImage::new(4, 4);
        let err = cli
            .recognize(&image, DEFAULT_LANGUAGE, &RecognizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizeError::Spawn { .. }));
    }
}
