use serde::{Deserialize, Serialize};

use super::preprocess::CropRect;
use crate::error::ImagingError;

pub const GRID_COLUMNS: u32 = 4;
pub const GRID_ROWS: u32 = 2;

/// Percentage layout of the 4x2 vehicle grid on a board photo.
///
/// Margins are percentages of the image size. Gaps are percentages of the
/// interior left after the margins are removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub top: f64,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub col_gap: f64,
    pub row_gap: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        GridSpec {
            top: 5.0,
            left: 2.0,
            right: 2.0,
            bottom: 2.0,
            col_gap: 1.0,
            row_gap: 1.0,
        }
    }
}

impl GridSpec {
    pub fn validate(&self) -> Result<(), ImagingError> {
        let values = [self.top, self.left, self.right, self.bottom, self.col_gap, self.row_gap];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0 || *v >= 100.0) {
            return Err(ImagingError::InvalidGrid("percentages must be in [0, 100)".to_string()));
        }
        if self.left + self.right >= 100.0 || self.top + self.bottom >= 100.0 {
            return Err(ImagingError::InvalidGrid("margins cover the whole image".to_string()));
        }
        if self.col_gap * (GRID_COLUMNS - 1) as f64 >= 100.0 || self.row_gap * (GRID_ROWS - 1) as f64 >= 100.0 {
            return Err(ImagingError::InvalidGrid("gaps cover the whole interior".to_string()));
        }
        Ok(())
    }

    /// Cell rectangles for a `width x height` image, row-major, so cell `i`
    /// belongs to vehicle `i + 1`
    pub fn cell_rects(&self, width: u32, height: u32) -> Result<Vec<CropRect>, ImagingError> {
        self.validate()?;
        let (w, h) = (width as f64, height as f64);

        let x0 = w * self.left / 100.0;
        let y0 = h * self.top / 100.0;
        let inner_w = w - x0 - w * self.right / 100.0;
        let inner_h = h - y0 - h * self.bottom / 100.0;
        let gap_x = inner_w * self.col_gap / 100.0;
        let gap_y = inner_h * self.row_gap / 100.0;
        let cell_w = (inner_w - gap_x * (GRID_COLUMNS - 1) as f64) / GRID_COLUMNS as f64;
        let cell_h = (inner_h - gap_y * (GRID_ROWS - 1) as f64) / GRID_ROWS as f64;

        if cell_w < 1.0 || cell_h < 1.0 {
            return Err(ImagingError::InvalidGrid(format!(
                "cells would be {:.1}x{:.1} px on a {}x{} image",
                cell_w, cell_h, width, height
            )));
        }

        let mut cells = Vec::with_capacity((GRID_COLUMNS * GRID_ROWS) as usize);
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLUMNS {
                let x = x0 + col as f64 * (cell_w + gap_x);
                let y = y0 + row as f64 * (cell_h + gap_y);
                cells.push(CropRect::new(
                    x.round() as u32,
                    y.round() as u32,
                    cell_w.round() as u32,
                    cell_h.round() as u32,
                ));
            }
        }
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_margins() -> GridSpec {
        GridSpec {
            top: 0.0,
            left: 0.0,
            right: 0.0,
            bottom: 0.0,
            col_gap: 0.0,
            row_gap: 0.0,
        }
    }

    #[test]
    fn test_even_split_without_margins() {
        let cells = no_margins().cell_rects(1000, 500).unwrap();
        assert_eq!(cells.len(), 8);
        assert_eq!(cells[0], CropRect::new(0, 0, 250, 250));
        assert_eq!(cells[3], CropRect::new(750, 0, 250, 250));
        assert_eq!(cells[4], CropRect::new(0, 250, 250, 250));
    }

    #[test]
    fn test_margins_and_gaps() {
        let spec = GridSpec {
            top: 10.0,
            left: 10.0,
            right: 10.0,
            bottom: 10.0,
            col_gap: 5.0,
            row_gap: 5.0,
        };
        let cells = spec.cell_rects(1000, 600).unwrap();
        let xs: Vec<u32> = cells[..4].iter().map(|c| c.x).collect();
        assert_eq!(xs, vec![100, 310, 520, 730]);
        assert_eq!(cells[0].w, 170);
        assert_eq!(cells[0].y, 60);
        assert_eq!(cells[5].y, 312);
        assert_eq!(cells[5].h, 228);
    }

    #[test]
    fn test_rejects_impossible_layouts() {
        let spec = GridSpec {
            left: 60.0,
            right: 50.0,
            ..no_margins()
        };
        assert!(spec.cell_rects(100, 100).is_err());
        assert!(no_margins().cell_rects(3, 100).is_err());
        let negative = GridSpec {
            top: -1.0,
            ..no_margins()
        };
        assert!(negative.validate().is_err());
    }
}
