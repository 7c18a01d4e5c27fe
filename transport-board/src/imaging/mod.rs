pub mod preprocess;
pub mod grid;

pub use preprocess::{
    binarize, decode_image, encode_png, grayscale, luminance, otsu_threshold, preprocess, preprocess_region, CropRect,
    Histogram, PreprocessOptions, Preprocessed, DEFAULT_SCALE,
};
pub use grid::{GridSpec, GRID_COLUMNS, GRID_ROWS};
