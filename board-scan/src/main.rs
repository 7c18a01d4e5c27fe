use std::cell::RefCell;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use image::DynamicImage;
use tracing::info;
use tracing_subscriber::EnvFilter;

use transport_board::board::{parse_date, Direction};
use transport_board::display::print_board;
use transport_board::imaging::{preprocess, preprocess_region, GridSpec, PreprocessOptions};
use transport_board::ocr::{import_board_cells, import_board_photo, OcrImportOptions};
use transport_board::Settings;

const USAGE: &str = "usage: board-scan [--cells] [--invert] [--date YYYY-MM-DD] [--go|--back] [--save-processed DIR] PHOTO...";

struct Args {
    photos: Vec<PathBuf>,
    cells: bool,
    invert: bool,
    date: Option<NaiveDate>,
    direction: Option<Direction>,
    save_processed: Option<PathBuf>,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args {
        photos: Vec::new(),
        cells: false,
        invert: false,
        date: None,
        direction: None,
        save_processed: None,
    };
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--cells" => args.cells = true,
            "--invert" => args.invert = true,
            "--go" => args.direction = Some(Direction::Outbound),
            "--back" => args.direction = Some(Direction::Inbound),
            "--date" => {
                let value = iter.next().context("--date needs a value")?;
                args.date = Some(parse_date(value).with_context(|| format!("invalid date `{}`", value))?);
            }
            "--save-processed" => {
                args.save_processed = Some(PathBuf::from(iter.next().context("--save-processed needs a directory")?));
            }
            flag if flag.starts_with("--") => bail!("unknown option `{}`\n{}", flag, USAGE),
            photo => args.photos.push(PathBuf::from(photo)),
        }
    }
    if args.photos.is_empty() {
        bail!("no photo given\n{}", USAGE);
    }
    Ok(args)
}

/// Writes the binarized images the recognizer will see
fn save_processed(
    dir: &Path,
    photo_path: &Path,
    photo: &DynamicImage,
    grid: Option<&GridSpec>,
    options: &PreprocessOptions,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    let stem = photo_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string());

    match grid {
        Some(grid) => {
            for (i, rect) in grid.cell_rects(photo.width(), photo.height())?.into_iter().enumerate() {
                let processed = preprocess_region(photo, rect, options)?;
                let path = dir.join(format!("{}_cell{}.png", stem, i + 1));
                processed.image.save(&path)?;
                info!(path = %path.display(), threshold = processed.threshold, "saved cell");
            }
        }
        None => {
            let processed = preprocess(photo, options)?;
            let path = dir.join(format!("{}_processed.png", stem));
            processed.image.save(&path)?;
            info!(path = %path.display(), threshold = processed.threshold, "saved processed photo");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let raw: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    let settings = Settings::from_env();
    let file = settings.state_file();
    let recognizer = settings.recognizer();
    let mut options: OcrImportOptions = settings.ocr_options();
    options.preprocess.invert = args.invert;

    let handle = RefCell::new(file.load_store(Local::now().date_naive()));
    let (scope, grid) = {
        let store = handle.borrow();
        let selection = store.selection();
        let scope = store.scope(
            args.date.unwrap_or(selection.date),
            args.direction.unwrap_or(selection.direction),
        );
        (scope, store.prefs().grid.clone())
    };

    println!("Scanning {} photo(s) into {}...", args.photos.len(), scope);
    for path in &args.photos {
        let photo = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;

        if let Some(dir) = &args.save_processed {
            let cell_grid = if args.cells { Some(&grid) } else { None };
            save_processed(dir, path, &photo, cell_grid, &options.preprocess)?;
        }

        let result = if args.cells {
            import_board_cells(&handle, &recognizer, &photo, &grid, scope, &options).await
        } else {
            import_board_photo(&handle, &recognizer, &photo, scope, &options).await
        };
        // Cells read before a failure are kept, so save either way
        file.save_store(&handle.borrow())?;

        match result {
            Ok(report) => println!(
                "{}: {} names into {} vehicles ({} new students)",
                path.display(),
                report.names_assigned,
                report.vehicles_touched.len(),
                report.students_created
            ),
            Err(e) => bail!("{}: {}\n  {}", path.display(), e.status_message(), e),
        }
    }

    print_board(&handle.borrow(), scope);
    println!("Done.");
    Ok(())
}
