use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::parse::{parse_cell, parse_lines, LineEntry};
use super::recognizer::{RecognizeOptions, TextRecognizer, DEFAULT_LANGUAGE};
use crate::board::{AssignmentStore, BoardHandle, Scope, VehicleId};
use crate::error::OcrError;
use crate::imaging::{preprocess, preprocess_region, GridSpec, PreprocessOptions};

/// How a board photo is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Whole photo, one `車N: names` line per vehicle
    #[default]
    Lines,
    /// One crop per vehicle from the 4x2 grid
    Cells,
}

#[derive(Debug, Clone)]
pub struct OcrImportOptions {
    pub language: String,
    pub recognize: RecognizeOptions,
    pub preprocess: PreprocessOptions,
}

impl Default for OcrImportOptions {
    fn default() -> Self {
        OcrImportOptions {
            language: DEFAULT_LANGUAGE.to_string(),
            recognize: RecognizeOptions::default(),
            preprocess: PreprocessOptions::default(),
        }
    }
}

/// What a photo import did to the board
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OcrReport {
    pub mode: OcrMode,
    pub scope: Option<Scope>,
    /// Recognized lines (line mode) or cells (cell mode)
    pub segments: usize,
    /// Segments that produced at least one name
    pub segments_used: usize,
    pub vehicles_touched: Vec<VehicleId>,
    pub names_assigned: usize,
    pub students_created: usize,
}

impl OcrReport {
    fn touch(&mut self, vehicle: VehicleId) -> bool {
        if self.vehicles_touched.contains(&vehicle) {
            return false;
        }
        self.vehicles_touched.push(vehicle);
        true
    }
}

/// Adds names to the end of a vehicle list, creating students as needed
fn assign_names(
    store: &mut AssignmentStore,
    scope: Scope,
    vehicle: VehicleId,
    names: &[String],
    report: &mut OcrReport,
) {
    for name in names {
        let (id, created) = store.ensure_student(name, "");
        if created {
            report.students_created += 1;
        }
        match store.assign(scope, &id, vehicle, "") {
            Ok(()) => report.names_assigned += 1,
            Err(e) => warn!(name = %name, error = %e, "could not assign recognized name"),
        }
    }
}

/// Applies parsed lines; a vehicle is emptied the first time a line names it
pub fn apply_lines(store: &mut AssignmentStore, scope: Scope, entries: &[LineEntry], report: &mut OcrReport) {
    for entry in entries {
        if report.touch(entry.vehicle) {
            store.clear_vehicle(scope, entry.vehicle);
        }
        assign_names(store, scope, entry.vehicle, &entry.names, report);
    }
}

/// Reads a whole board photo and rewrites the vehicles it mentions.
///
/// Nothing is changed unless recognition succeeds. Vehicles no line mentions
/// keep their riders.
pub async fn import_board_photo<H, R>(
    handle: &H,
    recognizer: &R,
    photo: &DynamicImage,
    scope: Scope,
    options: &OcrImportOptions,
) -> Result<OcrReport, OcrError>
where
    H: BoardHandle,
    R: TextRecognizer + ?Sized,
{
    let scope = handle.update(|store| store.ensure_scope(scope));
    info!(%scope, width = photo.width(), height = photo.height(), "preprocessing board photo");
    let processed = preprocess(photo, &options.preprocess)?;

    info!(%scope, threshold = processed.threshold, "recognizing board text");
    let text = recognizer
        .recognize(&processed.image, &options.language, &options.recognize)
        .await?;

    let entries = parse_lines(&text);
    let mut report = OcrReport {
        mode: OcrMode::Lines,
        scope: Some(scope),
        segments: text.lines().filter(|l| !l.trim().is_empty()).count(),
        segments_used: entries.len(),
        ..OcrReport::default()
    };
    handle.update(|store| apply_lines(store, scope, &entries, &mut report));

    info!(
        %scope,
        lines = report.segments,
        used = report.segments_used,
        assigned = report.names_assigned,
        created = report.students_created,
        "board photo imported"
    );
    Ok(report)
}

/// Reads each grid cell of a board photo into its vehicle.
///
/// All eight vehicles are emptied before the first cell is read, so a second
/// run replaces the first. Cells are read one at a time; when one fails the
/// run stops and the cells already read stay applied.
pub async fn import_board_cells<H, R>(
    handle: &H,
    recognizer: &R,
    photo: &DynamicImage,
    grid: &GridSpec,
    scope: Scope,
    options: &OcrImportOptions,
) -> Result<OcrReport, OcrError>
where
    H: BoardHandle,
    R: TextRecognizer + ?Sized,
{
    let cells = grid.cell_rects(photo.width(), photo.height())?;
    let scope = handle.update(|store| {
        let scope = store.ensure_scope(scope);
        store.clear_board(scope);
        scope
    });

    let mut report = OcrReport {
        mode: OcrMode::Cells,
        scope: Some(scope),
        ..OcrReport::default()
    };
    let total = cells.len();

    for (n, (rect, vehicle)) in cells.into_iter().zip(VehicleId::all()).enumerate() {
        info!(%scope, %vehicle, cell = n + 1, total, "recognizing cell");
        let processed = preprocess_region(photo, rect, &options.preprocess)?;
        let text = recognizer
            .recognize(&processed.image, &options.language, &options.recognize)
            .await?;

        report.segments += 1;
        let names = parse_cell(&text);
        if names.is_empty() {
            continue;
        }
        report.segments_used += 1;
        report.touch(vehicle);
        handle.update(|store| assign_names(store, scope, vehicle, &names, &mut report));
    }

    info!(
        %scope,
        cells = report.segments,
        used = report.segments_used,
        assigned = report.names_assigned,
        created = report.students_created,
        "board cells imported"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Direction;
    use crate::error::RecognizeError;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use image::{GrayImage, RgbImage};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned outputs; `None` fails that call
    struct Scripted {
        outputs: Mutex<VecDeque<Option<String>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(outputs: &[Option<&str>]) -> Self {
            Scripted {
                outputs: Mutex::new(outputs.iter().map(|o| o.map(str::to_string)).collect()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TextRecognizer for Scripted {
        async fn recognize(
            &self,
            _image: &GrayImage,
            _language: &str,
            _options: &RecognizeOptions,
        ) -> Result<String, RecognizeError> {
            *self.calls.lock().unwrap() += 1;
            match self.outputs.lock().unwrap().pop_front().flatten() {
                Some(text) => Ok(text),
                None => Err(RecognizeError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "scripted failure".to_string(),
                }),
            }
        }
    }

    fn v(n: u32) -> VehicleId {
        VehicleId::from_ordinal(n).unwrap()
    }

    fn photo() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, image::Rgb([240, 240, 240])))
    }

    fn setup() -> (RefCell<AssignmentStore>, Scope) {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let store = AssignmentStore::new(today);
        (RefCell::new(store), Scope::new(today, Direction::Outbound))
    }

    fn names(handle: &RefCell<AssignmentStore>, scope: Scope, vehicle: VehicleId) -> Vec<String> {
        let store = handle.borrow();
        store
            .board(scope)
            .lane(vehicle)
            .iter()
            .map(|a| store.student(&a.student_id).unwrap().name.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_line_mode_replaces_mentioned_vehicles_only() {
        let (handle, scope) = setup();
        {
            let mut store = handle.borrow_mut();
            let old = store.add_student("高橋", "赤").unwrap();
            let kept = store.add_student("伊藤", "赤").unwrap();
            store.assign(scope, &old, v(1), "").unwrap();
            store.assign(scope, &kept, v(5), "").unwrap();
        }
        let recognizer = Scripted::new(&[Some("送迎表\n車1：山田、佐藤\n3号車 鈴木\n車1 田中\n")]);

        let report = import_board_photo(&handle, &recognizer, &photo(), scope, &OcrImportOptions::default())
            .await
            .unwrap();

        assert_eq!(names(&handle, scope, v(1)), vec!["山田", "佐藤", "田中"]);
        assert_eq!(names(&handle, scope, v(3)), vec!["鈴木"]);
        assert_eq!(names(&handle, scope, v(5)), vec!["伊藤"]);
        assert_eq!(report.segments, 4);
        assert_eq!(report.segments_used, 3);
        assert_eq!(report.vehicles_touched, vec![v(1), v(3)]);
        assert_eq!(report.students_created, 4);
        // created students take the first group
        let store = handle.borrow();
        assert_eq!(store.student_by_name("山田").unwrap().group, "赤");
    }

    #[tokio::test]
    async fn test_line_mode_failure_leaves_board_alone() {
        let (handle, scope) = setup();
        {
            let mut store = handle.borrow_mut();
            let id = store.add_student("高橋", "赤").unwrap();
            store.assign(scope, &id, v(1), "08:00").unwrap();
        }
        let before = handle.borrow().board(scope);
        let recognizer = Scripted::new(&[None]);

        let err = import_board_photo(&handle, &recognizer, &photo(), scope, &OcrImportOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OcrError::Recognizer(_)));
        assert_eq!(handle.borrow().board(scope), before);
        assert_eq!(handle.borrow().students().len(), 1);
    }

    #[tokio::test]
    async fn test_cell_mode_second_run_overwrites_first() {
        let (handle, scope) = setup();
        let grid = GridSpec::default();
        let options = OcrImportOptions::default();

        let first: Vec<Option<&str>> = vec![Some("山田"), Some("佐藤 鈴木"), Some(""), Some(""), Some(""), Some(""), Some(""), Some("田中")];
        let recognizer = Scripted::new(&first);
        import_board_cells(&handle, &recognizer, &photo(), &grid, scope, &options)
            .await
            .unwrap();
        assert_eq!(recognizer.calls(), 8);
        assert_eq!(names(&handle, scope, v(2)), vec!["佐藤", "鈴木"]);
        assert_eq!(names(&handle, scope, v(8)), vec!["田中"]);

        let second: Vec<Option<&str>> = vec![Some(""), Some(""), Some("山田"), Some(""), Some(""), Some(""), Some(""), Some("")];
        let recognizer = Scripted::new(&second);
        let report = import_board_cells(&handle, &recognizer, &photo(), &grid, scope, &options)
            .await
            .unwrap();

        assert_eq!(report.segments, 8);
        assert_eq!(report.segments_used, 1);
        assert_eq!(report.students_created, 0);
        assert_eq!(names(&handle, scope, v(3)), vec!["山田"]);
        assert_eq!(handle.borrow().board(scope).len(), 1);
    }

    #[tokio::test]
    async fn test_cell_mode_failure_keeps_cells_already_read() {
        let (handle, scope) = setup();
        {
            let mut store = handle.borrow_mut();
            let id = store.add_student("高橋", "赤").unwrap();
            store.assign(scope, &id, v(4), "").unwrap();
        }
        let recognizer = Scripted::new(&[Some("山田"), None]);

        let err = import_board_cells(
            &handle,
            &recognizer,
            &photo(),
            &GridSpec::default(),
            scope,
            &OcrImportOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OcrError::Recognizer(RecognizeError::Failed { .. })));
        assert_eq!(recognizer.calls(), 2);
        assert_eq!(names(&handle, scope, v(1)), vec!["山田"]);
        assert!(handle.borrow().board(scope).lane(v(4)).is_empty());
    }

    #[tokio::test]
    async fn test_cell_mode_rejects_bad_grid_before_touching_board() {
        let (handle, scope) = setup();
        {
            let mut store = handle.borrow_mut();
            let id = store.add_student("高橋", "赤").unwrap();
            store.assign(scope, &id, v(4), "").unwrap();
        }
        let grid = GridSpec {
            left: 70.0,
            right: 40.0,
            ..GridSpec::default()
        };
        let recognizer = Scripted::new(&[]);

        let err = import_board_cells(&handle, &recognizer, &photo(), &grid, scope, &OcrImportOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OcrError::Imaging(_)));
        assert_eq!(recognizer.calls(), 0);
        assert_eq!(handle.borrow().board(scope).len(), 1);
    }
}
