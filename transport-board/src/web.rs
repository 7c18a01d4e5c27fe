use actix_web::http::header::{Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue};
use actix_web::http::StatusCode;
use actix_web::{middleware, web, App, HttpResponse, HttpServer, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::board::{
    format_date, parse_date, AssignmentStore, BoardHandle, Direction, Group, Scope, Student, StudentId, VehicleId,
    VehicleSlot, VEHICLE_COUNT,
};
use crate::codec::{export_csv, export_file_name, import_csv, Schema};
use crate::config::Settings;
use crate::error::{OcrError, StoreError};
use crate::imaging::{decode_image, GridSpec, PreprocessOptions};
use crate::ocr::{import_board_cells, import_board_photo, OcrImportOptions, OcrMode, TextRecognizer};
use crate::persist::StateFile;

/// Shared server state: the store behind a mutex, saved after every update
pub struct AppState {
    store: Mutex<AssignmentStore>,
    file: StateFile,
    recognizer: Arc<dyn TextRecognizer>,
    ocr: OcrImportOptions,
}

impl AppState {
    pub fn new(
        store: AssignmentStore,
        file: StateFile,
        recognizer: Arc<dyn TextRecognizer>,
        ocr: OcrImportOptions,
    ) -> Self {
        AppState {
            store: Mutex::new(store),
            file,
            recognizer,
            ocr,
        }
    }

    pub fn read<T>(&self, f: impl FnOnce(&AssignmentStore) -> T) -> T {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    /// Runs one mutation and saves the result. A failed save is reported to
    /// the caller; the mutation itself stays applied in memory.
    fn apply<T>(&self, f: impl FnOnce(&mut AssignmentStore) -> T) -> Reply<T> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut store);
        self.file.save_store(&store).map_err(|e| {
            warn!(error = %e, "failed to save board state");
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("change applied but not saved: {}", e))
        })?;
        Ok(out)
    }
}

/// Used by the photo import, which saves once more when the run ends
impl BoardHandle for AppState {
    fn update<T>(&self, f: impl FnOnce(&mut AssignmentStore) -> T) -> T {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut store);
        if let Err(e) = self.file.save_store(&store) {
            warn!(error = %e, "failed to save board state");
        }
        out
    }
}

// ---- responses

type Reply<T> = std::result::Result<T, HttpResponse>;

fn failure(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({"success": false, "error": message.into()}))
}

fn success() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"success": true}))
}

fn store_failure(e: &StoreError) -> HttpResponse {
    let status = match e {
        StoreError::UnknownStudent(_) | StoreError::UnknownGroup(_) => StatusCode::NOT_FOUND,
        StoreError::EmptyName | StoreError::ResetNotConfirmed => StatusCode::BAD_REQUEST,
        StoreError::VehicleDisabled(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::DuplicateGroup(_) => StatusCode::CONFLICT,
    };
    failure(status, e.to_string())
}

fn ocr_failure(e: &OcrError) -> HttpResponse {
    let status = match e {
        OcrError::Imaging(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OcrError::Recognizer(_) => StatusCode::BAD_GATEWAY,
    };
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "error": e.status_message(),
        "detail": e.to_string(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderView {
    student_id: StudentId,
    name: String,
    group: String,
    color: String,
    pickup: String,
}

#[derive(Serialize)]
pub struct VehicleView {
    vehicle: VehicleId,
    name: String,
    enabled: bool,
    riders: Vec<RiderView>,
}

#[derive(Serialize)]
pub struct BoardView {
    date: String,
    direction: Direction,
    label: &'static str,
    today: String,
    dates: Vec<String>,
    vehicles: Vec<VehicleView>,
    unassigned: Vec<RiderView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    groups: Vec<Group>,
    group_lock: bool,
    vehicles: [VehicleSlot; VEHICLE_COUNT],
    panel_width: u32,
    grid: GridSpec,
}

fn rider_view(store: &AssignmentStore, student: &Student, pickup: &str) -> RiderView {
    RiderView {
        student_id: student.id.clone(),
        name: student.name.clone(),
        group: student.group.clone(),
        color: store.groups().color_for(&student.group).to_string(),
        pickup: pickup.to_string(),
    }
}

fn board_view(store: &AssignmentStore, scope: Scope) -> BoardView {
    let board = store.board(scope);
    let vehicles = VehicleId::all()
        .map(|vehicle| {
            let slot = store.vehicle(vehicle);
            let riders = board
                .lane(vehicle)
                .iter()
                .filter_map(|a| store.student(&a.student_id).map(|s| rider_view(store, s, &a.pickup)))
                .collect();
            VehicleView {
                vehicle,
                name: slot.name.clone(),
                enabled: slot.enabled,
                riders,
            }
        })
        .collect();
    BoardView {
        date: format_date(scope.date),
        direction: scope.direction,
        label: scope.direction.label(),
        today: format_date(store.today()),
        dates: store.window().dates().into_iter().map(format_date).collect(),
        vehicles,
        unassigned: store.unassigned(scope).into_iter().map(|s| rider_view(store, s, "")).collect(),
    }
}

fn settings_view(store: &AssignmentStore) -> SettingsView {
    SettingsView {
        groups: store.groups().groups.clone(),
        group_lock: store.groups().locked,
        vehicles: store.vehicles().clone(),
        panel_width: store.prefs().panel_width,
        grid: store.prefs().grid.clone(),
    }
}

// ---- request parsing

/// Optional date and direction; missing parts fall back to the selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeQuery {
    date: Option<String>,
    direction: Option<String>,
}

impl ScopeQuery {
    fn resolve(&self, store: &AssignmentStore) -> Reply<Scope> {
        let selection = store.selection();
        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => {
                parse_date(raw).ok_or_else(|| failure(StatusCode::BAD_REQUEST, format!("invalid date: {}", raw)))?
            }
            None => selection.date,
        };
        let direction = match self.direction.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Direction::from_label(raw)
                .ok_or_else(|| failure(StatusCode::BAD_REQUEST, format!("invalid direction: {}", raw)))?,
            None => selection.direction,
        };
        Ok(store.scope(date, direction))
    }
}

fn vehicle_param(ordinal: u32) -> Reply<VehicleId> {
    VehicleId::from_ordinal(ordinal)
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, format!("vehicle must be 1-{}, got {}", VEHICLE_COUNT, ordinal)))
}

macro_rules! try_response {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(resp) => return Ok(resp),
        }
    };
}

// ---- board

async fn get_board(query: web::Query<ScopeQuery>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let view = state.read(|store| query.resolve(store).map(|scope| board_view(store, scope)));
    Ok(HttpResponse::Ok().json(try_response!(view)))
}

#[derive(Deserialize)]
pub struct SelectionRequest {
    date: Option<String>,
    direction: Option<String>,
    /// Days to move the selected date by; applied after `date`
    shift: Option<i64>,
}

async fn put_selection(req: web::Json<SelectionRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let req = req.into_inner();
    let query = ScopeQuery {
        date: req.date,
        direction: req.direction,
    };
    let view = try_response!(state.apply(|store| -> Reply<BoardView> {
        let scope = query.resolve(store)?;
        store.select_date(scope.date);
        store.select_direction(scope.direction);
        if let Some(delta) = req.shift {
            store.shift_selection(delta);
        }
        Ok(board_view(store, store.selection()))
    }));
    Ok(HttpResponse::Ok().json(try_response!(view)))
}

// ---- students

#[derive(Deserialize)]
pub struct NewStudent {
    name: String,
    #[serde(default)]
    group: String,
}

#[derive(Deserialize)]
pub struct StudentUpdate {
    group: String,
}

async fn list_students(state: web::Data<AppState>) -> Result<HttpResponse> {
    let students = state.read(|store| store.students().to_vec());
    Ok(HttpResponse::Ok().json(students))
}

async fn add_student(req: web::Json<NewStudent>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let created = try_response!(state.apply(|store| {
        let id = store.add_student(&req.name, &req.group)?;
        Ok::<_, StoreError>(store.student(&id).cloned())
    }));
    match created {
        Ok(student) => Ok(HttpResponse::Created().json(student)),
        Err(e) => Ok(store_failure(&e)),
    }
}

async fn update_student(
    id: web::Path<String>,
    req: web::Json<StudentUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let id = StudentId::from(id.into_inner());
    match try_response!(state.apply(|store| store.set_student_group(&id, &req.group))) {
        Ok(()) => Ok(success()),
        Err(e) => Ok(store_failure(&e)),
    }
}

async fn remove_student(id: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let id = StudentId::from(id.into_inner());
    match try_response!(state.apply(|store| store.remove_student(&id))) {
        Ok(student) => {
            info!(id = %student.id, name = %student.name, "student removed");
            Ok(success())
        }
        Err(e) => Ok(store_failure(&e)),
    }
}

// ---- assignments

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    #[serde(flatten)]
    scope: ScopeQuery,
    student_id: String,
    vehicle: u32,
    #[serde(default)]
    pickup: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignRequest {
    #[serde(flatten)]
    scope: ScopeQuery,
    student_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupRequest {
    #[serde(flatten)]
    scope: ScopeQuery,
    student_id: String,
    vehicle: u32,
    pickup: String,
}

#[derive(Deserialize)]
pub struct ClearRequest {
    #[serde(flatten)]
    scope: ScopeQuery,
    /// Clears one vehicle when set, the whole board otherwise
    vehicle: Option<u32>,
}

async fn assign(req: web::Json<AssignRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let vehicle = try_response!(vehicle_param(req.vehicle));
    let id = StudentId::from(req.student_id.as_str());
    let result = try_response!(state.apply(|store| -> Reply<BoardView> {
        let scope = req.scope.resolve(store)?;
        // Disabled vehicles are not drop targets
        if !store.vehicle(vehicle).enabled {
            return Err(store_failure(&StoreError::VehicleDisabled(vehicle.ordinal())));
        }
        store
            .assign(scope, &id, vehicle, &req.pickup)
            .map_err(|e| store_failure(&e))?;
        Ok(board_view(store, scope))
    }));
    Ok(HttpResponse::Ok().json(try_response!(result)))
}

async fn unassign(req: web::Json<UnassignRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let id = StudentId::from(req.student_id.as_str());
    let result = try_response!(state.apply(|store| -> Reply<BoardView> {
        let scope = req.scope.resolve(store)?;
        store.unassign(scope, &id);
        Ok(board_view(store, scope))
    }));
    Ok(HttpResponse::Ok().json(try_response!(result)))
}

async fn update_pickup(req: web::Json<PickupRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let vehicle = try_response!(vehicle_param(req.vehicle));
    let id = StudentId::from(req.student_id.as_str());
    let result = try_response!(state.apply(|store| -> Reply<BoardView> {
        let scope = req.scope.resolve(store)?;
        if !store.update_pickup_time(scope, vehicle, &id, &req.pickup) {
            return Err(failure(StatusCode::NOT_FOUND, format!("{} is not in vehicle {}", id, vehicle.ordinal())));
        }
        Ok(board_view(store, scope))
    }));
    Ok(HttpResponse::Ok().json(try_response!(result)))
}

async fn clear(req: web::Json<ClearRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let vehicle = match req.vehicle {
        Some(n) => Some(try_response!(vehicle_param(n))),
        None => None,
    };
    let result = try_response!(state.apply(|store| -> Reply<BoardView> {
        let scope = req.scope.resolve(store)?;
        match vehicle {
            Some(v) => store.clear_vehicle(scope, v),
            None => store.clear_board(scope),
        }
        Ok(board_view(store, scope))
    }));
    Ok(HttpResponse::Ok().json(try_response!(result)))
}

// ---- settings

#[derive(Deserialize)]
pub struct GroupRequest {
    name: String,
    color: String,
}

#[derive(Deserialize)]
pub struct LockRequest {
    locked: bool,
}

#[derive(Deserialize)]
pub struct VehicleRequest {
    name: Option<String>,
    enabled: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefsRequest {
    panel_width: Option<u32>,
    grid: Option<GridSpec>,
}

async fn get_settings(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.read(settings_view)))
}

async fn add_group(req: web::Json<GroupRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let view = try_response!(state.apply(|store| {
        store.add_group(&req.name, &req.color)?;
        Ok::<_, StoreError>(settings_view(store))
    }));
    match view {
        Ok(view) => Ok(HttpResponse::Created().json(view)),
        Err(e) => Ok(store_failure(&e)),
    }
}

async fn update_group(
    index: web::Path<usize>,
    req: web::Json<GroupRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let index = index.into_inner();
    let result = try_response!(state.apply(|store| {
        store.update_group(index, &req.name, &req.color)?;
        Ok::<_, StoreError>(settings_view(store))
    }));
    match result {
        Ok(view) => Ok(HttpResponse::Ok().json(view)),
        Err(e) => Ok(store_failure(&e)),
    }
}

async fn remove_group(index: web::Path<usize>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let index = index.into_inner();
    let result = try_response!(state.apply(|store| {
        store.remove_group(index)?;
        Ok::<_, StoreError>(settings_view(store))
    }));
    match result {
        Ok(view) => Ok(HttpResponse::Ok().json(view)),
        Err(e) => Ok(store_failure(&e)),
    }
}

async fn set_group_lock(req: web::Json<LockRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let view = try_response!(state.apply(|store| {
        store.set_group_lock(req.locked);
        settings_view(store)
    }));
    Ok(HttpResponse::Ok().json(view))
}

async fn update_vehicle(
    ordinal: web::Path<u32>,
    req: web::Json<VehicleRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let vehicle = try_response!(vehicle_param(ordinal.into_inner()));
    let view = try_response!(state.apply(|store| {
        if let Some(name) = req.name.as_deref() {
            store.rename_vehicle(vehicle, name.trim());
        }
        if let Some(enabled) = req.enabled {
            store.set_vehicle_enabled(vehicle, enabled);
        }
        settings_view(store)
    }));
    Ok(HttpResponse::Ok().json(view))
}

async fn update_prefs(req: web::Json<PrefsRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let req = req.into_inner();
    if let Some(grid) = &req.grid {
        if let Err(e) = grid.validate() {
            return Ok(failure(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()));
        }
    }
    let view = try_response!(state.apply(|store| {
        if let Some(width) = req.panel_width {
            store.set_panel_width(width);
        }
        if let Some(grid) = req.grid {
            store.set_grid(grid);
        }
        settings_view(store)
    }));
    Ok(HttpResponse::Ok().json(view))
}

// ---- CSV

#[derive(Deserialize)]
pub struct ExportQuery {
    date: Option<String>,
    direction: Option<String>,
    schema: Option<Schema>,
}

async fn export(query: web::Query<ExportQuery>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let schema = query.schema.unwrap_or(Schema::Full);
    let scope_query = ScopeQuery {
        date: query.date.clone(),
        direction: query.direction.clone(),
    };
    let result = state.read(|store| -> Reply<(String, String)> {
        let scope = scope_query.resolve(store)?;
        let csv = export_csv(store, scope, schema)
            .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to write CSV: {}", e)))?;
        Ok((csv, export_file_name(scope)))
    });
    let (csv, filename) = try_response!(result);
    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::FilenameExt(ExtendedValue {
            charset: Charset::Ext("UTF-8".to_string()),
            language_tag: None,
            value: filename.into_bytes(),
        })],
    };
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(disposition)
        .body(csv))
}

async fn import(query: web::Query<ScopeQuery>, body: web::Bytes, state: web::Data<AppState>) -> Result<HttpResponse> {
    let text = match std::str::from_utf8(&body) {
        Ok(text) => text,
        Err(_) => return Ok(failure(StatusCode::BAD_REQUEST, "CSV must be UTF-8")),
    };
    let result = try_response!(state.apply(|store| -> Reply<_> {
        let active = query.resolve(store)?;
        Ok(import_csv(store, text, active))
    }));
    let summary = try_response!(result);
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": true, "summary": summary})))
}

// ---- photo import

#[derive(Deserialize)]
pub struct PhotoQuery {
    date: Option<String>,
    direction: Option<String>,
    #[serde(default)]
    mode: OcrMode,
    #[serde(default)]
    invert: bool,
}

async fn import_photo(query: web::Query<PhotoQuery>, body: web::Bytes, state: web::Data<AppState>) -> Result<HttpResponse> {
    let photo = match decode_image(&body) {
        Ok(photo) => photo,
        Err(e) => return Ok(ocr_failure(&OcrError::Imaging(e))),
    };
    let scope_query = ScopeQuery {
        date: query.date.clone(),
        direction: query.direction.clone(),
    };
    let (scope, grid) = try_response!(state.read(|store| {
        scope_query.resolve(store).map(|scope| (scope, store.prefs().grid.clone()))
    }));
    let options = OcrImportOptions {
        preprocess: PreprocessOptions {
            invert: query.invert,
            ..state.ocr.preprocess
        },
        ..state.ocr.clone()
    };
    let recognizer = state.recognizer.as_ref();
    let handle = state.get_ref();
    let result = match query.mode {
        OcrMode::Lines => import_board_photo(handle, recognizer, &photo, scope, &options).await,
        OcrMode::Cells => import_board_cells(handle, recognizer, &photo, &grid, scope, &options).await,
    };
    // Cells read before a failure stay applied, so save either way
    try_response!(state.apply(|_| ()));
    match result {
        Ok(report) => Ok(HttpResponse::Ok().json(serde_json::json!({"success": true, "report": report}))),
        Err(e) => {
            warn!(error = %e, "photo import failed");
            Ok(ocr_failure(&e))
        }
    }
}

// ---- reset

#[derive(Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    confirm: bool,
}

async fn reset(req: web::Json<ResetRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    match try_response!(state.apply(|store| store.reset_all(req.confirm))) {
        Ok(()) => Ok(success()),
        Err(e) => Ok(store_failure(&e)),
    }
}

/// Registers every API route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/board", web::get().to(get_board))
        .route("/api/selection", web::put().to(put_selection))
        .route("/api/students", web::get().to(list_students))
        .route("/api/students", web::post().to(add_student))
        .route("/api/students/{id}", web::put().to(update_student))
        .route("/api/students/{id}", web::delete().to(remove_student))
        .route("/api/assign", web::post().to(assign))
        .route("/api/unassign", web::post().to(unassign))
        .route("/api/pickup", web::put().to(update_pickup))
        .route("/api/clear", web::post().to(clear))
        .route("/api/settings", web::get().to(get_settings))
        .route("/api/settings/groups", web::post().to(add_group))
        .route("/api/settings/groups/{index}", web::put().to(update_group))
        .route("/api/settings/groups/{index}", web::delete().to(remove_group))
        .route("/api/settings/group-lock", web::put().to(set_group_lock))
        .route("/api/settings/vehicles/{ordinal}", web::put().to(update_vehicle))
        .route("/api/settings/prefs", web::put().to(update_prefs))
        .route("/api/export", web::get().to(export))
        .route("/api/import", web::post().to(import))
        .route("/api/ocr", web::post().to(import_photo))
        .route("/api/reset", web::post().to(reset));
}

pub async fn start_server(settings: Settings, store: AssignmentStore) -> std::io::Result<()> {
    let recognizer: Arc<dyn TextRecognizer> = Arc::new(settings.recognizer());
    let app_state = web::Data::new(AppState::new(
        store,
        settings.state_file(),
        recognizer,
        settings.ocr_options(),
    ));
    // Photos are uploaded whole
    let payload_limit = 32 * 1024 * 1024;

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::PayloadConfig::new(payload_limit))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(("0.0.0.0", settings.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecognizeError;
    use crate::imaging::encode_png;
    use actix_web::test;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use image::GrayImage;

    struct FixedText(&'static str);

    #[async_trait]
    impl TextRecognizer for FixedText {
        async fn recognize(
            &self,
            _image: &GrayImage,
            _language: &str,
            _options: &crate::ocr::RecognizeOptions,
        ) -> std::result::Result<String, RecognizeError> {
            Ok(self.0.to_string())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn state(dir: &tempfile::TempDir, text: &'static str) -> web::Data<AppState> {
        web::Data::new(AppState::new(
            AssignmentStore::new(today()),
            StateFile::in_dir(dir.path()),
            Arc::new(FixedText(text)),
            OcrImportOptions::default(),
        ))
    }

    fn student_id(state: &AppState, name: &str) -> String {
        state.read(|store| store.student_by_name(name).unwrap().id.to_string())
    }

    #[actix_web::test]
    async fn test_add_assign_and_view_board() {
        let dir = tempfile::tempdir().unwrap();
        let data = state(&dir, "");
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/students")
            .set_json(serde_json::json!({"name": "山田", "group": "青"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let id = student_id(&data, "山田");
        let req = test::TestRequest::post()
            .uri("/api/assign")
            .set_json(serde_json::json!({"studentId": id, "vehicle": 4, "pickup": "08:10", "direction": "back"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/api/board?direction=back").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["date"], "2025-06-15");
        assert_eq!(body["direction"], "back");
        assert_eq!(body["vehicles"][3]["riders"][0]["name"], "山田");
        assert_eq!(body["vehicles"][3]["riders"][0]["color"], "#3b82f6");
        assert_eq!(body["dates"].as_array().unwrap().len(), 21);

        // every update is persisted
        let saved = StateFile::in_dir(dir.path()).load().unwrap().unwrap();
        assert_eq!(saved.students.len(), 1);
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let data = state(&dir, "");
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        data.update(|store| {
            store.add_student("山田", "").unwrap();
            store.set_vehicle_enabled(VehicleId::from_ordinal(2).unwrap(), false);
        });
        let id = student_id(&data, "山田");

        let cases = [
            (serde_json::json!({"studentId": id, "vehicle": 2}), StatusCode::UNPROCESSABLE_ENTITY),
            (serde_json::json!({"studentId": id, "vehicle": 9}), StatusCode::BAD_REQUEST),
            (serde_json::json!({"studentId": "nobody", "vehicle": 1}), StatusCode::NOT_FOUND),
            (serde_json::json!({"studentId": id, "vehicle": 1, "date": "soon"}), StatusCode::BAD_REQUEST),
        ];
        for (payload, status) in cases {
            let req = test::TestRequest::post().uri("/api/assign").set_json(payload).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), status);
        }

        let req = test::TestRequest::post()
            .uri("/api/reset")
            .set_json(serde_json::json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(data.read(|store| store.students().len()), 1);

        let req = test::TestRequest::post()
            .uri("/api/reset")
            .set_json(serde_json::json!({"confirm": true}))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
        assert!(data.read(|store| store.students().is_empty()));
    }

    #[actix_web::test]
    async fn test_unassign_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let data = state(&dir, "");
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        data.update(|store| {
            let id = store.add_student("山田", "").unwrap();
            let scope = store.selection();
            store.assign(scope, &id, VehicleId::FIRST, "").unwrap();
        });
        let id = student_id(&data, "山田");

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/api/unassign")
                .set_json(serde_json::json!({"studentId": id}))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
        assert!(data.read(|store| store.board(store.selection()).is_empty()));
    }

    #[actix_web::test]
    async fn test_duplicate_group_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let data = state(&dir, "");
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/settings/groups")
            .set_json(serde_json::json!({"name": "赤", "color": "#000000"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::put()
            .uri("/api/settings/groups/1")
            .set_json(serde_json::json!({"name": "赤", "color": "#000000"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
        assert_eq!(data.read(|store| store.groups().groups.len()), 6);
    }

    #[actix_web::test]
    async fn test_failed_save_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // a plain file where the data directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let data = web::Data::new(AppState::new(
            AssignmentStore::new(today()),
            StateFile::in_dir(&blocker),
            Arc::new(FixedText("")),
            OcrImportOptions::default(),
        ));
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/students")
            .set_json(serde_json::json!({"name": "山田"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_csv_export_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let data = state(&dir, "");
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/import?date=2025-06-16&direction=go")
            .set_payload("車両,氏名,所属,ピックアップ\n車3,佐藤,緑,07:50\n")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["summary"]["imported"], 1);
        assert_eq!(body["summary"]["schema"], "compact");

        let req = test::TestRequest::get()
            .uri("/api/export?date=2025/06/16&direction=go&schema=full")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert!(resp.headers().get("content-disposition").is_some());
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#""2025-06-16","行き","車3","佐藤","緑","07:50""#));
    }

    #[actix_web::test]
    async fn test_photo_import_runs_line_mode() {
        let dir = tempfile::tempdir().unwrap();
        let data = state(&dir, "車2: 山田 佐藤\n");
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        let png = encode_png(&GrayImage::from_pixel(40, 20, image::Luma([200]))).unwrap();

        let req = test::TestRequest::post()
            .uri("/api/ocr?mode=lines")
            .set_payload(png)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["report"]["names_assigned"], 2);
        assert_eq!(body["report"]["mode"], "lines");

        let lane = data.read(|store| store.board(store.selection()).lane(VehicleId::from_ordinal(2).unwrap()).len());
        assert_eq!(lane, 2);

        let req = test::TestRequest::post()
            .uri("/api/ocr")
            .set_payload("not an image")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
