// HTTP Server Module - REST control surface over the engine and presets.
// Every failure body is {"success": false, "message": ...}; handlers map
// the error taxonomy onto status codes and never touch the render loop
// beyond the engine's own locking.
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::animations::{self, BinFeed, SetupError};
use crate::color::to_hex;
use crate::engine::{Engine, LedUpdate};
use crate::presets::{NewPreset, PresetError, PresetStore, PresetUpdate};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Engine>>,
    pub presets: PresetStore,
    pub bin_feed: BinFeed,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/animations", get(list_animations))
        .route("/animations/:name", post(play_animation))
        .route("/stop", post(stop_animation))
        .route("/status", get(status))
        .route("/leds", get(get_leds).patch(update_led))
        .route("/all", post(update_all))
        .route("/music/frame", post(music_frame))
        .route("/presets", get(list_presets).post(create_preset))
        .route(
            "/presets/:id",
            get(get_preset).put(update_preset).delete(delete_preset),
        )
        .with_state(state)
}

pub async fn serve(listen: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn ok(message: impl Into<String>) -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(json!({"success": true, "message": message.into()})),
    )
}

fn fail(status: StatusCode, message: impl ToString) -> axum::response::Response {
    (
        status,
        axum::Json(json!({"success": false, "message": message.to_string()})),
    )
        .into_response()
}

fn setup_error_response(err: SetupError) -> axum::response::Response {
    let status = match err {
        SetupError::UnknownAnimation(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    fail(status, err)
}

fn preset_error_response(err: PresetError) -> axum::response::Response {
    match err {
        PresetError::NotFound(_) => fail(StatusCode::NOT_FOUND, err),
        PresetError::Validation(e) => setup_error_response(e),
        PresetError::Db(_) => fail(StatusCode::INTERNAL_SERVER_ERROR, err),
    }
}

async fn list_animations() -> impl IntoResponse {
    axum::Json(animations::descriptors())
}

async fn play_animation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Map<String, serde_json::Value>>,
) -> impl IntoResponse {
    let result = state.engine.lock().unwrap().play(&name, &params);
    match result {
        Ok(()) => ok(format!("Playing {}", name)).into_response(),
        Err(e) => setup_error_response(e),
    }
}

async fn stop_animation(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.lock().unwrap().stop();
    ok("Stopped")
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.engine.lock().unwrap().status())
}

async fn get_leds(State(state): State<AppState>) -> impl IntoResponse {
    let colors: Vec<String> = state
        .engine
        .lock()
        .unwrap()
        .snapshot()
        .into_iter()
        .map(to_hex)
        .collect();
    axum::Json(json!({"success": true, "leds": colors}))
}

/// One update or a batch; a batch shows once after the last write.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LedUpdateBody {
    One(LedUpdate),
    Many(Vec<LedUpdate>),
}

async fn update_led(
    State(state): State<AppState>,
    Json(body): Json<LedUpdateBody>,
) -> impl IntoResponse {
    let mut engine = state.engine.lock().unwrap();
    let result = match &body {
        LedUpdateBody::One(update) => engine.update_led(update, true),
        LedUpdateBody::Many(updates) => engine.update_many(updates, true),
    };
    match result {
        Ok(()) => ok("Updated").into_response(),
        Err(e) => fail(StatusCode::BAD_REQUEST, format!("{:#}", e)),
    }
}

/// Whole-tree controls: power, uniform color, blanking, startup chase.
#[derive(Debug, Deserialize)]
struct AllUpdate {
    power: Option<bool>,
    state: Option<bool>,
    color: Option<String>,
    #[serde(default = "default_brightness")]
    brightness: u8,
    #[serde(default)]
    startup: bool,
}

fn default_brightness() -> u8 {
    255
}

async fn update_all(
    State(state): State<AppState>,
    Json(update): Json<AllUpdate>,
) -> impl IntoResponse {
    let mut engine = state.engine.lock().unwrap();
    if let Some(power) = update.power {
        if let Err(e) = engine.set_power(power) {
            return fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
        }
    }
    if update.startup {
        engine.startup();
        return ok("Startup sequence running").into_response();
    }
    let result = match (&update.color, update.state) {
        (Some(color), _) => engine.uniform_color(color, update.brightness),
        (None, Some(false)) => engine.uniform_color("0,0,0", 255),
        _ => Ok(()),
    };
    match result {
        Ok(()) => ok("Updated").into_response(),
        Err(e) => fail(StatusCode::BAD_REQUEST, format!("{:#}", e)),
    }
}

#[derive(Debug, Deserialize)]
struct MusicFrame {
    colors: Vec<u32>,
}

async fn music_frame(
    State(state): State<AppState>,
    Json(frame): Json<MusicFrame>,
) -> impl IntoResponse {
    state
        .bin_feed
        .publish(frame.colors.into_iter().map(|c| c & 0x00ff_ffff).collect());
    ok("Published")
}

#[derive(Debug, Deserialize)]
struct PresetFilter {
    animation: Option<String>,
}

async fn list_presets(
    State(state): State<AppState>,
    Query(filter): Query<PresetFilter>,
) -> impl IntoResponse {
    match state.presets.list(filter.animation.as_deref()).await {
        Ok(presets) => axum::Json(presets).into_response(),
        Err(e) => preset_error_response(e),
    }
}

async fn create_preset(
    State(state): State<AppState>,
    Json(new): Json<NewPreset>,
) -> impl IntoResponse {
    match state.presets.create(&new).await {
        Ok(preset) => (StatusCode::CREATED, axum::Json(preset)).into_response(),
        Err(e) => preset_error_response(e),
    }
}

async fn get_preset(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.presets.get(id).await {
        Ok(preset) => axum::Json(preset).into_response(),
        Err(e) => preset_error_response(e),
    }
}

async fn update_preset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<PresetUpdate>,
) -> impl IntoResponse {
    match state.presets.update(id, &update).await {
        Ok(preset) => axum::Json(preset).into_response(),
        Err(e) => preset_error_response(e),
    }
}

async fn delete_preset(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.presets.delete(id).await {
        Ok(()) => ok("Deleted").into_response(),
        Err(e) => preset_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animations::{Params, RuntimeContext};
    use crate::geometry::GeometryStore;
    use crate::sink::MockSink;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let geometry = Arc::new(
            GeometryStore::new((0..20).map(|i| [0.0, 0.0, i as f64]).collect()).unwrap(),
        );
        let bin_feed = BinFeed::default();
        let ctx = RuntimeContext {
            bin_feed: bin_feed.clone(),
            cache_dir: dir.path().to_path_buf(),
        };
        let engine = Engine::new(geometry, Box::new(MockSink::new(20)), ctx);
        let presets = PresetStore::open(&dir.path().join("presets.db")).await.unwrap();
        (
            dir,
            AppState {
                engine: Arc::new(Mutex::new(engine)),
                presets,
                bin_feed,
            },
        )
    }

    async fn request(
        state: &AppState,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_list_animations() {
        let (_dir, state) = test_state().await;
        let (status, body) = request(&state, "GET", "/animations", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"fade"));
        assert!(names.contains(&"geodesic"));
    }

    #[tokio::test]
    async fn test_play_status_stop() {
        let (_dir, state) = test_state().await;
        let defaults = Params::defaults(animations::descriptor("fade").unwrap());
        let (status, body) = request(
            &state,
            "POST",
            "/animations/fade",
            Some(serde_json::Value::Object(defaults)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = request(&state, "GET", "/status", None).await;
        assert_eq!(body["animation"], "fade");
        assert_eq!(body["state"], "running");

        let (status, _) = request(&state, "POST", "/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = request(&state, "GET", "/status", None).await;
        assert_eq!(body["state"], "idle");
    }

    #[tokio::test]
    async fn test_play_failures_map_to_taxonomy() {
        let (_dir, state) = test_state().await;
        let (status, body) =
            request(&state, "POST", "/animations/wobble", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("Unknown animation"));

        let (status, body) =
            request(&state, "POST", "/animations/fade", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Missing parameters"));

        let mut extra = Params::defaults(animations::descriptor("fade").unwrap());
        extra.insert("bogus".into(), json!(1));
        let (status, body) = request(
            &state,
            "POST",
            "/animations/fade",
            Some(serde_json::Value::Object(extra)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Invalid parameters"));
    }

    #[tokio::test]
    async fn test_led_update_and_snapshot() {
        let (_dir, state) = test_state().await;
        let (status, _) = request(
            &state,
            "PATCH",
            "/leds",
            Some(json!({"id": 2, "color": "255,0,0", "state": true, "brightness": 255})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = request(&state, "GET", "/leds", None).await;
        assert_eq!(body["leds"][2], "#ff0000");
        assert_eq!(body["leds"][0], "#000000");

        // Batch form
        let (status, _) = request(
            &state,
            "PATCH",
            "/leds",
            Some(json!([
                {"id": 0, "color": "0,255,0"},
                {"id": 2, "state": false},
            ])),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = request(&state, "GET", "/leds", None).await;
        assert_eq!(body["leds"][0], "#00ff00");
        assert_eq!(body["leds"][2], "#000000");
    }

    #[tokio::test]
    async fn test_music_frame_published() {
        let (_dir, state) = test_state().await;
        let (status, _) = request(
            &state,
            "POST",
            "/music/frame",
            Some(json!({"colors": [16711680, 255]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.bin_feed.take(), Some(vec![0xff0000, 0x0000ff]));
    }

    #[tokio::test]
    async fn test_preset_crud_over_http() {
        let (_dir, state) = test_state().await;
        let defaults = Params::defaults(animations::descriptor("fade").unwrap());
        let (status, created) = request(
            &state,
            "POST",
            "/presets",
            Some(json!({"name": "evening", "animation": "fade", "params": defaults})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();

        let (status, fetched) = request(&state, "GET", &format!("/presets/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "evening");

        let (status, listed) = request(&state, "GET", "/presets?animation=fade", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, _) = request(&state, "DELETE", &format!("/presets/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = request(&state, "GET", &format!("/presets/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_preset_rejected_over_http() {
        let (_dir, state) = test_state().await;
        let (status, body) = request(
            &state,
            "POST",
            "/presets",
            Some(json!({"name": "bad", "animation": "fade", "params": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
