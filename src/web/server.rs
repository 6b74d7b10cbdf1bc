//! Config listener: settings form, uploads, text-to-speech and JSON status.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Form, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::templates::{self, Notice};
use crate::audio::{self, Launch};
use crate::config::{ApplyOutcome, ConfigPatch, ConfigStore, PersistHealth, Units};
use crate::paths::AppPaths;

/// Uploads (background images, boot sounds) may be larger than axum's 2 MB default.
const UPLOAD_LIMIT: usize = 16 * 1024 * 1024;

/// Config server state shared across handlers.
#[derive(Clone)]
pub struct ConfigServer {
    store: Arc<ConfigStore>,
    paths: Arc<AppPaths>,
}

impl ConfigServer {
    pub fn new(store: Arc<ConfigStore>, paths: Arc<AppPaths>) -> Self {
        Self { store, paths }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Build the router with all routes.
    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/save", post(save))
            .route("/speak", post(speak))
            .route("/api/config", get(api_config))
            .route("/api/health", get(health))
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    persistence: PersistHealth,
}

/// Settings page.
async fn index(State(state): State<ConfigServer>) -> Html<String> {
    Html(templates::config_page(&state.store.snapshot(), None))
}

/// Fields posted by the settings form.
#[derive(Debug, Default)]
struct SaveForm {
    weather_enabled: bool,
    bg_enabled: bool,
    audio_enabled: bool,
    lat: Option<String>,
    lon: Option<String>,
    units: Option<String>,
    background: Option<Vec<u8>>,
    boot_sound: Option<Vec<u8>>,
}

impl SaveForm {
    async fn read(mut multipart: Multipart) -> Result<Self, String> {
        let mut form = SaveForm::default();
        while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "background" | "boot_sound" => {
                    // An empty file input still posts a part with no filename.
                    let has_file = field.file_name().is_some_and(|f| !f.is_empty());
                    let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                    if has_file && !bytes.is_empty() {
                        let slot = if name == "background" {
                            &mut form.background
                        } else {
                            &mut form.boot_sound
                        };
                        *slot = Some(bytes.to_vec());
                    }
                }
                _ => {
                    let value = field.text().await.map_err(|e| e.to_string())?;
                    match name.as_str() {
                        "weather_enabled" => form.weather_enabled = !value.is_empty(),
                        "bg_enabled" => form.bg_enabled = !value.is_empty(),
                        "audio_enabled" => form.audio_enabled = !value.is_empty(),
                        "lat" => form.lat = Some(value),
                        "lon" => form.lon = Some(value),
                        "units" => form.units = Some(value),
                        _ => {}
                    }
                }
            }
        }
        Ok(form)
    }

    /// Latitude and longitude; both fall back to 0.0 when either is malformed.
    fn coordinates(&self) -> (f64, f64) {
        let parse = |v: &Option<String>| v.as_deref().unwrap_or("0").trim().parse::<f64>();
        match (parse(&self.lat), parse(&self.lon)) {
            (Ok(lat), Ok(lon)) if lat.is_finite() && lon.is_finite() => (lat, lon),
            _ => (0.0, 0.0),
        }
    }

    fn patch(&self, background: &Path, boot_sound: &Path) -> ConfigPatch {
        let (latitude, longitude) = self.coordinates();
        let units = Units::parse_lenient(self.units.as_deref().unwrap_or("imperial"));
        ConfigPatch::empty()
            .section(
                "weather",
                json!({
                    "enabled": self.weather_enabled,
                    "latitude": latitude,
                    "longitude": longitude,
                    "units": units,
                }),
            )
            .section(
                "background",
                json!({ "enabled": self.bg_enabled, "path": background.display().to_string() }),
            )
            .section(
                "audio",
                json!({ "enabled": self.audio_enabled, "path": boot_sound.display().to_string() }),
            )
    }
}

async fn store_upload(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(target, bytes).await
}

/// Apply the settings form.
async fn save(State(state): State<ConfigServer>, multipart: Multipart) -> impl IntoResponse {
    let form = match SaveForm::read(multipart).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Malformed settings form: {}", e);
            let notice = Notice::Error(format!("Could not read the form: {e}"));
            let page = templates::config_page(&state.store.snapshot(), Some(&notice));
            return (StatusCode::BAD_REQUEST, Html(page));
        }
    };

    let background = state.paths.background_path();
    let boot_sound = state.paths.boot_sound_path();
    let mut problems = Vec::new();
    for (bytes, target) in [(&form.background, &background), (&form.boot_sound, &boot_sound)] {
        if let Some(bytes) = bytes {
            match store_upload(target, bytes).await {
                Ok(()) => info!("Stored upload at {}", target.display()),
                Err(e) => {
                    warn!("Failed to store upload at {}: {}", target.display(), e);
                    problems.push(format!("{} not saved: {}", target.display(), e));
                }
            }
        }
    }

    let patch = form.patch(&background, &boot_sound);
    let store = Arc::clone(&state.store);
    let applied = tokio::task::spawn_blocking(move || store.apply(patch)).await;

    let (status, notice) = match applied {
        Ok(Ok(ApplyOutcome::Persisted)) if problems.is_empty() => {
            (StatusCode::OK, Notice::Info("Saved.".to_string()))
        }
        Ok(Ok(ApplyOutcome::Persisted)) => (
            StatusCode::OK,
            Notice::Error(format!("Saved, but {}", problems.join("; "))),
        ),
        Ok(Ok(ApplyOutcome::PersistFailed)) => {
            let reason = state.store.persistence().last_error.unwrap_or_default();
            (
                StatusCode::OK,
                Notice::Error(format!(
                    "Applied, but the settings file could not be written: {reason}"
                )),
            )
        }
        Ok(Err(e)) => (StatusCode::BAD_REQUEST, Notice::Error(e.to_string())),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Notice::Error(format!("Save interrupted: {e}")),
        ),
    };

    let page = templates::config_page(&state.store.snapshot(), Some(&notice));
    (status, Html(page))
}

#[derive(Debug, Deserialize)]
struct SpeakForm {
    #[serde(default)]
    say_text: String,
}

/// Fire-and-forget text-to-speech.
async fn speak(State(state): State<ConfigServer>, Form(form): Form<SpeakForm>) -> Html<String> {
    let message = match audio::speak(&state.store.snapshot().audio, &form.say_text) {
        Launch::Started(_) => "Speaking.",
        Launch::Skipped(_) => "Nothing to say.",
        Launch::Failed => "Text-to-speech is not available.",
    };
    Html(templates::message_page(message))
}

/// Snapshot of the configuration tree.
async fn api_config(State(state): State<ConfigServer>) -> Json<serde_json::Value> {
    Json(state.store.snapshot().to_value())
}

/// Health check endpoint.
async fn health(State(state): State<ConfigServer>) -> impl IntoResponse {
    let persistence = state.store.persistence();
    Json(HealthResponse {
        status: if persistence.in_sync { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        persistence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(lat: &str, lon: &str) -> SaveForm {
        SaveForm {
            lat: Some(lat.to_string()),
            lon: Some(lon.to_string()),
            ..SaveForm::default()
        }
    }

    #[test]
    fn test_coordinates_parse() {
        assert_eq!(form("51.5", "-0.12").coordinates(), (51.5, -0.12));
        assert_eq!(form(" 10 ", "20").coordinates(), (10.0, 20.0));
    }

    #[test]
    fn test_bad_coordinates_become_zero() {
        assert_eq!(form("north", "-0.12").coordinates(), (0.0, 0.0));
        assert_eq!(form("inf", "1").coordinates(), (0.0, 0.0));
        assert_eq!(SaveForm::default().coordinates(), (0.0, 0.0));
    }

    #[test]
    fn test_patch_shape() {
        let mut save = form("1", "2");
        save.units = Some("METRIC".to_string());
        save.weather_enabled = true;
        let patch = save
            .patch(Path::new("/a/bg.png"), Path::new("/a/boot.wav"))
            .into_value();
        assert_eq!(patch["weather"]["units"], "metric");
        assert_eq!(patch["weather"]["enabled"], true);
        assert_eq!(patch["background"]["enabled"], false);
        assert_eq!(patch["audio"]["path"], "/a/boot.wav");
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            persistence: PersistHealth::default(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("0.1.0"));
        assert!(json.contains("in_sync"));
    }
}
