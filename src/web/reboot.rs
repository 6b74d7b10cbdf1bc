//! Reboot listener: one page, one button.

use axum::{
    Router,
    extract::State,
    response::Html,
    routing::{get, post},
};
use std::ffi::OsStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use super::templates;
use crate::audio::spawn_detached;
use crate::config::ConfigStore;

/// Build the reboot router. The command is read from the store per request.
pub fn reboot_router(store: Arc<ConfigStore>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/reboot", post(reboot))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn index() -> Html<&'static str> {
    Html(templates::REBOOT_TEMPLATE)
}

/// Spawn the reboot command and answer without waiting for it.
async fn reboot(State(store): State<Arc<ConfigStore>>) -> Html<String> {
    let command = store.snapshot().web.reboot_command;
    let Some((program, args)) = command.split_first() else {
        warn!("Reboot requested but web.reboot_command is empty");
        return Html(templates::message_page("Reboot is not configured."));
    };

    warn!("Reboot requested, running {}", command.join(" "));
    let argv: Vec<&OsStr> = args.iter().map(|a| OsStr::new(a.as_str())).collect();
    match spawn_detached(program, &argv) {
        Ok(()) => Html(templates::message_page("Reboot command sent.")),
        Err(e) => {
            error!("Reboot failed: {}", e);
            Html(templates::message_page("Reboot command could not be started."))
        }
    }
}
