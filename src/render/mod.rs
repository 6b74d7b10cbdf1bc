//! Render loops (consumers).
//!
//! Each [`Consumer`] owns one [`Renderer`] and runs on its own task:
//! snapshot config, build a [`Frame`], render, sleep the section's
//! `refresh_s` (re-read every tick), repeat. Renders run on the blocking
//! pool. A render error or panic marks that consumer inactive and ends its
//! loop; other consumers keep going.

pub mod oled;
#[cfg(feature = "ssd1306")]
mod i2c_panel;
pub mod terminal;

use crate::config::{Config, ConfigStore};
use crate::error::RenderError;
use crate::summary::{Reading, SharedSummary};
use crate::sysinfo::{SystemStats, stats_or_default};
use crate::task::{JOIN_TIMEOUT, JoinOutcome, TaskHandle};
use crate::weather::{Conditions, display_text};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Floor on the frame interval so a `refresh_s` of 0 cannot spin a core.
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub config: Config,
    pub now: DateTime<Local>,
    /// Weather line, sentinel text included.
    pub weather: String,
    pub stats: SystemStats,
    /// Last transcript, when speech is on and something was heard.
    pub heard: Option<String>,
    pub uptime: Duration,
}

/// Reader handles to every producer cell, shared by all consumers.
#[derive(Debug, Clone)]
pub struct FrameSources {
    pub weather: SharedSummary<Conditions>,
    pub stats: SharedSummary<SystemStats>,
    pub heard: SharedSummary<String>,
    pub started: Instant,
}

impl FrameSources {
    /// Handles that read from fresh cells; useful before producers exist.
    pub fn detached() -> Self {
        Self {
            weather: SharedSummary::new(),
            stats: SharedSummary::new(),
            heard: SharedSummary::new(),
            started: Instant::now(),
        }
    }

    pub fn frame(&self, config: Config) -> Frame {
        let heard = match self.heard.get() {
            Reading::Ready(text) => Some(text),
            _ => None,
        };
        Frame {
            config,
            now: Local::now(),
            weather: display_text(&self.weather.get()),
            stats: stats_or_default(&self.stats.get()),
            heard,
            uptime: self.started.elapsed(),
        }
    }
}

/// A surface that draws whole frames.
pub trait Renderer: Send + 'static {
    fn name(&self) -> &'static str;

    /// Time to wait after a frame, read from the frame's config.
    fn refresh_interval(&self, config: &Config) -> Duration;

    fn render(&mut self, frame: &Frame) -> Result<(), RenderError>;

    /// Restore the surface once the loop ends.
    fn shutdown(&mut self) {}
}

/// Clears the active flag however the loop ends, panics included.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A running render loop.
#[derive(Debug)]
pub struct Consumer {
    name: &'static str,
    active: Arc<AtomicBool>,
    task: TaskHandle,
}

impl Consumer {
    pub fn spawn<R: Renderer>(
        renderer: R,
        store: Arc<ConfigStore>,
        sources: FrameSources,
    ) -> Self {
        let name = renderer.name();
        let active = Arc::new(AtomicBool::new(true));
        let guard = ActiveGuard(Arc::clone(&active));

        info!("Starting {} display", name);
        let task = TaskHandle::spawn(format!("consumer:{name}"), move |mut stop| async move {
            let _guard = guard;
            let mut renderer = renderer;
            while !stop.is_stopped() {
                let frame = sources.frame(store.snapshot());
                let interval = renderer
                    .refresh_interval(&frame.config)
                    .max(MIN_FRAME_INTERVAL);
                let Some((returned, result)) =
                    off_runtime(renderer, move |r| r.render(&frame)).await
                else {
                    return;
                };
                renderer = returned;
                if let Err(e) = result {
                    error!("{} display error: {}", name, e);
                    break;
                }
                if stop.sleep(interval).await {
                    break;
                }
            }
            off_runtime(renderer, |r| r.shutdown()).await;
            info!("{} display stopped", name);
        });

        Self { name, active, task }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// False once the loop has ended for any reason.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn stop(self) -> JoinOutcome {
        self.task.stop(JOIN_TIMEOUT).await
    }
}

/// Run `f` on the blocking pool and hand the renderer back.
///
/// Device writes block, so they stay off the async workers. A panic in `f`
/// is resumed in the calling task. `None` means the runtime is going away.
async fn off_runtime<R, T, F>(mut renderer: R, f: F) -> Option<(R, T)>
where
    R: Renderer,
    T: Send + 'static,
    F: FnOnce(&mut R) -> T + Send + 'static,
{
    let name = renderer.name();
    match tokio::task::spawn_blocking(move || {
        let out = f(&mut renderer);
        (renderer, out)
    })
    .await
    {
        Ok(pair) => Some(pair),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            warn!("{} display call cancelled: {}", name, e);
            None
        }
    }
}
