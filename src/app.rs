//! Lifecycle coordinator: start everything in order, wait for a stop
//! request, then stop everything with bounded joins.

use crate::assets;
use crate::audio;
use crate::cli::Displays;
use crate::config::{Config, ConfigStore};
use crate::paths::AppPaths;
use crate::render::oled::{self, OledRenderer};
use crate::render::terminal::TerminalRenderer;
use crate::render::{Consumer, FrameSources};
use crate::speech::{CommandHandler, ProcessRecognizer, RecognizerFactory, SpeechListener, VoiceCommand};
use crate::summary::SharedSummary;
use crate::sysinfo::{StatsProvider, SystemStatsSource};
use crate::task::JoinOutcome;
use crate::weather::{self, Conditions, OpenMeteo, WeatherProvider};
use crate::web::{ConfigServer, RetryPolicy, ServerHandle, ServerStatus, reboot_router, start_server_with_retry};
use anyhow::Context;
use chrono::Local;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What to run besides the producers.
#[derive(Clone)]
pub struct AppOptions {
    pub displays: Displays,
    pub web: bool,
    /// Forecast endpoint override.
    pub weather_url: Option<String>,
    /// Recognizer override; defaults to the configured subprocess.
    pub recognizer: Option<RecognizerFactory>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            displays: Displays::All,
            web: true,
            weather_url: None,
            recognizer: None,
        }
    }
}

impl std::fmt::Debug for AppOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppOptions")
            .field("displays", &self.displays)
            .field("web", &self.web)
            .field("weather_url", &self.weather_url)
            .field("recognizer", &self.recognizer.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// Point-in-time view of every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStatus {
    pub consumers: Vec<(&'static str, bool)>,
    pub servers: Vec<(&'static str, ServerStatus)>,
}

/// The running appliance.
pub struct App {
    store: Arc<ConfigStore>,
    weather: Arc<WeatherProvider>,
    stats: Arc<StatsProvider>,
    speech: SpeechListener,
    consumers: Vec<Consumer>,
    servers: Vec<ServerHandle>,
}

/// Voice commands are answered through text-to-speech.
fn voice_handler(store: Arc<ConfigStore>, weather: SharedSummary<Conditions>) -> CommandHandler {
    Arc::new(move |command: VoiceCommand| {
        let reply = match command {
            VoiceCommand::Time => format!("It is {}", Local::now().format("%-I:%M %p")),
            VoiceCommand::Weather => weather::display_text(&weather.get()),
            VoiceCommand::Say(text) => text,
            VoiceCommand::Other(text) => {
                info!("Unhandled voice command: {}", text);
                return;
            }
        };
        audio::speak(&store.snapshot().audio, &reply);
    })
}

impl App {
    /// Run startup steps in order. The only fatal step (building the HTTP
    /// client) comes before any task is spawned.
    pub async fn start(paths: AppPaths, options: AppOptions) -> anyhow::Result<Self> {
        info!("Initializing ribbon display...");

        let defaults = Config::defaults_for(&paths);
        let store = Arc::new(ConfigStore::open(&paths.config_file, &defaults));
        info!("Configuration at {}", store.path().display());

        let asset_paths = paths.clone();
        match tokio::task::spawn_blocking(move || assets::ensure_default_assets(&asset_paths)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Default assets not prepared: {}", e),
            Err(e) => warn!("Default assets not prepared: {}", e),
        }

        let config = store.snapshot();
        audio::play_boot_sound(&config.audio);

        let source = match &options.weather_url {
            Some(url) => OpenMeteo::with_base_url(url.clone()),
            None => OpenMeteo::new(),
        }
        .context("failed to build weather client")?;
        let weather = Arc::new(WeatherProvider::new(source, Arc::clone(&store)));
        let stats = Arc::new(StatsProvider::new(SystemStatsSource::new(), Arc::clone(&store)));
        let speech = SpeechListener::new(
            Arc::clone(&store),
            options.recognizer.clone().unwrap_or_else(ProcessRecognizer::factory),
            voice_handler(Arc::clone(&store), weather.summary()),
        );
        weather.start();
        stats.start();
        speech.start();

        let mut app = Self {
            store: Arc::clone(&store),
            weather,
            stats,
            speech,
            consumers: Vec::new(),
            servers: Vec::new(),
        };

        if options.web {
            let config_router =
                ConfigServer::new(Arc::clone(&store), Arc::new(paths.clone())).router();
            app.servers.push(start_server_with_retry(
                "config",
                config_router,
                config.web.bind.clone(),
                config.web.config_port,
                RetryPolicy::default(),
            ));
            app.servers.push(start_server_with_retry(
                "reboot",
                reboot_router(Arc::clone(&store)),
                config.web.bind.clone(),
                config.web.reboot_port,
                RetryPolicy::default(),
            ));
        }

        let sources = FrameSources {
            weather: app.weather.summary(),
            stats: app.stats.summary(),
            heard: app.speech.heard(),
            started: Instant::now(),
        };
        if options.displays.terminal() {
            app.consumers.push(Consumer::spawn(
                TerminalRenderer::stdout(),
                Arc::clone(&store),
                sources.clone(),
            ));
        }
        if options.displays.oled() {
            match oled::open_device(&config.oled) {
                Ok(device) => app.consumers.push(Consumer::spawn(
                    OledRenderer::new(device),
                    Arc::clone(&store),
                    sources,
                )),
                Err(e) => warn!("OLED display inactive: {}", e),
            }
        }

        info!("Ribbon display running");
        Ok(app)
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn status(&self) -> AppStatus {
        AppStatus {
            consumers: self
                .consumers
                .iter()
                .map(|c| (c.name(), c.is_active()))
                .collect(),
            servers: self
                .servers
                .iter()
                .map(|s| (s.label(), s.status()))
                .collect(),
        }
    }

    /// Bound address of the listener labelled `label`, once it is up.
    pub fn listener_addr(&self, label: &str) -> Option<SocketAddr> {
        self.servers
            .iter()
            .find(|s| s.label() == label)
            .and_then(ServerHandle::local_addr)
    }

    /// Block until Ctrl-C (or SIGTERM on Unix), then shut down.
    pub async fn run_until_signal(self) -> anyhow::Result<()> {
        self.run_until(wait_for_signal()).await
    }

    /// Wait for `stop` to resolve, then shut down whatever it returned.
    ///
    /// An error from `stop` is returned only after shutdown has finished.
    pub async fn run_until<F>(self, stop: F) -> anyhow::Result<()>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let result = stop.await;
        match &result {
            Ok(()) => info!("Stop requested"),
            Err(e) => warn!("Stop wait failed, shutting down: {:#}", e),
        }
        self.shutdown().await;
        result
    }

    /// Stop consumers, then producers, then listeners.
    pub async fn shutdown(self) {
        let Self {
            weather,
            stats,
            speech,
            consumers,
            servers,
            ..
        } = self;

        for consumer in consumers {
            let name = consumer.name();
            log_join(name, consumer.stop().await);
        }
        if let Some(outcome) = weather.stop().await {
            log_join("weather", outcome);
        }
        if let Some(outcome) = stats.stop().await {
            log_join("system", outcome);
        }
        if let Some(outcome) = speech.stop().await {
            log_join("speech", outcome);
        }
        for server in servers {
            server.shutdown();
        }
        info!("All displays stopped");
    }
}

fn log_join(name: &str, outcome: JoinOutcome) {
    match outcome {
        JoinOutcome::Finished => {}
        JoinOutcome::Panicked => warn!("{} ended with a panic", name),
        JoinOutcome::TimedOut => warn!("{} did not stop in time, left detached", name),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
