//! Voice commands from an external recognizer process.
//!
//! The recognizer is any program that prints one transcript per line on
//! stdout (for example a Vosk wrapper); the configured model directory is
//! passed as its last argument. Transcripts are published as the last-heard
//! text, and those that start with the wake word are dispatched as commands.

use crate::config::{ConfigStore, SpeechConfig};
use crate::error::SpeechError;
use crate::summary::{Reading, SharedSummary};
use crate::task::{JOIN_TIMEOUT, JoinOutcome, TaskHandle, stop_slot};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Source of transcripts.
#[async_trait]
pub trait Recognizer: Send {
    /// Next transcript, or `None` once the recognizer has ended.
    async fn next_transcript(&mut self) -> Option<String>;
}

/// Builds a recognizer from the speech section.
pub type RecognizerFactory =
    Arc<dyn Fn(&SpeechConfig) -> Result<Box<dyn Recognizer>, SpeechError> + Send + Sync>;

/// Receives the text after the wake word.
pub type CommandHandler = Arc<dyn Fn(VoiceCommand) + Send + Sync>;

/// A parsed voice command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    /// Speak the current time.
    Time,
    /// Speak the weather line.
    Weather,
    /// Speak the given text.
    Say(String),
    Other(String),
}

impl VoiceCommand {
    pub fn parse(command: &str) -> Self {
        let command = command.trim();
        match command {
            "time" | "what time is it" => VoiceCommand::Time,
            "weather" => VoiceCommand::Weather,
            _ => match command.strip_prefix("say ") {
                Some(text) if !text.trim().is_empty() => {
                    VoiceCommand::Say(text.trim().to_string())
                }
                _ => VoiceCommand::Other(command.to_string()),
            },
        }
    }
}

/// Text after `"<wake> "`, when the transcript is addressed to us.
pub fn strip_wake_word<'a>(text: &'a str, wake_word: &str) -> Option<&'a str> {
    let wake = match wake_word.trim() {
        "" => "tom".to_string(),
        word => word.to_lowercase(),
    };
    let rest = text.strip_prefix(wake.as_str())?.strip_prefix(' ')?.trim();
    (!rest.is_empty()).then_some(rest)
}

/// Recognizer backed by a child process.
pub struct ProcessRecognizer {
    // Held so the child is killed when the recognizer is dropped.
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl ProcessRecognizer {
    pub fn spawn(config: &SpeechConfig) -> Result<Self, SpeechError> {
        if config.model_path.as_os_str().is_empty() || !config.model_path.exists() {
            return Err(SpeechError::ModelMissing(config.model_path.clone()));
        }
        let (program, args) = config
            .command
            .split_first()
            .ok_or(SpeechError::NoRecognizer)?;

        let mut child = Command::new(program)
            .args(args)
            .arg(&config.model_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpeechError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| SpeechError::Spawn {
            program: program.clone(),
            source: std::io::Error::other("stdout not captured"),
        })?;

        Ok(Self {
            _child: child,
            lines: BufReader::new(stdout).lines(),
        })
    }

    /// Factory suitable for [`SpeechListener::new`].
    pub fn factory() -> RecognizerFactory {
        Arc::new(|config: &SpeechConfig| {
            Ok(Box::new(ProcessRecognizer::spawn(config)?) as Box<dyn Recognizer>)
        })
    }
}

#[async_trait]
impl Recognizer for ProcessRecognizer {
    async fn next_transcript(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!("Recognizer output unreadable: {}", e);
                None
            }
        }
    }
}

/// Background listener publishing the last heard transcript.
pub struct SpeechListener {
    store: Arc<ConfigStore>,
    factory: RecognizerFactory,
    on_command: CommandHandler,
    heard: SharedSummary<String>,
    task: Mutex<Option<TaskHandle>>,
}

impl SpeechListener {
    pub fn new(
        store: Arc<ConfigStore>,
        factory: RecognizerFactory,
        on_command: CommandHandler,
    ) -> Self {
        Self {
            store,
            factory,
            on_command,
            heard: SharedSummary::new(),
            task: Mutex::new(None),
        }
    }

    /// Reader handle for the last heard transcript.
    pub fn heard(&self) -> SharedSummary<String> {
        self.heard.clone()
    }

    /// Spawn the listener. A no-op while it is alive.
    pub fn start(&self) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let config = self.store.snapshot().speech;
        let factory = Arc::clone(&self.factory);
        let on_command = Arc::clone(&self.on_command);
        let heard = self.heard.clone();

        *slot = Some(TaskHandle::spawn("speech", move |mut stop| async move {
            if !config.enabled {
                heard.publish(Reading::Disabled);
                return;
            }
            let mut recognizer = match factory(&config) {
                Ok(recognizer) => recognizer,
                Err(e) => {
                    warn!("Speech listener not started: {}", e);
                    return;
                }
            };
            info!("Listening for wake word '{}'", config.wake_word);

            loop {
                let transcript = tokio::select! {
                    _ = stop.stopped() => break,
                    transcript = recognizer.next_transcript() => transcript,
                };
                let Some(transcript) = transcript else {
                    info!("Recognizer ended");
                    break;
                };

                let text = transcript.trim().to_lowercase();
                if text.is_empty() {
                    continue;
                }
                debug!("Heard: {}", text);
                heard.publish(Reading::Ready(text.clone()));
                if let Some(command) = strip_wake_word(&text, &config.wake_word) {
                    on_command(VoiceCommand::parse(command));
                }
            }
        }));
    }

    pub async fn stop(&self) -> Option<JoinOutcome> {
        stop_slot(&self.task, JOIN_TIMEOUT).await
    }
}
