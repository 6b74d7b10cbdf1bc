//! Fire-and-forget audio: the boot sound and text-to-speech.
//!
//! Both spawn an external process and return immediately. The child is never
//! awaited; failures to start it are logged and swallowed.

use crate::config::AudioConfig;
use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Whether a process was launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// Started with the named program.
    Started(String),
    /// Nothing to do (disabled, empty input, missing file).
    Skipped(&'static str),
    /// Every candidate failed to start.
    Failed,
}

/// Play the configured boot sound with the first player that starts.
pub fn play_boot_sound(audio: &AudioConfig) -> Launch {
    if !audio.enabled {
        return Launch::Skipped("boot sound disabled");
    }
    if !audio.path.exists() {
        debug!("Boot sound {} not found", audio.path.display());
        return Launch::Skipped("boot sound file missing");
    }

    for player in &audio.players {
        match spawn_detached(player, &[audio.path.as_os_str()]) {
            Ok(()) => {
                info!("Playing boot sound with {}", player);
                return Launch::Started(player.clone());
            }
            Err(e) => debug!("Player {} unavailable: {}", player, e),
        }
    }

    warn!("No audio player could play {}", audio.path.display());
    Launch::Failed
}

/// Speak `text` through the configured text-to-speech command.
pub fn speak(audio: &AudioConfig, text: &str) -> Launch {
    let text = text.trim();
    if text.is_empty() {
        return Launch::Skipped("nothing to say");
    }
    let Some((program, args)) = audio.tts_command.split_first() else {
        return Launch::Skipped("tts_command is empty");
    };

    let mut argv: Vec<&OsStr> = args.iter().map(|a| OsStr::new(a.as_str())).collect();
    argv.push(OsStr::new(text));
    match spawn_detached(program, &argv) {
        Ok(()) => Launch::Started(program.clone()),
        Err(e) => {
            warn!("Text-to-speech via {} failed: {}", program, e);
            Launch::Failed
        }
    }
}

/// Spawn `program` with no stdio and let it run on its own.
pub(crate) fn spawn_detached(program: &str, args: &[&OsStr]) -> std::io::Result<()> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_child| ())
}
