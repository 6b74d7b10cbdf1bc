//! Configuration types and structures.
//!
//! The persisted document is a flexible JSON/YAML tree, but inside the process
//! it is always this typed struct. Unknown top-level sections are carried in
//! [`Config::extra`], and unknown keys inside a section in that section's own
//! `extra`, so a round-trip through the store never drops them.

use crate::paths::AppPaths;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Longest interval any refresh setting is honoured up to.
const MAX_INTERVAL: Duration = Duration::from_secs(86_400);

/// Convert a `refresh_s` style setting into a duration.
///
/// Negative, NaN and infinite values read as zero; very large values are capped
/// at one day so a typo cannot park a loop forever.
pub fn seconds(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs).min(MAX_INTERVAL)
    } else {
        Duration::ZERO
    }
}

/// Full configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub oled: OledConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub system: SystemConfig,
    /// Sections this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    /// Defaults with asset paths pointing into `paths`.
    pub fn defaults_for(paths: &AppPaths) -> Self {
        let mut config = Self::default();
        config.background.path = paths.background_path();
        config.audio.path = paths.boot_sound_path();
        config
    }

    /// The tree as a JSON document.
    pub fn to_value(&self) -> Value {
        // Every field is a plain map/list/scalar, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Terminal banner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// ANSI color escapes, indexed by the banner layout.
    #[serde(default = "default_colors")]
    pub colors: Vec<String>,
    #[serde(default = "default_render_refresh")]
    pub refresh_s: f64,
    /// Clear the whole screen each frame instead of homing the cursor.
    #[serde(default = "default_true")]
    pub clear_screen: bool,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            colors: default_colors(),
            refresh_s: default_render_refresh(),
            clear_screen: true,
            extra: Map::new(),
        }
    }
}

impl TerminalConfig {
    /// Color escape at `index`, or nothing when the list is shorter.
    pub fn color(&self, index: usize) -> &str {
        self.colors.get(index).map(String::as_str).unwrap_or("")
    }
}

fn default_font_size() -> u32 {
    24
}

fn default_colors() -> Vec<String> {
    (91..=97).map(|code| format!("\x1b[{code}m")).collect()
}

fn default_render_refresh() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// OLED panel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OledConfig {
    /// Bus type; only `i2c` is driven.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// I2C bus number (`/dev/i2c-<port>`).
    #[serde(default = "default_oled_port")]
    pub port: u8,
    #[serde(default = "default_oled_address")]
    pub address: u8,
    #[serde(default = "default_oled_width")]
    pub width: u32,
    #[serde(default = "default_oled_height")]
    pub height: u32,
    /// Rotation in degrees: 0, 90, 180 or 270.
    #[serde(default)]
    pub rotate: u16,
    #[serde(default = "default_render_refresh")]
    pub refresh_s: f64,
    #[serde(default)]
    pub font_sizes: FontSizes,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for OledConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            port: default_oled_port(),
            address: default_oled_address(),
            width: default_oled_width(),
            height: default_oled_height(),
            rotate: 0,
            refresh_s: default_render_refresh(),
            font_sizes: FontSizes::default(),
            extra: Map::new(),
        }
    }
}

fn default_interface() -> String {
    "i2c".to_string()
}

fn default_oled_port() -> u8 {
    1
}

fn default_oled_address() -> u8 {
    0x3C
}

fn default_oled_width() -> u32 {
    128
}

fn default_oled_height() -> u32 {
    64
}

/// Pixel heights requested for each OLED text line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSizes {
    #[serde(default = "default_time_font")]
    pub time: u32,
    #[serde(default = "default_small_font")]
    pub date: u32,
    #[serde(default = "default_small_font")]
    pub weather: u32,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for FontSizes {
    fn default() -> Self {
        Self {
            time: default_time_font(),
            date: default_small_font(),
            weather: default_small_font(),
            extra: Map::new(),
        }
    }
}

fn default_time_font() -> u32 {
    28
}

fn default_small_font() -> u32 {
    12
}

/// Temperature units for the weather line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Imperial,
    Metric,
}

impl Units {
    /// Parse a form value; anything unrecognised is imperial.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "metric" => Units::Metric,
            _ => Units::Imperial,
        }
    }

    /// Open-Meteo `temperature_unit` parameter.
    pub fn temperature_unit(self) -> &'static str {
        match self {
            Units::Imperial => "fahrenheit",
            Units::Metric => "celsius",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Units::Imperial => "°F",
            Units::Metric => "°C",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::Imperial => write!(f, "imperial"),
            Units::Metric => write!(f, "metric"),
        }
    }
}

/// Weather poller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default)]
    pub units: Units,
    /// Seconds between successful fetches (default: 300).
    #[serde(default = "default_weather_refresh")]
    pub refresh_s: f64,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latitude: default_latitude(),
            longitude: default_longitude(),
            units: Units::default(),
            refresh_s: default_weather_refresh(),
            extra: Map::new(),
        }
    }
}

fn default_latitude() -> f64 {
    37.7749
}

fn default_longitude() -> f64 {
    -122.4194
}

fn default_weather_refresh() -> f64 {
    300.0
}

/// OLED background image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_background_path")]
    pub path: PathBuf,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_background_path(),
            extra: Map::new(),
        }
    }
}

fn default_background_path() -> PathBuf {
    PathBuf::from("assets").join(crate::paths::BACKGROUND_FILE)
}

/// Boot sound and text-to-speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_boot_sound_path")]
    pub path: PathBuf,
    /// Players tried in order until one starts.
    #[serde(default = "default_players")]
    pub players: Vec<String>,
    /// Text-to-speech command; the text is appended as the last argument.
    #[serde(default = "default_tts_command")]
    pub tts_command: Vec<String>,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_boot_sound_path(),
            players: default_players(),
            tts_command: default_tts_command(),
            extra: Map::new(),
        }
    }
}

fn default_boot_sound_path() -> PathBuf {
    PathBuf::from("assets").join(crate::paths::BOOT_SOUND_FILE)
}

fn default_players() -> Vec<String> {
    vec!["aplay".to_string(), "paplay".to_string()]
}

fn default_tts_command() -> Vec<String> {
    vec!["espeak".to_string()]
}

/// Web listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_config_port")]
    pub config_port: u16,
    #[serde(default = "default_reboot_port")]
    pub reboot_port: u16,
    /// Command spawned, detached, by `POST /reboot`.
    #[serde(default = "default_reboot_command")]
    pub reboot_command: Vec<String>,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            config_port: default_config_port(),
            reboot_port: default_reboot_port(),
            reboot_command: default_reboot_command(),
            extra: Map::new(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_config_port() -> u16 {
    5000
}

fn default_reboot_port() -> u16 {
    500
}

fn default_reboot_command() -> Vec<String> {
    vec!["sudo".to_string(), "/sbin/reboot".to_string()]
}

/// Voice command listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_wake_word")]
    pub wake_word: String,
    /// Recognizer model directory, passed as the recognizer's last argument.
    #[serde(default)]
    pub model_path: PathBuf,
    /// Recognizer process printing one transcript per line.
    #[serde(default)]
    pub command: Vec<String>,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            wake_word: default_wake_word(),
            model_path: PathBuf::new(),
            command: Vec::new(),
            extra: Map::new(),
        }
    }
}

fn default_wake_word() -> String {
    "tom".to_string()
}

/// System stats poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_stats_refresh")]
    pub refresh_s: f64,
    /// Millidegree file read first; empty or unreadable falls back to sensors.
    #[serde(default = "default_thermal_zone")]
    pub thermal_zone: PathBuf,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            refresh_s: default_stats_refresh(),
            thermal_zone: default_thermal_zone(),
            extra: Map::new(),
        }
    }
}

fn default_stats_refresh() -> f64 {
    5.0
}

fn default_thermal_zone() -> PathBuf {
    PathBuf::from("/sys/class/thermal/thermal_zone0/temp")
}
