//! HTML templates for the config and reboot pages.
//!
//! Templates are embedded at compile time using `include_str!`; `{{name}}`
//! placeholders are filled by [`fill`].

use crate::config::{Config, Units};

/// Settings form served by the config listener.
pub const CONFIG_TEMPLATE: &str = include_str!("templates/config.html");

/// Single-button page served by the reboot listener.
pub const REBOOT_TEMPLATE: &str = include_str!("templates/reboot.html");

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Replace each `{{key}}` with its value. Values are inserted verbatim.
pub fn fill(template: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(template.to_string(), |page, (key, value)| {
        page.replace(&format!("{{{{{key}}}}}"), value)
    })
}

/// Banner shown above the form after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

impl Notice {
    fn to_html(&self) -> String {
        match self {
            Notice::Info(text) => format!(r#"<p class="notice">{}</p>"#, html_escape(text)),
            Notice::Error(text) => {
                format!(r#"<p class="notice error">{}</p>"#, html_escape(text))
            }
        }
    }
}

fn flag(on: bool, attr: &str) -> String {
    if on { attr.to_string() } else { String::new() }
}

/// The settings form pre-filled from `config`.
pub fn config_page(config: &Config, notice: Option<&Notice>) -> String {
    let weather = &config.weather;
    fill(
        CONFIG_TEMPLATE,
        &[
            ("notice", notice.map(Notice::to_html).unwrap_or_default()),
            ("latitude", weather.latitude.to_string()),
            ("longitude", weather.longitude.to_string()),
            (
                "imperial_selected",
                flag(weather.units == Units::Imperial, "selected"),
            ),
            (
                "metric_selected",
                flag(weather.units == Units::Metric, "selected"),
            ),
            ("weather_checked", flag(weather.enabled, "checked")),
            ("background_checked", flag(config.background.enabled, "checked")),
            (
                "background_path",
                html_escape(&config.background.path.display().to_string()),
            ),
            ("audio_checked", flag(config.audio.enabled, "checked")),
            (
                "audio_path",
                html_escape(&config.audio.path.display().to_string()),
            ),
            ("reboot_port", config.web.reboot_port.to_string()),
        ],
    )
}

/// Short result page with a link back to the form.
pub fn message_page(message: &str) -> String {
    format!(
        "<p>{}</p><p><a href='/'>Back</a></p>",
        html_escape(message)
    )
}
