//! Full-screen terminal banner.

use super::{Frame, Renderer};
use crate::config::{Config, seconds};
use crate::error::RenderError;
use crate::sysinfo::format_uptime;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::{Attribute, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};
use std::fmt::Write as _;
use std::io::{self, Write};

pub const TITLE: &str = "RASPBERRY PI 5 RIBBON DISPLAY";

const RESET: &str = "\x1b[0m";
const FALLBACK_WIDTH: u16 = 80;

/// Draws the banner to a terminal (stdout by default).
pub struct TerminalRenderer {
    out: Box<dyn Write + Send>,
    /// Fixed width; `None` asks the terminal each frame.
    width: Option<u16>,
    entered: bool,
}

impl TerminalRenderer {
    pub fn stdout() -> Self {
        Self {
            out: Box::new(io::stdout()),
            width: None,
            entered: false,
        }
    }

    /// Render into any sink at a fixed width.
    pub fn with_writer(out: Box<dyn Write + Send>, width: u16) -> Self {
        Self {
            out,
            width: Some(width),
            entered: false,
        }
    }

    fn width(&self) -> usize {
        let cols = self
            .width
            .unwrap_or_else(|| terminal::size().map(|(c, _)| c).unwrap_or(FALLBACK_WIDTH));
        usize::from(cols.max(1))
    }
}

/// The banner text for one frame, escapes included.
pub fn compose(frame: &Frame, width: usize) -> String {
    let term = &frame.config.terminal;
    let c = |i: usize| term.color(i);
    let bold = "\x1b[1m";
    let rule = "═".repeat(width);
    let thin = "─".repeat(width);
    let time = frame.now.format("%H:%M:%S").to_string();
    let date = frame.now.format("%A, %B %d, %Y").to_string();
    let info = format!(
        "CPU {}  |  MEM {}  |  UP {}",
        frame.stats.cpu_text(),
        frame.stats.memory_text(),
        format_uptime(frame.uptime)
    );

    let mut s = String::new();
    let _ = writeln!(s, "{}{}{RESET}", c(3), rule);
    let _ = writeln!(s, "{}{bold}{:^width$}{RESET}", c(6), TITLE);
    let _ = writeln!(s, "{}{}{RESET}", c(3), rule);
    let _ = writeln!(s);
    let _ = writeln!(s, "{}{bold}{:^width$}{RESET}", c(2), time);
    let _ = writeln!(s, "{}{:^width$}{RESET}", c(4), date);
    let _ = writeln!(s);
    let _ = writeln!(s, "{}{bold}{:^width$}{RESET}", c(5), frame.weather);
    if let Some(heard) = &frame.heard {
        let _ = writeln!(s, "{}{:^width$}{RESET}", c(1), format!("Heard: {heard}"));
    }
    let _ = writeln!(s);
    let _ = writeln!(s, "{}{}{RESET}", c(6), thin);
    let _ = writeln!(s, "{}{:^width$}{RESET}", c(6), info);
    let _ = writeln!(s, "{}{}{RESET}", c(6), thin);
    s
}

impl Renderer for TerminalRenderer {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn refresh_interval(&self, config: &Config) -> std::time::Duration {
        seconds(config.terminal.refresh_s)
    }

    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        if !self.entered {
            execute!(self.out, EnterAlternateScreen, Hide)?;
            self.entered = true;
        }
        if frame.config.terminal.clear_screen {
            queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        } else {
            queue!(self.out, MoveTo(0, 0))?;
        }
        let banner = compose(frame, self.width());
        self.out.write_all(banner.as_bytes())?;
        queue!(self.out, SetAttribute(Attribute::Reset))?;
        self.out.flush()?;
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.entered {
            let _ = execute!(self.out, Show, LeaveAlternateScreen);
            self.entered = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FrameSources;
    use crate::summary::Reading;
    use crate::sysinfo::SystemStats;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn frame() -> Frame {
        FrameSources::detached().frame(Config::default())
    }

    #[test]
    fn test_compose_contains_every_line() {
        let mut frame = frame();
        frame.stats = SystemStats {
            cpu_temp_c: Some(45.0),
            memory: None,
        };
        let banner = compose(&frame, 60);
        assert!(banner.contains(TITLE));
        assert!(banner.contains(&frame.now.format("%H:%M").to_string()));
        assert!(banner.contains("Weather: --"));
        assert!(banner.contains("CPU 45.0°C"));
        assert!(banner.contains("MEM N/A"));
        assert!(!banner.contains("Heard:"));
    }

    #[test]
    fn test_compose_shows_heard_text() {
        let sources = FrameSources::detached();
        sources.heard.publish(Reading::Ready("tom weather".to_string()));
        let banner = compose(&sources.frame(Config::default()), 60);
        assert!(banner.contains("Heard: tom weather"));
    }

    #[test]
    fn test_short_color_list_renders_uncolored() {
        let mut frame = frame();
        frame.config.terminal.colors = vec!["\x1b[91m".to_string()];
        let banner = compose(&frame, 40);
        assert!(banner.contains(TITLE));
        assert!(!banner.contains("\x1b[91m"));
    }

    #[test]
    fn test_render_and_shutdown_restore_screen() {
        let sink = Captured::default();
        let mut renderer = TerminalRenderer::with_writer(Box::new(sink.clone()), 50);
        renderer.render(&frame()).unwrap();
        renderer.render(&frame()).unwrap();
        renderer.shutdown();

        let out = sink.text();
        assert_eq!(out.matches("\x1b[?1049h").count(), 1);
        assert!(out.ends_with("\x1b[?1049l"));
        assert_eq!(out.matches(TITLE).count(), 2);
    }

    #[test]
    fn test_home_cursor_without_clear() {
        let sink = Captured::default();
        let mut renderer = TerminalRenderer::with_writer(Box::new(sink.clone()), 50);
        let mut frame = frame();
        frame.config.terminal.clear_screen = false;
        renderer.render(&frame).unwrap();
        assert!(!sink.text().contains("\x1b[2J"));
    }
}
