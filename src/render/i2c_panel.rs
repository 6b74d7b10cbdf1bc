//! SSD1306 panel on a Linux I2C bus.

use super::oled::{FrameBuffer, OledDevice};
use crate::config::OledConfig;
use crate::error::RenderError;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Size};
use linux_embedded_hal::I2cdev;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::size::DisplaySize128x64;
use ssd1306::{I2CDisplayInterface, Ssd1306};
use tracing::info;

type Panel = Ssd1306<I2CInterface<I2cdev>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub(super) struct Ssd1306Device {
    panel: Panel,
}

fn device_error(e: impl std::fmt::Debug) -> RenderError {
    RenderError::Device(format!("{e:?}"))
}

fn rotation(degrees: u16) -> DisplayRotation {
    match degrees % 360 {
        90 => DisplayRotation::Rotate90,
        180 => DisplayRotation::Rotate180,
        270 => DisplayRotation::Rotate270,
        _ => DisplayRotation::Rotate0,
    }
}

impl Ssd1306Device {
    pub(super) fn open(config: &OledConfig) -> Result<Self, RenderError> {
        if !config.interface.eq_ignore_ascii_case("i2c") {
            return Err(RenderError::Unavailable(format!(
                "interface `{}` is not supported",
                config.interface
            )));
        }
        if (config.width, config.height) != (128, 64) {
            return Err(RenderError::Unavailable(format!(
                "{}x{} panels are not supported",
                config.width, config.height
            )));
        }

        let bus = format!("/dev/i2c-{}", config.port);
        let i2c = I2cdev::new(&bus).map_err(|e| RenderError::Device(format!("{bus}: {e}")))?;
        let interface = I2CDisplayInterface::new_custom_address(i2c, config.address);
        let mut panel = Ssd1306::new(interface, DisplaySize128x64, rotation(config.rotate))
            .into_buffered_graphics_mode();
        panel.init().map_err(device_error)?;
        panel.clear_buffer();
        panel.flush().map_err(device_error)?;

        info!("OLED initialized on {} at {:#04x}", bus, config.address);
        Ok(Self { panel })
    }
}

impl OledDevice for Ssd1306Device {
    fn size(&self) -> Size {
        OriginDimensions::size(&self.panel)
    }

    fn present(&mut self, frame: &FrameBuffer) -> Result<(), RenderError> {
        self.panel.clear_buffer();
        self.panel
            .draw_iter(frame.lit_pixels())
            .map_err(device_error)?;
        self.panel.flush().map_err(device_error)
    }

    fn release(&mut self) {
        self.panel.clear_buffer();
        let _ = self.panel.flush();
        let _ = self.panel.set_display_on(false);
    }
}
