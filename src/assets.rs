//! First-start assets: the assets directory, a background converted from the
//! bundled default image, and a short generated boot beep.
//!
//! Existing files are never overwritten, so uploads made through the config
//! page survive restarts.

use crate::error::AssetError;
use crate::paths::AppPaths;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::TAU;
use std::path::Path;
use tracing::{debug, info};

pub const BEEP_SAMPLE_RATE: u32 = 44_100;
pub const BEEP_FREQUENCY_HZ: f32 = 880.0;
pub const BEEP_MILLIS: u32 = 180;
const BEEP_AMPLITUDE: f32 = 0.4;

/// What [`ensure_default_assets`] created on this call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreparedAssets {
    pub background_converted: bool,
    pub beep_written: bool,
}

/// Create whatever default assets are missing. Idempotent.
pub fn ensure_default_assets(paths: &AppPaths) -> Result<PreparedAssets, AssetError> {
    std::fs::create_dir_all(&paths.assets_dir)?;
    let mut prepared = PreparedAssets::default();

    let background = paths.background_path();
    if !background.exists() && paths.default_background.exists() {
        convert_background(&paths.default_background, &background)?;
        info!("Converted default background to {}", background.display());
        prepared.background_converted = true;
    }

    let boot_sound = paths.boot_sound_path();
    if !boot_sound.exists() {
        write_beep(&boot_sound)?;
        info!("Wrote default boot beep to {}", boot_sound.display());
        prepared.beep_written = true;
    }

    debug!("Assets ready in {}", paths.assets_dir.display());
    Ok(prepared)
}

/// Re-encode any supported image as PNG.
pub fn convert_background(source: &Path, target: &Path) -> Result<(), AssetError> {
    let image = image::open(source)?;
    image.save_with_format(target, image::ImageFormat::Png)?;
    Ok(())
}

/// 16-bit mono sine burst.
pub fn write_beep(target: &Path) -> Result<(), AssetError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: BEEP_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(target, spec)?;
    let samples = BEEP_SAMPLE_RATE * BEEP_MILLIS / 1000;
    for n in 0..samples {
        let t = n as f32 / BEEP_SAMPLE_RATE as f32;
        let value = BEEP_AMPLITUDE * (TAU * BEEP_FREQUENCY_HZ * t).sin();
        writer.write_sample((value * f32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
