/*
 *  generator/mod.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Theme-driven frame generator
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

pub mod background;
pub mod overlay;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use image::RgbImage;
use log::debug;
use thiserror::Error;

use crate::config::{self, ConfigError, ThemeConfig};
use crate::metrics::MetricsSampler;
use background::Background;
use overlay::Overlay;

/// Failures while building a generator or producing a frame
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("background {} has no usable frames", path.display())]
    Empty { path: PathBuf },
}

impl GeneratorError {
    pub(crate) fn decode(path: &Path, source: image::ImageError) -> Self {
        GeneratorError::Decode { path: path.to_path_buf(), source }
    }
}

/// One rendered image and how long it stays on the panel
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub duration: Duration,
}

/// Produces the frames a session streams
pub trait FrameGenerator {
    fn next_frame(&mut self) -> Result<Frame, GeneratorError>;
}

/// Builds generators from a theme file with forced output geometry
pub trait GeneratorFactory {
    type Generator: FrameGenerator;

    fn build(&self, path: &Path, width: u32, height: u32) -> Result<Self::Generator, GeneratorError>;
}

/// Background plus overlays, sized for one panel
pub struct DisplayGenerator {
    background: Background,
    overlay: Overlay,
    sampler: Option<MetricsSampler>,
    width: u32,
    height: u32,
}

impl DisplayGenerator {
    pub fn from_theme(theme: &ThemeConfig, width: u32, height: u32) -> Result<Self, GeneratorError> {
        let display = &theme.display;
        let background = Background::load(&display.background, width, height)?;
        let overlay = Overlay::from_theme(display)?;
        let sampler = overlay.has_metrics().then(MetricsSampler::new);
        debug!("Generator ready: {} background frames at {}x{}", background.len(), width, height);

        Ok(Self { background, overlay, sampler, width, height })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameGenerator for DisplayGenerator {
    fn next_frame(&mut self) -> Result<Frame, GeneratorError> {
        let (mut image, duration) = self.background.next_frame()?;
        let metrics = self.sampler.as_mut().map(|s| s.sample()).unwrap_or_default();
        self.overlay.apply(&mut image, Local::now().naive_local(), &metrics);
        Ok(Frame { image, duration })
    }
}

/// Production factory, loads the theme through `config::load`
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayGeneratorFactory;

impl GeneratorFactory for DisplayGeneratorFactory {
    type Generator = DisplayGenerator;

    fn build(&self, path: &Path, width: u32, height: u32) -> Result<DisplayGenerator, GeneratorError> {
        let theme = config::load(path)?;
        DisplayGenerator::from_theme(&theme, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackgroundConfig, BackgroundKind, DisplayTheme};
    use image::Rgb;

    fn theme_for(path: PathBuf, kind: BackgroundKind) -> ThemeConfig {
        ThemeConfig {
            display: DisplayTheme {
                background: BackgroundConfig { path, kind },
                foreground: Default::default(),
                metrics: Default::default(),
                date: Default::default(),
                time: Default::default(),
            },
        }
    }

    #[test]
    fn test_output_geometry_is_forced() {
        let path = std::env::temp_dir().join(format!("trlcd-gen-{}.png", std::process::id()));
        RgbImage::from_pixel(17, 9, Rgb([1, 2, 3])).save(&path).unwrap();

        let mut generator = DisplayGenerator::from_theme(&theme_for(path.clone(), BackgroundKind::Image), 32, 24).unwrap();
        let frame = generator.next_frame().unwrap();
        assert_eq!(frame.image.dimensions(), (32, 24));
        assert_eq!(frame.duration, Duration::from_secs(1));
        assert_eq!(generator.dimensions(), (32, 24));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_missing_background_is_asset_error() {
        let theme = theme_for(PathBuf::from("/nonexistent/bg.png"), BackgroundKind::Image);
        let err = DisplayGenerator::from_theme(&theme, 8, 8).err().unwrap();
        assert!(matches!(err, GeneratorError::Config(ConfigError::Asset { .. })));
    }
}
