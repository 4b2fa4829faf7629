/*
 *  generator/overlay.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Foreground image, metric readouts and date/time stamps drawn over the
 *  background
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

use chrono::NaiveDateTime;
use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10, FONT_8X13, FONT_9X15};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use image::{Rgb, RgbImage, RgbaImage};
use log::{info, warn};

use crate::canvas::{blend, Canvas};
use crate::config::{DisplayTheme, HexColor, MetricConfig, Position, TextConfig};
use crate::generator::GeneratorError;
use crate::metrics::{format_metric, MachineMetrics, MetricKind};

pub const DATE_FORMAT: &str = "%d/%m";
pub const TIME_FORMAT: &str = "%H:%M";

// glyph height -> font, ascending
const FONTS: &[(u32, &MonoFont<'static>)] = &[
    (10, &FONT_6X10),
    (13, &FONT_8X13),
    (15, &FONT_9X15),
    (20, &FONT_10X20),
];

/// Closest built-in mono font to a requested pixel size
pub fn font_for(size: u32) -> &'static MonoFont<'static> {
    let mut best = FONTS[0];
    for &candidate in FONTS {
        if candidate.0.abs_diff(size) < best.0.abs_diff(size) {
            best = candidate;
        }
    }
    best.1
}

struct Foreground {
    image: RgbaImage,
    position: Position,
    alpha: f32,
}

fn draw_text(img: &mut RgbImage, text: &str, position: Position, font: &'static MonoFont<'static>, color: HexColor) {
    let [r, g, b] = color.rgb();
    let style = MonoTextStyle::new(font, Rgb888::new(r, g, b));
    let mut canvas = Canvas::new(img, color.alpha());
    let origin = Point::new(position.x, position.y);
    let _ = Text::with_baseline(text, origin, style, Baseline::Top).draw(&mut canvas);
}

struct Stamp {
    format: &'static str,
    position: Position,
    font: &'static MonoFont<'static>,
    color: HexColor,
}

impl Stamp {
    fn from_config(format: &'static str, cfg: &TextConfig) -> Option<Self> {
        cfg.enabled.then(|| Stamp {
            format,
            position: cfg.position,
            font: font_for(cfg.font_size),
            color: cfg.color,
        })
    }

    fn draw(&self, img: &mut RgbImage, now: NaiveDateTime) {
        let text = now.format(self.format).to_string();
        draw_text(img, &text, self.position, self.font, self.color);
    }
}

/// Live readout of one metric
struct MetricStamp {
    kind: MetricKind,
    label: String,
    unit: String,
    format: String,
    position: Position,
    font: &'static MonoFont<'static>,
    color: HexColor,
}

impl MetricStamp {
    fn from_config(cfg: &MetricConfig) -> Option<Self> {
        let kind = MetricKind::from_name(&cfg.name)?;
        Some(MetricStamp {
            kind,
            label: cfg.label.clone(),
            unit: cfg.unit.clone(),
            format: cfg.format_string.clone(),
            position: cfg.position,
            font: font_for(cfg.font_size),
            color: cfg.color,
        })
    }

    /// Unread metrics are skipped
    fn draw(&self, img: &mut RgbImage, metrics: &MachineMetrics) {
        if let Some(value) = metrics.value(self.kind) {
            let text = format_metric(&self.format, &self.label, value, &self.unit);
            draw_text(img, &text, self.position, self.font, self.color);
        }
    }
}

/// Everything drawn on top of the background, in paint order
pub struct Overlay {
    foreground: Option<Foreground>,
    metrics: Vec<MetricStamp>,
    date: Option<Stamp>,
    time: Option<Stamp>,
}

impl Overlay {
    pub fn from_theme(theme: &DisplayTheme) -> Result<Self, GeneratorError> {
        let fg = &theme.foreground;
        let foreground = match (&fg.path, fg.enabled) {
            (Some(path), true) => match image::open(path) {
                Ok(img) => Some(Foreground { image: img.to_rgba8(), position: fg.position, alpha: fg.alpha }),
                Err(e) => {
                    // a broken overlay is cosmetic, keep streaming the background
                    warn!("Cannot load foreground image {}: {}", path.display(), e);
                    None
                }
            },
            _ => None,
        };

        let mut metrics = Vec::new();
        if theme.metrics.enabled {
            let mut unavailable = Vec::new();
            for cfg in theme.metrics.configs.iter().filter(|m| m.enabled) {
                match MetricStamp::from_config(cfg) {
                    Some(stamp) => metrics.push(stamp),
                    None => unavailable.push(cfg.name.as_str()),
                }
            }
            if !unavailable.is_empty() {
                info!("Metric overlays not available on this host: {}", unavailable.join(", "));
            }
        }

        Ok(Self {
            foreground,
            metrics,
            date: Stamp::from_config(DATE_FORMAT, &theme.date),
            time: Stamp::from_config(TIME_FORMAT, &theme.time),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.foreground.is_none() && self.metrics.is_empty() && self.date.is_none() && self.time.is_none()
    }

    /// Whether any drawn element needs sensor readings
    pub fn has_metrics(&self) -> bool {
        !self.metrics.is_empty()
    }

    pub fn apply(&self, img: &mut RgbImage, now: NaiveDateTime, metrics: &MachineMetrics) {
        if let Some(fg) = &self.foreground {
            composite(img, &fg.image, fg.position, fg.alpha);
        }
        for stamp in &self.metrics {
            stamp.draw(img, metrics);
        }
        for stamp in [&self.date, &self.time].into_iter().flatten() {
            stamp.draw(img, now);
        }
    }
}

/// Paste `src` at `pos` using its own alpha scaled by `alpha`
pub fn composite(dst: &mut RgbImage, src: &RgbaImage, pos: Position, alpha: f32) {
    let scale = alpha.clamp(0.0, 1.0);
    for (x, y, px) in src.enumerate_pixels() {
        let (tx, ty) = (pos.x + x as i32, pos.y + y as i32);
        if tx < 0 || ty < 0 || tx as u32 >= dst.width() || ty as u32 >= dst.height() {
            continue;
        }
        let a = (px.0[3] as f32 * scale).round() as u8;
        if a == 0 {
            continue;
        }
        let under = dst.get_pixel_mut(tx as u32, ty as u32);
        let Rgb([r, g, b]) = *under;
        *under = Rgb([blend(px.0[0], r, a), blend(px.0[1], g, a), blend(px.0[2], b, a)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use image::Rgba;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap().and_hms_opt(12, 34, 0).unwrap()
    }

    #[test]
    fn test_font_selection() {
        assert_eq!(font_for(8).character_size, FONT_6X10.character_size);
        assert_eq!(font_for(14).character_size, FONT_8X13.character_size);
        assert_eq!(font_for(48).character_size, FONT_10X20.character_size);
    }

    #[test]
    fn test_composite_respects_alpha_and_bounds() {
        let mut dst = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let src = RgbaImage::from_pixel(3, 3, Rgba([255, 255, 255, 255]));
        composite(&mut dst, &src, Position { x: 2, y: -1 }, 0.5);
        assert_eq!(dst.get_pixel(2, 0), &Rgb([128, 128, 128]));
        assert_eq!(dst.get_pixel(3, 1), &Rgb([128, 128, 128]));
        assert_eq!(dst.get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert_eq!(dst.get_pixel(2, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_time_stamp_draws_in_colour() {
        let cfg = TextConfig {
            enabled: true,
            position: Position { x: 0, y: 0 },
            font_size: 20,
            color: HexColor([255, 0, 0, 255]),
        };
        let stamp = Stamp::from_config(TIME_FORMAT, &cfg).unwrap();
        let mut img = RgbImage::new(64, 24);
        stamp.draw(&mut img, noon());
        assert!(img.pixels().any(|p| *p == Rgb([255, 0, 0])));
        assert!(img.pixels().all(|p| p.0[1] == 0 && p.0[2] == 0));
    }

    fn cpu_temp_config(enabled: bool) -> MetricConfig {
        MetricConfig {
            name: "cpu_temperature".to_string(),
            label: "CPU".to_string(),
            position: Position { x: 2, y: 2 },
            font_size: 13,
            color: HexColor([0, 255, 0, 255]),
            format_string: "{label}{value:.0f}{unit}".to_string(),
            unit: "C".to_string(),
            enabled,
        }
    }

    fn theme_with(configs: Vec<MetricConfig>) -> DisplayTheme {
        let yaml = "background:\n  path: bg.png\n  type: image\n";
        let mut theme: DisplayTheme = serde_yaml::from_str(yaml).unwrap();
        theme.metrics.enabled = true;
        theme.metrics.configs = configs;
        theme
    }

    #[test]
    fn test_enabled_metric_changes_pixels() {
        let overlay = Overlay::from_theme(&theme_with(vec![cpu_temp_config(true)])).unwrap();
        assert!(overlay.has_metrics());

        let reading = MachineMetrics { cpu_temp: Some(54.0), ..Default::default() };
        let mut img = RgbImage::new(96, 24);
        overlay.apply(&mut img, noon(), &reading);
        assert!(img.pixels().any(|p| *p == Rgb([0, 255, 0])));

        // nothing read, nothing drawn
        let mut blank = RgbImage::new(96, 24);
        overlay.apply(&mut blank, noon(), &MachineMetrics::default());
        assert!(blank.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_unknown_and_disabled_metrics_dropped() {
        let mut gpu = cpu_temp_config(true);
        gpu.name = "gpu_temperature".to_string();
        let overlay = Overlay::from_theme(&theme_with(vec![gpu, cpu_temp_config(false)])).unwrap();
        assert!(!overlay.has_metrics());
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_disabled_stamp_is_skipped() {
        assert!(Stamp::from_config(DATE_FORMAT, &TextConfig::default()).is_none());
        assert_eq!(noon().format(DATE_FORMAT).to_string(), "07/03");
    }
}
