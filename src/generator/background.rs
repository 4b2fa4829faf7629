/*
 *  generator/background.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Background sources: still image, animated GIF, image directory
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

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, RgbImage};
use log::{debug, warn};

use crate::config::{BackgroundConfig, BackgroundKind, ConfigError};
use crate::generator::GeneratorError;

/// Display time of a still image or collection entry
pub const STILL_DURATION: Duration = Duration::from_secs(1);

/// Used when a GIF frame carries no delay
pub const GIF_DEFAULT_DELAY: Duration = Duration::from_millis(100);

const COLLECTION_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// Source of background frames, all already at output geometry
pub enum Background {
    Still(RgbImage),
    Animated {
        frames: Vec<(RgbImage, Duration)>,
        cursor: usize,
    },
    /// Entries are decoded on demand, one per pull
    Collection {
        paths: Vec<PathBuf>,
        cursor: usize,
        width: u32,
        height: u32,
    },
}

fn missing(path: &Path, reason: impl ToString) -> GeneratorError {
    GeneratorError::Config(ConfigError::Asset { path: path.to_path_buf(), reason: reason.to_string() })
}

fn fit(img: DynamicImage, width: u32, height: u32) -> RgbImage {
    if img.width() == width && img.height() == height {
        return img.to_rgb8();
    }
    img.resize_exact(width, height, FilterType::Lanczos3).to_rgb8()
}

/// Decode any still format and scale it to the panel
pub fn open_image(path: &Path, width: u32, height: u32) -> Result<RgbImage, GeneratorError> {
    if !path.is_file() {
        return Err(missing(path, "no such file"));
    }
    let img = image::open(path).map_err(|e| GeneratorError::decode(path, e))?;
    Ok(fit(img, width, height))
}

fn load_gif(path: &Path, width: u32, height: u32) -> Result<Vec<(RgbImage, Duration)>, GeneratorError> {
    let file = File::open(path).map_err(|e| missing(path, e))?;
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| GeneratorError::decode(path, e))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| GeneratorError::decode(path, e))?;

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (num, den) = frame.delay().numer_denom_ms();
            let ms = if den == 0 { 0 } else { num / den };
            let delay = if ms == 0 { GIF_DEFAULT_DELAY } else { Duration::from_millis(ms as u64) };
            (fit(DynamicImage::ImageRgba8(frame.into_buffer()), width, height), delay)
        })
        .collect())
}

fn list_collection(dir: &Path) -> Result<Vec<PathBuf>, GeneratorError> {
    let entries = fs::read_dir(dir).map_err(|e| missing(dir, e))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| COLLECTION_EXTENSIONS.contains(&x.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

impl Background {
    pub fn load(cfg: &BackgroundConfig, width: u32, height: u32) -> Result<Self, GeneratorError> {
        let path = cfg.path.as_path();
        let bg = match cfg.kind {
            BackgroundKind::Image => Background::Still(open_image(path, width, height)?),
            BackgroundKind::Video => {
                warn!("Video backgrounds are not supported, showing {} as a still", path.display());
                Background::Still(open_image(path, width, height)?)
            }
            BackgroundKind::Gif => {
                let frames = load_gif(path, width, height)?;
                if frames.is_empty() {
                    return Err(GeneratorError::Empty { path: path.to_path_buf() });
                }
                Background::Animated { frames, cursor: 0 }
            }
            BackgroundKind::ImageCollection => {
                let paths = list_collection(path)?;
                if paths.is_empty() {
                    return Err(GeneratorError::Empty { path: path.to_path_buf() });
                }
                Background::Collection { paths, cursor: 0, width, height }
            }
        };
        debug!("Background {:?} loaded from {}", cfg.kind, path.display());
        Ok(bg)
    }

    /// Number of distinct frames in the cycle
    pub fn len(&self) -> usize {
        match self {
            Background::Still(_) => 1,
            Background::Animated { frames, .. } => frames.len(),
            Background::Collection { paths, .. } => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current frame and its delay, then advance by one
    pub fn next_frame(&mut self) -> Result<(RgbImage, Duration), GeneratorError> {
        match self {
            Background::Still(img) => Ok((img.clone(), STILL_DURATION)),
            Background::Animated { frames, cursor } => {
                let (img, delay) = &frames[*cursor];
                *cursor = (*cursor + 1) % frames.len();
                Ok((img.clone(), *delay))
            }
            Background::Collection { paths, cursor, width, height } => {
                let path = &paths[*cursor];
                *cursor = (*cursor + 1) % paths.len();
                Ok((open_image(path, *width, *height)?, STILL_DURATION))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgb, Rgba, RgbaImage};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trlcd-bg-{}-{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_still_repeats_with_one_second() {
        let dir = scratch("still");
        let path = dir.join("bg.png");
        RgbImage::from_pixel(3, 3, Rgb([9, 9, 9])).save(&path).unwrap();

        let cfg = BackgroundConfig { path, kind: BackgroundKind::Image };
        let mut bg = Background::load(&cfg, 6, 4).unwrap();
        for _ in 0..3 {
            let (img, d) = bg.next_frame().unwrap();
            assert_eq!(img.dimensions(), (6, 4));
            assert_eq!(d, STILL_DURATION);
        }
    }

    #[test]
    fn test_gif_frames_carry_their_delays() {
        let dir = scratch("gif");
        let path = dir.join("anim.gif");
        {
            let file = File::create(&path).unwrap();
            let mut enc = GifEncoder::new(file);
            let a = Frame::from_parts(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])), 0, 0, Delay::from_numer_denom_ms(200, 1));
            let b = Frame::from_parts(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])), 0, 0, Delay::from_numer_denom_ms(0, 1));
            enc.encode_frames(vec![a, b]).unwrap();
        }

        let cfg = BackgroundConfig { path, kind: BackgroundKind::Gif };
        let mut bg = Background::load(&cfg, 4, 4).unwrap();
        assert_eq!(bg.len(), 2);
        assert_eq!(bg.next_frame().unwrap().1, Duration::from_millis(200));
        assert_eq!(bg.next_frame().unwrap().1, GIF_DEFAULT_DELAY);
        // wraps
        assert_eq!(bg.next_frame().unwrap().1, Duration::from_millis(200));
    }

    #[test]
    fn test_collection_sorted_and_filtered() {
        let dir = scratch("coll");
        RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])).save(dir.join("b.png")).unwrap();
        RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])).save(dir.join("a.PNG")).unwrap();
        fs::write(dir.join("notes.txt"), "skip me").unwrap();

        let cfg = BackgroundConfig { path: dir, kind: BackgroundKind::ImageCollection };
        let mut bg = Background::load(&cfg, 2, 2).unwrap();
        assert_eq!(bg.len(), 2);
        let (first, _) = bg.next_frame().unwrap();
        assert_eq!(first.get_pixel(0, 0), &Rgb([255, 255, 255]));
        let (second, _) = bg.next_frame().unwrap();
        assert_eq!(second.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_empty_collection() {
        let dir = scratch("empty");
        let cfg = BackgroundConfig { path: dir, kind: BackgroundKind::ImageCollection };
        assert!(matches!(Background::load(&cfg, 2, 2), Err(GeneratorError::Empty { .. })));
    }
}
