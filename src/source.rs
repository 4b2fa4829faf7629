/*
 *  source.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Pull-based frame source with theme hot reload
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

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info};

use crate::config::ConfigError;
use crate::display::error::SessionError;
use crate::generator::{Frame, FrameGenerator, GeneratorError, GeneratorFactory};

/// Wraps a generator factory and rebuilds on theme file changes.
///
/// The modification time is compared before every pull; there is no file
/// watcher. A replacement generator is fully built before the old one is
/// dropped, and a failed rebuild is returned to the caller.
pub struct FrameSource<F: GeneratorFactory> {
    path: PathBuf,
    width: u32,
    height: u32,
    factory: F,
    generator: Option<F::Generator>,
    loaded_at: Option<SystemTime>,
    builds: u64,
}

fn into_session_error(err: GeneratorError) -> SessionError {
    match err {
        GeneratorError::Config(e) => SessionError::Configuration(e),
        other => SessionError::Generator(other),
    }
}

impl<F: GeneratorFactory> FrameSource<F> {
    /// Nothing is built until the first pull
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, factory: F) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            factory,
            generator: None,
            loaded_at: None,
            builds: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of generator (re)builds so far
    pub fn builds(&self) -> u64 {
        self.builds
    }

    fn modified(&self) -> Result<SystemTime, SessionError> {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| SessionError::Configuration(ConfigError::io(&self.path, e)))
    }

    fn is_stale(&self, mtime: SystemTime) -> bool {
        match (&self.generator, self.loaded_at) {
            (Some(_), Some(loaded)) => mtime > loaded,
            _ => true,
        }
    }

    fn rebuild(&mut self, mtime: SystemTime) -> Result<(), SessionError> {
        let fresh = self
            .factory
            .build(&self.path, self.width, self.height)
            .map_err(into_session_error)?;
        self.generator = Some(fresh);
        self.loaded_at = Some(mtime);
        self.builds += 1;
        if self.builds == 1 {
            info!("Generator built from {}", self.path.display());
        } else {
            info!("Theme {} changed, generator rebuilt (#{})", self.path.display(), self.builds);
        }
        Ok(())
    }

    /// Next image and display duration, rebuilding first when stale
    pub fn next_frame(&mut self) -> Result<Frame, SessionError> {
        let mtime = self.modified()?;
        if self.is_stale(mtime) {
            debug!("Building generator for {}x{}", self.width, self.height);
            self.rebuild(mtime)?;
        }
        match self.generator.as_mut() {
            Some(generator) => generator.next_frame().map_err(into_session_error),
            None => Err(SessionError::Configuration(ConfigError::Validation(
                "no generator available".to_string(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::cell::Cell;
    use std::fs::File;
    use std::rc::Rc;
    use std::time::Duration;

    /// Generator tagged with the build that produced it
    struct Tagged(u64);

    impl FrameGenerator for Tagged {
        fn next_frame(&mut self) -> Result<Frame, GeneratorError> {
            Ok(Frame { image: RgbImage::new(1, 1), duration: Duration::from_millis(self.0) })
        }
    }

    #[derive(Clone, Default)]
    struct Counting {
        built: Rc<Cell<u64>>,
        fail: Rc<Cell<bool>>,
    }

    impl GeneratorFactory for Counting {
        type Generator = Tagged;

        fn build(&self, _path: &Path, _w: u32, _h: u32) -> Result<Tagged, GeneratorError> {
            if self.fail.get() {
                return Err(ConfigError::Validation("broken theme".into()).into());
            }
            self.built.set(self.built.get() + 1);
            Ok(Tagged(self.built.get()))
        }
    }

    fn theme_file(name: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!("trlcd-src-{}-{}.yaml", std::process::id(), name));
        fs::write(&p, "display: {}\n").unwrap();
        p
    }

    fn touch(path: &Path, secs_ahead: u64) {
        let f = File::options().write(true).open(path).unwrap();
        f.set_modified(SystemTime::now() + Duration::from_secs(secs_ahead)).unwrap();
    }

    #[test]
    fn test_lazy_first_build() {
        let path = theme_file("lazy");
        let factory = Counting::default();
        let mut src = FrameSource::new(&path, 4, 4, factory.clone());
        assert_eq!(src.builds(), 0);
        src.next_frame().unwrap();
        assert_eq!(factory.built.get(), 1);
    }

    #[test]
    fn test_unchanged_file_reuses_generator() {
        let path = theme_file("same");
        let mut src = FrameSource::new(&path, 4, 4, Counting::default());
        let a = src.next_frame().unwrap();
        let b = src.next_frame().unwrap();
        assert_eq!(a.duration, b.duration);
        assert_eq!(src.builds(), 1);
    }

    #[test]
    fn test_newer_file_rebuilds_once() {
        let path = theme_file("newer");
        let mut src = FrameSource::new(&path, 4, 4, Counting::default());
        src.next_frame().unwrap();
        touch(&path, 10);
        let f = src.next_frame().unwrap();
        assert_eq!(f.duration, Duration::from_millis(2));
        src.next_frame().unwrap();
        assert_eq!(src.builds(), 2);
    }

    #[test]
    fn test_failed_rebuild_is_fatal() {
        let path = theme_file("broken");
        let factory = Counting::default();
        let mut src = FrameSource::new(&path, 4, 4, factory.clone());
        src.next_frame().unwrap();
        factory.fail.set(true);
        touch(&path, 10);
        assert!(matches!(src.next_frame(), Err(SessionError::Configuration(_))));
    }

    #[test]
    fn test_missing_file() {
        let mut src = FrameSource::new("/nonexistent/theme.yaml", 4, 4, Counting::default());
        assert!(matches!(src.next_frame(), Err(SessionError::Configuration(ConfigError::Io { .. }))));
    }
}
