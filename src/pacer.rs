/*
 *  pacer.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Frame pacing for the streaming loop
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
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

// longest uninterrupted sleep, so a raised stop flag is seen promptly
const SLICE: Duration = Duration::from_millis(50);

pub struct Pacer {
    ema_ms: f32,     // moving avg of frame transmit time
    alpha: f32,      // smoothing (0.1 ~ 0.3)
    frames: u64,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new()
    }
}

// sleeps the full requested duration after the write, transmit time is
// tracked for logging only
impl Pacer {
    pub fn new() -> Self {
        Self { ema_ms: 0.0, alpha: 0.2, frames: 0 }
    }

    /// Call immediately after a frame has been fully written.
    pub fn record_transmit(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f32() * 1000.0;
        self.ema_ms = if self.frames == 0 {
            ms
        } else {
            self.alpha * ms + (1.0 - self.alpha) * self.ema_ms
        };
        self.frames += 1;
    }

    #[inline]
    pub fn average_transmit_ms(&self) -> f32 { self.ema_ms }

    /// Sleep for `duration`, waking early if `stop` is raised.
    ///
    /// Returns false when interrupted.
    pub fn pace(&self, duration: Duration, stop: &AtomicBool) -> bool {
        let mut left = duration;
        while !left.is_zero() {
            if stop.load(Ordering::Relaxed) {
                return false;
            }
            let nap = left.min(SLICE);
            thread::sleep(nap);
            left -= nap;
        }
        !stop.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_ema_seeds_then_smooths() {
        let mut p = Pacer::new();
        p.record_transmit(Duration::from_millis(100));
        assert!((p.average_transmit_ms() - 100.0).abs() < 0.01);
        p.record_transmit(Duration::from_millis(0));
        assert!((p.average_transmit_ms() - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_pace_sleeps_requested_time() {
        let stop = AtomicBool::new(false);
        let start = Instant::now();
        assert!(Pacer::new().pace(Duration::from_millis(120), &stop));
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn test_pace_stops_early() {
        let stop = AtomicBool::new(true);
        let start = Instant::now();
        assert!(!Pacer::new().pace(Duration::from_secs(5), &stop));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
