/*
 *  display/session.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Device session: init handshake and the frame streaming loop
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
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::display::error::{SessionError, TransportError};
use crate::display::packet::EncodedFrame;
use crate::display::profile::DeviceProfile;
use crate::display::traits::Transport;
use crate::generator::{Frame, GeneratorFactory};
use crate::pacer::Pacer;
use crate::source::FrameSource;

/// Lifecycle of a session
///
/// A session only exists once its transport is claimed; discovery is the
/// factory's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Claimed,
    Initialized,
    Streaming,
    Closed,
}

/// One claimed panel fed from one frame source
pub struct Session<T: Transport, F: GeneratorFactory> {
    profile: &'static DeviceProfile,
    transport: T,
    source: FrameSource<F>,
    state: SessionState,
    frames_sent: u64,
    pacer: Pacer,
}

impl<T: Transport, F: GeneratorFactory> Session<T, F> {
    pub fn new(profile: &'static DeviceProfile, transport: T, source: FrameSource<F>) -> Self {
        Self {
            profile,
            transport,
            source,
            state: SessionState::Claimed,
            frames_sent: 0,
            pacer: Pacer::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    /// Frames completely written to the transport
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn source(&self) -> &FrameSource<F> {
        &self.source
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Close and wrap a transport failure with device context
    fn fail(&mut self, source: TransportError) -> SessionError {
        self.close();
        let err = SessionError::Transport {
            identity: self.profile.identity,
            profile: self.profile.name,
            last_frame: self.frames_sent,
            source,
        };
        error!("{}", err);
        err
    }

    /// Send the profile's handshake blobs, once
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Claimed => {}
            SessionState::Closed => return Err(self.fail(TransportError::Closed)),
            _ => return Ok(()),
        }

        let blobs = self.profile.init_sequence;
        for blob in blobs {
            if let Err(e) = self.transport.write_all(blob) {
                return Err(self.fail(e));
            }
        }
        if !blobs.is_empty() {
            info!(
                "Init handshake sent to {}: {} blobs ({} bytes)",
                self.profile.identity,
                blobs.len(),
                blobs.iter().map(|b| b.len()).sum::<usize>()
            );
        }
        self.state = SessionState::Initialized;
        Ok(())
    }

    fn pull(&mut self) -> Result<Frame, SessionError> {
        let frame = self.source.next_frame()?;
        let expected = self.profile.dimensions();
        let actual = frame.image.dimensions();
        if actual != expected {
            return Err(SessionError::GeometryMismatch { expected, actual });
        }
        Ok(frame)
    }

    /// Stream exactly one frame, returning how long it should stay visible
    ///
    /// The first packet failure aborts the frame; nothing more is written and
    /// the session is closed.
    pub fn step(&mut self) -> Result<Duration, SessionError> {
        match self.state {
            SessionState::Claimed => self.initialize()?,
            SessionState::Closed => return Err(self.fail(TransportError::Closed)),
            _ => {}
        }

        let frame = match self.pull() {
            Ok(frame) => frame,
            Err(e) => {
                self.close();
                let err = SessionError::FrameAborted {
                    identity: self.profile.identity,
                    profile: self.profile.name,
                    last_frame: self.frames_sent,
                    source: Box::new(e),
                };
                error!("{}", err);
                return Err(err);
            }
        };

        let started = Instant::now();
        let encoded = EncodedFrame::new(self.profile, &frame.image);
        let packets = encoded.packets(self.profile);
        let count = packets.len();
        for packet in packets {
            if let Err(e) = self.transport.write_all(&packet) {
                return Err(self.fail(e));
            }
        }

        let elapsed = started.elapsed();
        self.state = SessionState::Streaming;
        self.frames_sent += 1;
        self.pacer.record_transmit(elapsed);
        debug!(
            "frame {}: {} packets in {:.1} ms (avg {:.1} ms), hold {} ms",
            self.frames_sent,
            count,
            elapsed.as_secs_f32() * 1000.0,
            self.pacer.average_transmit_ms(),
            frame.duration.as_millis()
        );
        Ok(frame.duration)
    }

    /// Stream until `stop` is raised or a fatal error occurs
    ///
    /// The stop flag is honoured between frames only, an in-flight frame is
    /// always completed (or failed) before the interface is released.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), SessionError> {
        info!("Streaming to {}", self.profile);
        while !stop.load(Ordering::Relaxed) {
            let hold = self.step()?;
            if !self.pacer.pace(hold, stop) {
                break;
            }
        }
        info!("Stop requested after {} frames", self.frames_sent);
        self.close();
        Ok(())
    }

    /// Release the transport; idempotent
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        match self.transport.release() {
            Ok(()) => info!("Released {} after {} frames", self.profile.identity, self.frames_sent),
            Err(e) => warn!("Release of {} failed: {}", self.profile.identity, e),
        }
    }
}

impl<T: Transport, F: GeneratorFactory> Drop for Session<T, F> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::MockTransport;
    use crate::display::profile::{lookup, DeviceIdentity};
    use crate::generator::{FrameGenerator, GeneratorError};
    use image::RgbImage;
    use std::path::{Path, PathBuf};

    struct Solid(u32, u32);

    impl FrameGenerator for Solid {
        fn next_frame(&mut self) -> Result<Frame, GeneratorError> {
            Ok(Frame { image: RgbImage::new(self.0, self.1), duration: Duration::ZERO })
        }
    }

    /// Ignores the requested geometry when `wrong` is set
    struct SolidFactory {
        wrong: bool,
    }

    impl GeneratorFactory for SolidFactory {
        type Generator = Solid;

        fn build(&self, _path: &Path, w: u32, h: u32) -> Result<Solid, GeneratorError> {
            Ok(if self.wrong { Solid(w + 1, h) } else { Solid(w, h) })
        }
    }

    fn theme() -> PathBuf {
        let p = std::env::temp_dir().join(format!("trlcd-session-{}.yaml", std::process::id()));
        std::fs::write(&p, "display: {}\n").unwrap();
        p
    }

    fn session(id: DeviceIdentity, wrong: bool) -> (Session<MockTransport, SolidFactory>, MockTransport) {
        let profile = lookup(id).unwrap();
        let mock = MockTransport::new();
        let source = FrameSource::new(theme(), profile.width, profile.height, SolidFactory { wrong });
        (Session::new(profile, mock.clone(), source), mock)
    }

    #[test]
    fn test_state_progression() {
        let (mut s, mock) = session(DeviceIdentity::new(0x0418, 0x5303), false);
        assert_eq!(s.state(), SessionState::Claimed);
        s.initialize().unwrap();
        assert_eq!(s.state(), SessionState::Initialized);
        // HID profile has no handshake
        assert_eq!(mock.write_calls(), 0);
        s.step().unwrap();
        assert_eq!(s.state(), SessionState::Streaming);
        s.close();
        assert_eq!(s.state(), SessionState::Closed);
        assert!(mock.is_released());
        assert!(matches!(s.step(), Err(SessionError::Transport { source: TransportError::Closed, .. })));
    }

    #[test]
    fn test_frame_packet_count() {
        let (mut s, mock) = session(DeviceIdentity::new(0x0418, 0x5303), false);
        s.step().unwrap();
        // 8 + 320*320*2 bytes in 64-byte chunks
        let expected = (8 + 320 * 320 * 2usize).div_ceil(64);
        assert_eq!(mock.write_calls(), expected);
        assert!(mock.writes().iter().all(|p| p.len() == 65 && p[0] == 0));
        assert_eq!(s.frames_sent(), 1);
    }

    #[test]
    fn test_geometry_mismatch_closes() {
        let (mut s, mock) = session(DeviceIdentity::new(0x0416, 0x5302), true);
        let err = s.step().unwrap_err();
        assert!(matches!(err.cause(), SessionError::GeometryMismatch { expected: (320, 240), actual: (321, 240) }));
        let msg = err.to_string();
        assert!(msg.contains("0416:5302"));
        assert!(msg.contains("after frame 0"));
        assert_eq!(mock.write_calls(), 0);
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn test_run_returns_when_stopped() {
        let (mut s, mock) = session(DeviceIdentity::new(0x0418, 0x5304), false);
        let stop = AtomicBool::new(true);
        s.run(&stop).unwrap();
        assert_eq!(s.frames_sent(), 0);
        assert!(mock.is_released());
    }
}
