/*
 *  display/error.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Unified error types for the panel streaming subsystem
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

use thiserror::Error;

use crate::config::ConfigError;
use crate::display::profile::DeviceIdentity;
use crate::generator::GeneratorError;

/// Failures raised by a transport handle
#[derive(Debug, Error)]
pub enum TransportError {
    /// libusb reported an error (timeout, disconnect, pipe stall...)
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// The device accepted fewer bytes than the packet carried
    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { expected: usize, written: usize },

    /// The interface has been released, no further I/O is allowed
    #[error("transport already released")]
    Closed,

    /// The claimed interface exposes no endpoint usable for the transfer
    #[error("no {0} endpoint on the claimed interface")]
    NoEndpoint(&'static str),

    /// Failure injected by the mock transport
    #[error("simulated failure: {0}")]
    Simulated(String),
}

/// Fatal conditions surfaced at the session boundary
#[derive(Debug, Error)]
pub enum SessionError {
    /// Nothing on the bus matches a known profile
    #[error("no supported display device found")]
    DeviceNotFound,

    /// A panel was seen but its protocol is not described by any profile
    #[error("unsupported device {identity}: {reason}")]
    UnsupportedProfile {
        identity: DeviceIdentity,
        reason: String,
    },

    /// The interface is owned elsewhere and could not be taken over
    #[error("cannot claim interface {interface} on {identity}: {reason}")]
    ClaimFailure {
        identity: DeviceIdentity,
        interface: u8,
        reason: String,
    },

    /// Theme configuration missing or invalid at (re)build time
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Frame production failed after a successful build
    #[error("frame generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// Write/read failure mid-stream; the session is closed
    #[error("transport failure on {profile} [{identity}] after frame {last_frame}: {source}")]
    Transport {
        identity: DeviceIdentity,
        profile: &'static str,
        /// Index of the last frame fully delivered (0 when none was)
        last_frame: u64,
        #[source]
        source: TransportError,
    },

    /// Generator output disagrees with the profile geometry
    #[error("geometry mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    GeometryMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A frame could not be produced for a claimed panel; the session is closed
    #[error("{profile} [{identity}] stopped after frame {last_frame}: {source}")]
    FrameAborted {
        identity: DeviceIdentity,
        profile: &'static str,
        last_frame: u64,
        #[source]
        source: Box<SessionError>,
    },
}

impl SessionError {
    /// Classify libusb claim failures the same way regardless of transport
    pub fn claim(identity: DeviceIdentity, interface: u8, err: rusb::Error) -> Self {
        let reason = match err {
            rusb::Error::Busy => "interface is busy (another session owns it)".to_string(),
            rusb::Error::Access => "permission denied (check udev rules)".to_string(),
            other => other.to_string(),
        };
        SessionError::ClaimFailure { identity, interface, reason }
    }

    /// The underlying condition, without the device context wrapper
    pub fn cause(&self) -> &SessionError {
        match self {
            SessionError::FrameAborted { source, .. } => source.cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_transport_error_keeps_source() {
        let err = SessionError::Transport {
            identity: DeviceIdentity::new(0x0418, 0x5304),
            profile: "Trofeo 480",
            last_frame: 12,
            source: TransportError::Usb(rusb::Error::Timeout),
        };
        let msg = err.to_string();
        assert!(msg.contains("Trofeo 480"));
        assert!(msg.contains("0418:5304"));
        assert!(msg.contains("frame 12"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_busy_claim_is_reported_as_busy() {
        let err = SessionError::claim(DeviceIdentity::new(0x87ad, 0x70db), 0, rusb::Error::Busy);
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_aborted_frame_names_device() {
        let err = SessionError::FrameAborted {
            identity: DeviceIdentity::new(0x0418, 0x5303),
            profile: "Trofeo 320",
            last_frame: 4,
            source: Box::new(SessionError::GeometryMismatch { expected: (320, 320), actual: (321, 320) }),
        };
        assert_eq!(
            err.to_string(),
            "Trofeo 320 [0418:5303] stopped after frame 4: geometry mismatch: expected 320x320, got 321x320"
        );
        assert!(matches!(err.cause(), SessionError::GeometryMismatch { .. }));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_geometry_message() {
        let err = SessionError::GeometryMismatch { expected: (480, 480), actual: (320, 240) };
        assert_eq!(err.to_string(), "geometry mismatch: expected 480x480, got 320x240");
    }
}
