/*
 *  lib.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Frame encoding and USB streaming for cooler LCD panels
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

pub mod canvas;
pub mod config;
pub mod display;
pub mod generator;
pub mod metrics;
pub mod pacer;
pub mod source;

use std::path::Path;
use std::sync::atomic::AtomicBool;

use log::info;

use display::{
    DeviceIdentity, DeviceProfile, MockTransport, Session, SessionError, TransportFactory,
};
use generator::DisplayGeneratorFactory;
use source::FrameSource;

/// Knobs for `run_session`
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// USB port reset before claiming the interface
    pub reset: bool,
    /// Drive this vid:pid instead of the discovery order
    pub profile: Option<DeviceIdentity>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { reset: true, profile: None }
    }
}

/// Discover a panel, claim it and stream `config_path` until `stop` is raised
///
/// Returns the number of frames sent. Every fatal condition comes back as a
/// `SessionError`; the interface is released on all paths.
pub fn run_session(
    config_path: &Path,
    options: &SessionOptions,
    stop: &AtomicBool,
) -> Result<u64, SessionError> {
    let discovered = TransportFactory::discover(options.profile)?;
    let profile = discovered.profile;
    let transport = TransportFactory::open(discovered, options.reset)?;

    let source = FrameSource::new(config_path, profile.width, profile.height, DisplayGeneratorFactory);
    let mut session = Session::new(profile, transport, source);
    session.run(stop)?;
    Ok(session.frames_sent())
}

/// Full pipeline into a counting mock instead of a device
pub fn dry_run(
    config_path: &Path,
    profile: &'static DeviceProfile,
    stop: &AtomicBool,
) -> Result<MockTransport, SessionError> {
    let mock = MockTransport::counting();
    let source = FrameSource::new(config_path, profile.width, profile.height, DisplayGeneratorFactory);
    let mut session = Session::new(profile, mock.clone(), source);
    session.run(stop)?;
    info!(
        "Dry run: {} frames, {} packets, {} bytes for {}",
        session.frames_sent(),
        mock.write_calls(),
        mock.bytes_written(),
        profile
    );
    Ok(mock)
}
