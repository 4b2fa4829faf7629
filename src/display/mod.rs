/*
 *  display/mod.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - profiles, wire format, transports and sessions
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

// Core trait definitions
pub mod traits;
pub mod error;
pub mod profile;

// Wire format
pub mod encoder;
pub mod header;
pub mod packet;

// USB transports and discovery
pub mod drivers;
pub mod factory;

// Streaming loop
pub mod session;

// Re-exports for convenience
pub use traits::{EndpointInfo, Transport};
pub use error::{SessionError, TransportError};
pub use profile::{DeviceIdentity, DeviceProfile, HeaderLayout, TransportKind, PROFILES};
pub use packet::{EncodedFrame, Packetizer};
pub use drivers::mock::MockTransport;
pub use factory::{BoxedTransport, DiscoveredDevice, TransportFactory};
pub use session::{Session, SessionState};
