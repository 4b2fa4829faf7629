/*
 *  display/traits.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for the panel transport abstraction
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

use std::time::Duration;

use crate::display::error::TransportError;

/// Default timeout for a single packet transfer
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Bulk endpoint discovered on the claimed interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    pub address: u8,
    pub max_packet_size: u16,
}

/// Minimal I/O surface every panel transport must provide
///
/// A transport is created already claimed: opening the device detaches any
/// kernel driver and takes exclusive ownership of the relevant interface.
/// Writes block until the device accepts the packet or the timeout fires.
pub trait Transport: Send {
    /// Write one packet, returning the number of bytes accepted
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `max_len` bytes, waiting at most `timeout`
    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// USB port reset of the underlying device
    fn reset(&mut self) -> Result<(), TransportError>;

    /// Give the interface back; later I/O fails with `TransportError::Closed`
    ///
    /// Must be safe to call more than once.
    fn release(&mut self) -> Result<(), TransportError>;

    /// Write the whole packet or fail
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let written = self.write(data)?;
        if written != data.len() {
            return Err(TransportError::ShortWrite { expected: data.len(), written });
        }
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read(max_len, timeout)
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }

    fn release(&mut self) -> Result<(), TransportError> {
        (**self).release()
    }
}
