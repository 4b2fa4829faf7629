/*
 *  display/drivers/bulk.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Raw bulk-endpoint transport for vendor-class panels
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

use log::{info, warn};
use rusb::{Device, DeviceHandle, GlobalContext, TransferType};

use crate::display::drivers::usb;
use crate::display::error::{SessionError, TransportError};
use crate::display::profile::{DeviceIdentity, DeviceProfile, TransportKind};
use crate::display::traits::{EndpointInfo, Transport, WRITE_TIMEOUT};

/// Transport writing whole packets to a bulk OUT endpoint
pub struct BulkTransport {
    handle: DeviceHandle<GlobalContext>,
    identity: DeviceIdentity,
    interface: u8,
    endpoint_out: EndpointInfo,
    endpoint_in: Option<EndpointInfo>,
    reattach: bool,
    released: bool,
}

impl BulkTransport {
    /// Open `device`, claim the profile's interface and resolve its endpoints
    pub fn open(device: &Device<GlobalContext>, profile: &DeviceProfile) -> Result<Self, SessionError> {
        let identity = profile.identity;
        let TransportKind::Bulk { endpoint_out, endpoint_in, interface } = profile.transport else {
            return Err(SessionError::UnsupportedProfile {
                identity,
                reason: "profile is not a bulk profile".to_string(),
            });
        };

        let mut handle = device
            .open()
            .map_err(|e| SessionError::claim(identity, interface, e))?;
        let reattach = usb::claim(&mut handle, identity, interface)?;

        let (out, inp) = usb::find_endpoints(
            device,
            interface,
            TransferType::Bulk,
            (Some(endpoint_out), Some(endpoint_in)),
        )
        .map_err(|e| SessionError::UnsupportedProfile { identity, reason: e.to_string() })?;

        // descriptors unreadable on some hosts, fall back to the profile
        let out = out.unwrap_or(EndpointInfo { address: endpoint_out, max_packet_size: 512 });
        if out.address != endpoint_out {
            warn!(
                "Bulk OUT endpoint 0x{:02x} differs from profile 0x{:02x}",
                out.address, endpoint_out
            );
        }
        info!(
            "Bulk transport on {} interface {}: OUT 0x{:02x} ({} bytes), IN {}",
            identity,
            interface,
            out.address,
            out.max_packet_size,
            inp.map(|e| format!("0x{:02x}", e.address)).unwrap_or_else(|| "none".to_string())
        );

        Ok(Self {
            handle,
            identity,
            interface,
            endpoint_out: out,
            endpoint_in: inp,
            reattach,
            released: false,
        })
    }

    pub fn endpoints(&self) -> (EndpointInfo, Option<EndpointInfo>) {
        (self.endpoint_out, self.endpoint_in)
    }
}

impl Transport for BulkTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.released {
            return Err(TransportError::Closed);
        }
        Ok(self.handle.write_bulk(self.endpoint_out.address, data, WRITE_TIMEOUT)?)
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.released {
            return Err(TransportError::Closed);
        }
        let ep = self.endpoint_in.ok_or(TransportError::NoEndpoint("bulk IN"))?;
        let mut buf = vec![0u8; max_len];
        let n = self.handle.read_bulk(ep.address, &mut buf, timeout)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.handle.reset()?;
        info!("Display device {} reinitialised via USB reset", self.identity);
        Ok(())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        usb::unclaim(&mut self.handle, self.interface, self.reattach)
    }
}

impl Drop for BulkTransport {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
