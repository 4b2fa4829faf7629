/*
 *  display/drivers/hid.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  HID output-report transport for the report-based panels
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
use rusb::{Device, DeviceHandle, Direction, GlobalContext, Recipient, RequestType, TransferType};

use crate::display::drivers::usb;
use crate::display::error::{SessionError, TransportError};
use crate::display::profile::DeviceIdentity;
use crate::display::traits::{EndpointInfo, Transport, WRITE_TIMEOUT};

// HID class request and report type
const HID_SET_REPORT: u8 = 0x09;
const HID_REPORT_OUTPUT: u16 = 0x02;

/// A framed packet split into report id and the bytes put on the wire
#[derive(Debug, PartialEq, Eq)]
struct OutputReport<'a> {
    id: u8,
    wire: &'a [u8],
    skipped: usize,
}

impl<'a> OutputReport<'a> {
    fn split(packet: &'a [u8]) -> Option<Self> {
        let (&id, rest) = packet.split_first()?;
        Some(if id == 0 {
            Self { id, wire: rest, skipped: 1 }
        } else {
            Self { id, wire: packet, skipped: 0 }
        })
    }

    /// Bytes of the original packet covered by `sent` wire bytes
    fn accepted(&self, sent: usize) -> usize {
        sent + self.skipped
    }
}

/// Transport writing HID output reports
///
/// Packets arrive with the report id in byte 0. Report id 0 means the
/// device does not number its reports, so that byte is not put on the wire,
/// matching what hidraw and hidapi do. The byte count returned still covers
/// the full packet.
pub struct HidTransport {
    handle: DeviceHandle<GlobalContext>,
    identity: DeviceIdentity,
    interface: u8,
    endpoint_out: Option<EndpointInfo>,
    endpoint_in: Option<EndpointInfo>,
    reattach: bool,
    released: bool,
}

impl HidTransport {
    /// Open and claim the HID interface of `device`
    pub fn open(device: &Device<GlobalContext>, identity: DeviceIdentity) -> Result<Self, SessionError> {
        let interface = usb::hid_interface(device).ok_or_else(|| SessionError::UnsupportedProfile {
            identity,
            reason: "device exposes no HID interface".to_string(),
        })?;

        let mut handle = device
            .open()
            .map_err(|e| SessionError::claim(identity, interface, e))?;
        let reattach = usb::claim(&mut handle, identity, interface)?;

        let (endpoint_out, endpoint_in) =
            match usb::find_endpoints(device, interface, TransferType::Interrupt, (None, None)) {
                Ok(found) => found,
                Err(e) => {
                    warn!("Endpoint descriptors of {} unreadable, using SET_REPORT: {}", identity, e);
                    (None, None)
                }
            };

        info!(
            "HID transport on {} interface {} ({})",
            identity,
            interface,
            match endpoint_out {
                Some(ep) => format!("interrupt OUT 0x{:02x}", ep.address),
                None => "SET_REPORT control".to_string(),
            }
        );

        Ok(Self {
            handle,
            identity,
            interface,
            endpoint_out,
            endpoint_in,
            reattach,
            released: false,
        })
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }
}

impl Transport for HidTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.released {
            return Err(TransportError::Closed);
        }
        let Some(report) = OutputReport::split(data) else {
            return Ok(0);
        };

        let sent = match self.endpoint_out {
            Some(ep) => self.handle.write_interrupt(ep.address, report.wire, WRITE_TIMEOUT)?,
            None => {
                let request_type = rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface);
                self.handle.write_control(
                    request_type,
                    HID_SET_REPORT,
                    (HID_REPORT_OUTPUT << 8) | report.id as u16,
                    self.interface as u16,
                    report.wire,
                    WRITE_TIMEOUT,
                )?
            }
        };
        Ok(report.accepted(sent))
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.released {
            return Err(TransportError::Closed);
        }
        let ep = self.endpoint_in.ok_or(TransportError::NoEndpoint("interrupt IN"))?;
        let mut buf = vec![0u8; max_len];
        let n = self.handle.read_interrupt(ep.address, &mut buf, timeout)?;
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

impl Drop for HidTransport {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
