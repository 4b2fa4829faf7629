/*
 *  display/drivers/usb.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  libusb helpers shared by the HID and bulk transports
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

use log::{debug, info, warn};
use rusb::{Device, DeviceHandle, Direction, GlobalContext, TransferType};

use crate::display::error::{SessionError, TransportError};
use crate::display::profile::DeviceIdentity;
use crate::display::traits::EndpointInfo;

/// USB interface class code for HID
pub const CLASS_HID: u8 = 0x03;

/// Identity of an enumerated device, `None` if the descriptor is unreadable
pub fn identity_of(device: &Device<GlobalContext>) -> Option<DeviceIdentity> {
    device
        .device_descriptor()
        .ok()
        .map(|d| DeviceIdentity::new(d.vendor_id(), d.product_id()))
}

/// First device on the bus with this vid:pid
pub fn find_device(identity: DeviceIdentity) -> Result<Option<Device<GlobalContext>>, rusb::Error> {
    Ok(rusb::devices()?
        .iter()
        .find(|d| identity_of(d) == Some(identity)))
}

/// Interface number of the first HID-class interface
pub fn hid_interface(device: &Device<GlobalContext>) -> Option<u8> {
    let config = device.active_config_descriptor().ok()?;
    config
        .interfaces()
        .flat_map(|i| i.descriptors())
        .find(|d| d.class_code() == CLASS_HID)
        .map(|d| d.interface_number())
}

/// Endpoints of `transfer` type on `interface`, (OUT, IN)
///
/// When several endpoints of a direction exist the preferred address wins,
/// otherwise the first one listed is used.
pub fn find_endpoints(
    device: &Device<GlobalContext>,
    interface: u8,
    transfer: TransferType,
    preferred: (Option<u8>, Option<u8>),
) -> Result<(Option<EndpointInfo>, Option<EndpointInfo>), TransportError> {
    let config = device.active_config_descriptor()?;
    let mut out: Option<EndpointInfo> = None;
    let mut inp: Option<EndpointInfo> = None;

    for alt in config.interfaces().flat_map(|i| i.descriptors()) {
        if alt.interface_number() != interface || alt.setting_number() != 0 {
            continue;
        }
        for ep in alt.endpoint_descriptors() {
            if ep.transfer_type() != transfer {
                continue;
            }
            let info = EndpointInfo {
                address: ep.address(),
                max_packet_size: ep.max_packet_size(),
            };
            let (slot, want) = match ep.direction() {
                Direction::Out => (&mut out, preferred.0),
                Direction::In => (&mut inp, preferred.1),
            };
            if slot.is_none() || want == Some(info.address) {
                *slot = Some(info);
            }
        }
    }
    debug!("interface {} {:?} endpoints: out={:?} in={:?}", interface, transfer, out, inp);
    Ok((out, inp))
}

/// Take exclusive ownership of `interface`
///
/// Detaches a bound kernel driver first. Returns whether a driver was
/// detached so it can be reattached on release. A second claimant gets
/// `ClaimFailure` straight away.
pub fn claim(
    handle: &mut DeviceHandle<GlobalContext>,
    identity: DeviceIdentity,
    interface: u8,
) -> Result<bool, SessionError> {
    let detached = match handle.kernel_driver_active(interface) {
        Ok(true) => {
            handle
                .detach_kernel_driver(interface)
                .map_err(|e| SessionError::claim(identity, interface, e))?;
            info!("Detached kernel driver from {} interface {}", identity, interface);
            true
        }
        Ok(false) => false,
        // platforms without kernel driver queries
        Err(rusb::Error::NotSupported) => false,
        Err(e) => return Err(SessionError::claim(identity, interface, e)),
    };

    handle
        .claim_interface(interface)
        .map_err(|e| SessionError::claim(identity, interface, e))?;
    info!("USB device {} claimed on interface {}", identity, interface);
    Ok(detached)
}

/// Undo `claim`, reattaching the kernel driver when one was detached
pub fn unclaim(
    handle: &mut DeviceHandle<GlobalContext>,
    interface: u8,
    reattach: bool,
) -> Result<(), TransportError> {
    handle.release_interface(interface)?;
    if reattach {
        if let Err(e) = handle.attach_kernel_driver(interface) {
            warn!("Could not reattach kernel driver on interface {}: {}", interface, e);
        }
    }
    debug!("Released interface {}", interface);
    Ok(())
}
