/*
 *  display/factory.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Device discovery and transport construction
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

use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use rusb::{Device, GlobalContext};

use crate::display::drivers::bulk::BulkTransport;
use crate::display::drivers::hid::HidTransport;
use crate::display::drivers::usb;
use crate::display::error::{SessionError, TransportError};
use crate::display::profile::{self, DeviceIdentity, DeviceProfile};
use crate::display::traits::Transport;

/// Type alias for boxed transport trait objects
pub type BoxedTransport = Box<dyn Transport>;

// re-enumeration after a port reset
const RESET_SETTLE: Duration = Duration::from_millis(500);
const RESET_RETRIES: usize = 6;

/// A device on the bus matched to its profile, not yet claimed
pub struct DiscoveredDevice {
    pub profile: &'static DeviceProfile,
    device: Device<GlobalContext>,
}

impl DiscoveredDevice {
    pub fn identity(&self) -> DeviceIdentity {
        self.profile.identity
    }

    /// Bus and address, as shown by lsusb
    pub fn location(&self) -> (u8, u8) {
        (self.device.bus_number(), self.device.address())
    }
}

/// One row of the `--list` output
#[derive(Debug, Clone)]
pub struct ListedDevice {
    pub identity: DeviceIdentity,
    pub bus: u8,
    pub address: u8,
    pub profile: Option<&'static DeviceProfile>,
}

/// Pick the profile to drive from the identities present on the bus
///
/// HID panels win over the bulk panel. When nothing matches, a device
/// from a known vendor turns the failure into `UnsupportedProfile`.
pub fn select_profile(present: &[DeviceIdentity]) -> Result<&'static DeviceProfile, SessionError> {
    let matched = profile::hid_profiles()
        .chain(profile::bulk_profiles())
        .find(|p| present.contains(&p.identity));
    if let Some(profile) = matched {
        return Ok(profile);
    }

    match present.iter().find(|id| profile::is_known_vendor(id.vendor_id)) {
        Some(&identity) => profile::resolve(identity),
        None => Err(SessionError::DeviceNotFound),
    }
}

/// Claim through `claim`, then issue the port reset on the claimed transport
///
/// When the reset makes the panel re-enumerate the old handle is gone, so it
/// is released and `claim` is retried until the panel shows up again.
fn claim_and_reset<T, C>(identity: DeviceIdentity, reset: bool, settle: Duration, mut claim: C) -> Result<T, SessionError>
where
    T: Transport,
    C: FnMut() -> Result<T, SessionError>,
{
    let mut transport = claim()?;
    if !reset {
        return Ok(transport);
    }

    match transport.reset() {
        Ok(()) => return Ok(transport),
        Err(TransportError::Usb(rusb::Error::NotFound)) => debug!("{} re-enumerating after reset", identity),
        Err(e) => {
            warn!("USB reset of {} failed: {}", identity, e);
            return Ok(transport);
        }
    }

    if let Err(e) = transport.release() {
        debug!("Release of stale handle for {}: {}", identity, e);
    }
    drop(transport);

    let mut last = SessionError::DeviceNotFound;
    for _ in 0..RESET_RETRIES {
        thread::sleep(settle);
        match claim() {
            Ok(transport) => {
                info!("{} claimed again after reset", identity);
                return Ok(transport);
            }
            Err(e @ (SessionError::DeviceNotFound | SessionError::ClaimFailure { .. })) => last = e,
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

/// Factory for locating panels and opening their transports
pub struct TransportFactory;

impl TransportFactory {
    fn devices() -> Result<Vec<Device<GlobalContext>>, SessionError> {
        let list = rusb::devices().map_err(|e| {
            error!("USB enumeration failed: {}", e);
            SessionError::DeviceNotFound
        })?;
        Ok(list.iter().collect())
    }

    /// Find the supported panel to drive
    ///
    /// With `forced` set only that vid:pid is considered.
    pub fn discover(forced: Option<DeviceIdentity>) -> Result<DiscoveredDevice, SessionError> {
        let devices = Self::devices()?;
        let present: Vec<DeviceIdentity> = devices
            .iter()
            .filter_map(usb::identity_of)
            .filter(|id| forced.is_none_or(|f| f == *id))
            .collect();
        debug!("{} candidate USB devices", present.len());

        let profile = match forced {
            Some(identity) if present.contains(&identity) => profile::resolve(identity)?,
            Some(_) => return Err(SessionError::DeviceNotFound),
            None => select_profile(&present)?,
        };

        let device = devices
            .into_iter()
            .find(|d| usb::identity_of(d) == Some(profile.identity))
            .ok_or(SessionError::DeviceNotFound)?;

        info!(
            "Selected {} (chunk {} bytes, {} header)",
            profile,
            profile.chunk_size,
            match profile.header {
                profile::HeaderLayout::Compact => "compact",
                profile::HeaderLayout::Extended => "extended",
            }
        );
        Ok(DiscoveredDevice { profile, device })
    }

    /// Claim the discovered panel, then optionally reset it through the
    /// claimed handle
    ///
    /// A panel already owned by another session fails the claim with
    /// `ClaimFailure` and is never reset.
    pub fn open(discovered: DiscoveredDevice, reset: bool) -> Result<BoxedTransport, SessionError> {
        let profile = discovered.profile;
        let mut first = Some(discovered.device);
        claim_and_reset(profile.identity, reset, RESET_SETTLE, || {
            let device = match first.take() {
                Some(device) => device,
                None => usb::find_device(profile.identity)
                    .unwrap_or_else(|e| {
                        debug!("Enumeration during reset settle: {}", e);
                        None
                    })
                    .ok_or(SessionError::DeviceNotFound)?,
            };
            Self::claim(&device, profile)
        })
    }

    fn claim(device: &Device<GlobalContext>, profile: &'static DeviceProfile) -> Result<BoxedTransport, SessionError> {
        if profile.is_hid() {
            Ok(Box::new(HidTransport::open(device, profile.identity)?))
        } else {
            Ok(Box::new(BulkTransport::open(device, profile)?))
        }
    }

    /// Every device on the bus with its matching profile, if any
    pub fn list() -> Result<Vec<ListedDevice>, SessionError> {
        Ok(Self::devices()?
            .iter()
            .filter_map(|d| {
                usb::identity_of(d).map(|identity| ListedDevice {
                    identity,
                    bus: d.bus_number(),
                    address: d.address(),
                    profile: profile::lookup(identity),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::MockTransport;
    use std::collections::VecDeque;

    const PANEL: DeviceIdentity = DeviceIdentity::new(0x0418, 0x5303);

    #[test]
    fn test_failed_claim_is_never_reset() {
        let mut claims = 0;
        let result: Result<MockTransport, _> = claim_and_reset(PANEL, true, Duration::ZERO, || {
            claims += 1;
            Err(SessionError::claim(PANEL, 0, rusb::Error::Busy))
        });
        assert!(matches!(result, Err(SessionError::ClaimFailure { .. })));
        // no retry loop and no reset without a claimed handle
        assert_eq!(claims, 1);
    }

    #[test]
    fn test_reset_goes_through_claimed_handle() {
        let mock = MockTransport::new();
        let claimed = claim_and_reset(PANEL, true, Duration::ZERO, || Ok(mock.clone())).unwrap();
        assert_eq!(claimed.state().lock().unwrap().reset_count, 1);
        assert!(!mock.is_released());

        let quiet = MockTransport::new();
        claim_and_reset(PANEL, false, Duration::ZERO, || Ok(quiet.clone())).unwrap();
        assert_eq!(quiet.state().lock().unwrap().reset_count, 0);
    }

    #[test]
    fn test_reclaim_after_reenumeration() {
        let stale = MockTransport::new();
        stale.state().lock().unwrap().reset_error = Some(rusb::Error::NotFound);
        let fresh = MockTransport::new();
        let mut queue: VecDeque<Result<MockTransport, SessionError>> =
            VecDeque::from([Ok(stale.clone()), Err(SessionError::DeviceNotFound), Ok(fresh.clone())]);

        let mut claimed = claim_and_reset(PANEL, true, Duration::ZERO, || {
            queue.pop_front().unwrap_or(Err(SessionError::DeviceNotFound))
        })
        .unwrap();
        assert!(stale.is_released());
        claimed.write_all(&[1, 2]).unwrap();
        assert_eq!(fresh.writes(), vec![vec![1, 2]]);
        // only the first handle was reset
        assert_eq!(fresh.state().lock().unwrap().reset_count, 0);
    }

    #[test]
    fn test_panel_that_never_returns() {
        let stale = MockTransport::new();
        stale.state().lock().unwrap().reset_error = Some(rusb::Error::NotFound);
        let mut first = Some(stale);
        let result = claim_and_reset(PANEL, true, Duration::ZERO, || {
            first.take().ok_or(SessionError::DeviceNotFound)
        });
        assert!(matches!(result, Err(SessionError::DeviceNotFound)));
    }

    #[test]
    fn test_hid_preferred_over_bulk() {
        let present = [
            DeviceIdentity::new(0x87ad, 0x70db),
            DeviceIdentity::new(0x0418, 0x5303),
        ];
        let profile = select_profile(&present).unwrap();
        assert_eq!(profile.identity, DeviceIdentity::new(0x0418, 0x5303));
    }

    #[test]
    fn test_bulk_used_when_no_hid_panel() {
        let present = [
            DeviceIdentity::new(0x1d6b, 0x0002),
            DeviceIdentity::new(0x87ad, 0x70db),
        ];
        let profile = select_profile(&present).unwrap();
        assert!(!profile.is_hid());
        assert_eq!(profile.init_sequence.len(), 2);
    }

    #[test]
    fn test_empty_bus_is_not_found() {
        assert!(matches!(select_profile(&[]), Err(SessionError::DeviceNotFound)));
        let present = [DeviceIdentity::new(0x1d6b, 0x0003)];
        assert!(matches!(select_profile(&present), Err(SessionError::DeviceNotFound)));
    }

    #[test]
    fn test_unknown_product_of_known_vendor() {
        let present = [DeviceIdentity::new(0x0416, 0x1234)];
        match select_profile(&present) {
            Err(SessionError::UnsupportedProfile { identity, .. }) => {
                assert_eq!(identity, DeviceIdentity::new(0x0416, 0x1234));
            }
            other => panic!("unexpected {:?}", other.map(|p| p.name)),
        }
    }
}
