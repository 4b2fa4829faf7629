/*
 *  display/drivers/mock.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock transport for testing and dry runs without hardware
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

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::display::error::TransportError;
use crate::display::traits::Transport;

/// Mock transport
///
/// Records every packet written so tests can inspect the exact byte stream
/// a panel would have received. Failures can be injected at a given write
/// index. The `--dry-run` mode streams into it with recording switched off.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

/// Internal state for the mock transport (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockTransportState {
    /// Every successful write, in order
    pub writes: Vec<Vec<u8>>,

    /// Number of write calls, including failed ones
    pub write_calls: usize,

    /// Total bytes accepted
    pub bytes_written: usize,

    /// Fail the write call with this 0-based index
    pub fail_at_write: Option<usize>,

    /// Accept one byte less than offered on every write
    pub simulate_short_write: bool,

    /// Keep only counters, not payloads (long dry runs)
    pub discard_payloads: bool,

    /// Queued responses for `read`
    pub reads: VecDeque<Vec<u8>>,

    /// Error returned by the next `reset`
    pub reset_error: Option<rusb::Error>,

    pub reset_count: usize,
    pub release_count: usize,
    pub released: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that keeps counters only
    pub fn counting() -> Self {
        let mock = Self::new();
        mock.lock().discard_payloads = true;
        mock
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockTransportState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportState> {
        // a panicked test thread must not hide the recorded writes
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Arrange for the `index`-th write call (0-based) to fail
    pub fn fail_at_write(&self, index: usize) {
        self.lock().fail_at_write = Some(index);
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    pub fn bytes_written(&self) -> usize {
        self.lock().bytes_written
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    pub fn push_read(&self, data: Vec<u8>) {
        self.lock().reads.push_back(data);
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if state.released {
            return Err(TransportError::Closed);
        }

        let call = state.write_calls;
        state.write_calls += 1;
        if state.fail_at_write == Some(call) {
            return Err(TransportError::Simulated(format!("write {} rejected", call)));
        }

        let accepted = if state.simulate_short_write {
            data.len().saturating_sub(1)
        } else {
            data.len()
        };
        state.bytes_written += accepted;
        if !state.discard_payloads {
            state.writes.push(data[..accepted].to_vec());
        }
        Ok(accepted)
    }

    fn read(&mut self, max_len: usize, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock();
        if state.released {
            return Err(TransportError::Closed);
        }
        match state.reads.pop_front() {
            Some(mut data) => {
                data.truncate(max_len);
                Ok(data)
            }
            None => Err(TransportError::Usb(rusb::Error::Timeout)),
        }
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.reset_count += 1;
        match state.reset_error.take() {
            Some(e) => Err(TransportError::Usb(e)),
            None => Ok(()),
        }
    }

    fn release(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.release_count += 1;
        state.released = true;
        Ok(())
    }
}
