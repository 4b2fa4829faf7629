/*
 *  display/header.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Per-frame header rendering
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

use crate::display::profile::{DeviceProfile, HeaderLayout};

pub const COMPACT_HEADER_LEN: usize = 8;
pub const EXTENDED_HEADER_LEN: usize = 22;

const COMPACT_MAGIC: [u8; 2] = [0x69, 0x88];
const EXTENDED_MAGIC: [u8; 4] = [0xDA, 0xDB, 0xDC, 0xDD];

// extended body fields, fixed on every panel seen so far
const EXTENDED_MODE: u16 = 2;
const EXTENDED_SUB: u16 = 1;
const EXTENDED_FLAG: u16 = 2;

impl HeaderLayout {
    /// Size of the rendered header in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            HeaderLayout::Compact => COMPACT_HEADER_LEN,
            HeaderLayout::Extended => EXTENDED_HEADER_LEN,
        }
    }

    /// Render the header for a frame of the given geometry
    pub fn render(&self, width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        match self {
            HeaderLayout::Compact => {
                out.extend_from_slice(&COMPACT_MAGIC);
                out.extend_from_slice(&(width as u16).to_le_bytes());
                out.extend_from_slice(&(height as u16).to_le_bytes());
                out.extend_from_slice(&0u16.to_le_bytes());
            }
            HeaderLayout::Extended => {
                // payload is RGB565, two bytes per pixel
                let byte_count = width * height * 2;
                out.extend_from_slice(&EXTENDED_MAGIC);
                out.extend_from_slice(&EXTENDED_MODE.to_le_bytes());
                out.extend_from_slice(&EXTENDED_SUB.to_le_bytes());
                out.extend_from_slice(&(width as u16).to_le_bytes());
                out.extend_from_slice(&(height as u16).to_le_bytes());
                out.extend_from_slice(&EXTENDED_FLAG.to_le_bytes());
                out.extend_from_slice(&0u16.to_le_bytes());
                out.extend_from_slice(&byte_count.to_le_bytes());
                out.extend_from_slice(&0u16.to_le_bytes());
            }
        }
        debug_assert_eq!(out.len(), self.byte_len());
        out
    }
}

/// Header for `profile` at its native geometry
pub fn build_header(profile: &DeviceProfile) -> Vec<u8> {
    profile.header.render(profile.width, profile.height)
}
