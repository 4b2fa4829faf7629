/*
 *  display/packet.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Fixed-size transport packets
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

use crate::display::header::build_header;
use crate::display::encoder::{encode_frame, encoded_len};
use crate::display::profile::DeviceProfile;
use image::RgbImage;

/// Header plus encoded pixels for one frame, ready to slice
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    bytes: Vec<u8>,
}

impl EncodedFrame {
    /// Concatenate the profile header and the encoded raster of `img`
    pub fn new(profile: &DeviceProfile, img: &RgbImage) -> Self {
        let mut bytes = build_header(profile);
        bytes.reserve(encoded_len(img.width(), img.height()));
        bytes.extend(encode_frame(img));
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn packets(&self, profile: &DeviceProfile) -> Packetizer<'_> {
        Packetizer::new(&self.bytes, profile.chunk_size, profile.framing_byte)
    }
}

/// Number of packets needed for `len` payload bytes
pub fn packet_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size)
}

/// Iterator of `chunk_size + 1` byte packets over a payload
///
/// Byte 0 of each packet is the framing byte, the rest is the next slice of
/// payload, zero padded when the payload runs out. Packets come out in
/// ascending offset order and all share one length.
pub struct Packetizer<'a> {
    payload: &'a [u8],
    chunk_size: usize,
    framing_byte: u8,
    offset: usize,
}

impl<'a> Packetizer<'a> {
    pub fn new(payload: &'a [u8], chunk_size: usize, framing_byte: u8) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self { payload, chunk_size, framing_byte, offset: 0 }
    }

    pub fn packet_len(&self) -> usize {
        self.chunk_size + 1
    }
}

impl Iterator for Packetizer<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(self.payload.len());
        let mut packet = Vec::with_capacity(self.chunk_size + 1);
        packet.push(self.framing_byte);
        packet.extend_from_slice(&self.payload[self.offset..end]);
        packet.resize(self.chunk_size + 1, 0x00);
        self.offset = end;
        Some(packet)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = packet_count(self.payload.len() - self.offset, self.chunk_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Packetizer<'_> {}

/// Slice `payload` into framed packets, collected
pub fn packetize(payload: &[u8], chunk_size: usize, framing_byte: u8) -> Vec<Vec<u8>> {
    Packetizer::new(payload, chunk_size, framing_byte).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::profile::{lookup, DeviceIdentity};
    use image::Rgb;
    use proptest::prelude::*;

    #[test]
    fn test_short_tail_is_padded() {
        let packets = packetize(&[1, 2, 3, 4, 5], 4, 0x00);
        assert_eq!(packets, vec![vec![0, 1, 2, 3, 4], vec![0, 5, 0, 0, 0]]);
    }

    #[test]
    fn test_exact_multiple_has_no_padding_packet() {
        let packets = packetize(&[9; 8], 4, 0x00);
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p == &vec![0, 9, 9, 9, 9]));
    }

    #[test]
    fn test_empty_payload_has_no_packets() {
        assert!(packetize(&[], 64, 0x00).is_empty());
    }

    #[test]
    fn test_framing_byte_leads_every_packet() {
        let packets = packetize(&[0xAA; 10], 3, 0x01);
        assert!(packets.iter().all(|p| p[0] == 0x01));
    }

    #[test]
    fn test_trofeo_frame_packet_count() {
        let profile = lookup(DeviceIdentity::new(0x0418, 0x5303)).unwrap();
        let img = RgbImage::from_pixel(profile.width, profile.height, Rgb([10, 20, 30]));
        let frame = EncodedFrame::new(profile, &img);
        assert_eq!(frame.len(), 8 + 320 * 320 * 2);
        let packets = frame.packets(profile);
        assert_eq!(packets.len(), (8 + 320 * 320 * 2usize).div_ceil(64));
        assert!(packets.into_iter().all(|p| p.len() == 65));
    }

    proptest! {
        #[test]
        fn prop_packets_reassemble_payload(
            payload in prop::collection::vec(any::<u8>(), 0..2048),
            chunk in 1usize..600,
        ) {
            let packets = packetize(&payload, chunk, 0x00);
            prop_assert_eq!(packets.len(), payload.len().div_ceil(chunk));
            prop_assert!(packets.iter().all(|p| p.len() == chunk + 1));

            let mut joined: Vec<u8> = packets.iter().flat_map(|p| p[1..].to_vec()).collect();
            prop_assert!(joined[payload.len()..].iter().all(|&b| b == 0));
            joined.truncate(payload.len());
            prop_assert_eq!(joined, payload);
        }
    }
}
