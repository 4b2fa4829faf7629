/*
 *  display/encoder.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  RGB565 column-major pixel encoder for the panel raster
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

use image::RgbImage;

/// Bytes emitted per pixel
pub const BYTES_PER_PIXEL: usize = 2;

/// Pack 8-bit RGB into 5-6-5, keeping the most significant bits
#[inline]
pub fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Encoded payload length for a `width` x `height` frame
pub fn encoded_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// Encode `img` into the panel's native raster
///
/// Pixels are visited column by column, left to right, and bottom to top
/// within each column. Every pixel is written as little-endian RGB565,
/// except the last one of each column (1-based scan index divisible by the
/// height) which the panel expects as a `00 00` column marker.
pub fn encode_frame(img: &RgbImage) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let mut out = Vec::with_capacity(encoded_len(width, height));
    if height == 0 {
        return out;
    }

    let mut index: u64 = 0;
    for x in 0..width {
        for y in (0..height).rev() {
            index += 1;
            if index % height as u64 == 0 {
                out.extend_from_slice(&[0x00, 0x00]);
            } else {
                let [r, g, b] = img.get_pixel(x, y).0;
                out.extend_from_slice(&rgb565(r, g, b).to_le_bytes());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use proptest::prelude::*;

    #[test]
    fn test_rgb565_primaries() {
        assert_eq!(rgb565(255, 0, 0), 0xF800);
        assert_eq!(rgb565(0, 255, 0), 0x07E0);
        assert_eq!(rgb565(0, 0, 255), 0x001F);
        assert_eq!(rgb565(255, 255, 255), 0xFFFF);
        // low bits are dropped, not rounded
        assert_eq!(rgb565(0x07, 0x03, 0x07), 0x0000);
    }

    #[test]
    fn test_two_by_two_scan_order() {
        // row-major: (0,0)=red (1,0)=green (0,1)=blue (1,1)=white
        let img = RgbImage::from_fn(2, 2, |x, y| match (x, y) {
            (0, 0) => Rgb([255, 0, 0]),
            (1, 0) => Rgb([0, 255, 0]),
            (0, 1) => Rgb([0, 0, 255]),
            _ => Rgb([255, 255, 255]),
        });

        let out = encode_frame(&img);
        assert_eq!(out.len(), 8);
        // scan 1: (0,1) blue
        assert_eq!(&out[0..2], &0x001Fu16.to_le_bytes());
        // scan 2: (0,0) replaced by the column marker
        assert_eq!(&out[2..4], &[0x00, 0x00]);
        // scan 3: (1,1) white
        assert_eq!(&out[4..6], &[0xFF, 0xFF]);
        // scan 4: (1,0) marker
        assert_eq!(&out[6..8], &[0x00, 0x00]);
    }

    #[test]
    fn test_single_row_is_all_markers() {
        let img = RgbImage::from_pixel(4, 1, Rgb([200, 100, 50]));
        assert_eq!(encode_frame(&img), vec![0u8; 8]);
    }

    #[test]
    fn test_little_endian_per_pixel() {
        let img = RgbImage::from_pixel(1, 2, Rgb([255, 0, 0]));
        let out = encode_frame(&img);
        assert_eq!(&out[0..2], &[0x00, 0xF8]);
    }

    proptest! {
        #[test]
        fn prop_length_and_column_markers(
            width in 1u32..24,
            height in 1u32..24,
            seed in any::<u8>(),
        ) {
            let img = RgbImage::from_fn(width, height, |x, y| {
                let v = (x as u8).wrapping_mul(31) ^ (y as u8).wrapping_mul(17) ^ seed;
                Rgb([v, v.wrapping_add(85), v.wrapping_add(170)])
            });
            let out = encode_frame(&img);
            prop_assert_eq!(out.len(), encoded_len(width, height));

            let total = (width * height) as usize;
            for i in 1..=total {
                if i % height as usize == 0 {
                    prop_assert_eq!(&out[2 * (i - 1)..2 * i], &[0u8, 0u8][..]);
                }
            }
        }

        #[test]
        fn prop_non_marker_slots_carry_color(
            width in 1u32..12,
            height in 2u32..12,
            r in any::<u8>(), g in any::<u8>(), b in any::<u8>(),
        ) {
            let img = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
            let out = encode_frame(&img);
            let expected = rgb565(r, g, b).to_le_bytes();
            for (slot, px) in out.chunks_exact(2).enumerate() {
                if (slot + 1) % height as usize != 0 {
                    prop_assert_eq!(px, &expected[..]);
                }
            }
        }
    }
}
