/*
 *  canvas.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  embedded-graphics draw target over an RGB frame, with alpha blending
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

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use image::{Rgb, RgbImage};

/// Blend one 8-bit channel, `alpha` 0 keeps `dst`, 255 takes `src`
#[inline]
pub fn blend(src: u8, dst: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((src as u32 * a + dst as u32 * (255 - a) + 127) / 255) as u8
}

/// Borrowed view of a frame that embedded-graphics can draw into.
///
/// Every pixel drawn is blended at the canvas alpha, so text picks up the
/// `#RRGGBBAA` transparency from the theme.
pub struct Canvas<'a> {
    img: &'a mut RgbImage,
    alpha: u8,
}

impl<'a> Canvas<'a> {
    pub fn new(img: &'a mut RgbImage, alpha: u8) -> Self {
        Self { img, alpha }
    }

    pub fn width(&self) -> u32 { self.img.width() }
    pub fn height(&self) -> u32 { self.img.height() }

    /// Map a point to pixel coordinates; None if out of bounds
    #[inline]
    fn coords(&self, p: Point) -> Option<(u32, u32)> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as u32, p.y as u32);
            if x < self.img.width() && y < self.img.height() {
                return Some((x, y));
            }
        }
        None
    }

    #[inline]
    fn put(&mut self, x: u32, y: u32, c: Rgb888) {
        let a = self.alpha;
        let Rgb([r, g, b]) = *self.img.get_pixel(x, y);
        self.img.put_pixel(x, y, Rgb([blend(c.r(), r, a), blend(c.g(), g, a), blend(c.b(), b, a)]));
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.img.width(), self.img.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some((x, y)) = self.coords(p) {
                self.put(x, y, c);
            }
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        let Size { width, height } = area.size;
        if width == 0 || height == 0 { return Ok(()); }

        // row-major, clipping per pixel since the area may hang off the frame
        let mut it = colors.into_iter();
        for row in 0..height as i32 {
            for col in 0..width as i32 {
                let Some(c) = it.next() else { return Ok(()) };
                if let Some((x, y)) = self.coords(area.top_left + Point::new(col, row)) {
                    self.put(x, y, c);
                }
            }
        }
        Ok(())
    }
}
