//! Packed 4-bit framebuffer
//!
//! Two horizontally adjacent pixels share one byte: the even-x pixel in the
//! high nibble, the odd-x pixel in the low nibble. Rows are stored top to
//! bottom and each row is `ceil(width / 2)` bytes long. When the width is odd
//! the low nibble of the last byte in each row is unused and kept at zero.

use crate::color::Color;
use crate::error::Error;

/// Number of bytes in a packed frame of the given size
pub const fn buffer_size(width: usize, height: usize) -> usize {
    width.div_ceil(2) * height
}

/// Owned, packed pixel buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Framebuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Framebuffer {
    /// A white frame
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, Color::White)
    }

    /// A frame of a single color
    pub fn filled(width: usize, height: usize, color: Color) -> Self {
        let mut frame = Self {
            width,
            height,
            data: vec![0; buffer_size(width, height)],
        };
        frame.fill(color);
        frame
    }

    /// Wrap already packed bytes
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBufferSize`] unless `data` is exactly
    /// [`buffer_size`]`(width, height)` long. Nothing is truncated or padded.
    pub fn from_bytes(width: usize, height: usize, data: Vec<u8>) -> Result<Self, Error> {
        let expected = buffer_size(width, height);
        if data.len() != expected {
            return Err(Error::InvalidBufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a frame by asking `pixel(x, y)` for every coordinate
    pub fn from_fn<F>(width: usize, height: usize, mut pixel: F) -> Self
    where
        F: FnMut(usize, usize) -> Color,
    {
        let row_bytes = width.div_ceil(2);
        let mut data = Vec::with_capacity(buffer_size(width, height));
        for y in 0..height {
            for pair in 0..row_bytes {
                let x = pair * 2;
                let high = pixel(x, y).code();
                let low = if x + 1 < width {
                    pixel(x + 1, y).code()
                } else {
                    0
                };
                data.push((high << 4) | low);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Pack a row-major grid of `width * height` pixels
    pub fn pack(width: usize, height: usize, pixels: &[Color]) -> Result<Self, Error> {
        if pixels.len() != width * height {
            return Err(Error::InvalidBufferSize {
                expected: width * height,
                actual: pixels.len(),
            });
        }
        Ok(Self::from_fn(width, height, |x, y| pixels[y * width + x]))
    }

    /// Expand back into a row-major grid
    ///
    /// # Errors
    ///
    /// [`Error::InvalidColor`] if a nibble holds a reserved code, which can
    /// only happen for frames built with [`from_bytes`](Self::from_bytes).
    pub fn unpack(&self) -> Result<Vec<Color>, Error> {
        let mut pixels = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push(self.get_pixel(x, y)?);
            }
        }
        Ok(pixels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row_bytes(&self) -> usize {
        self.width.div_ceil(2)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn locate(&self, x: usize, y: usize) -> Result<(usize, bool), Error> {
        if x >= self.width || y >= self.height {
            return Err(Error::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok((x / 2 + y * self.row_bytes(), x % 2 == 0))
    }

    /// Set one pixel; the other pixel in the same byte is left untouched
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color) -> Result<(), Error> {
        let (index, high) = self.locate(x, y)?;
        let byte = &mut self.data[index];
        *byte = if high {
            (*byte & 0x0F) | (color.code() << 4)
        } else {
            (*byte & 0xF0) | color.code()
        };
        Ok(())
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> Result<Color, Error> {
        let (index, high) = self.locate(x, y)?;
        let byte = self.data[index];
        let code = if high { byte >> 4 } else { byte & 0x0F };
        Color::try_from(code)
    }

    /// Set every pixel to `color` in one pass
    pub fn fill(&mut self, color: Color) {
        let pair = color.packed_pair();
        if self.width % 2 == 0 {
            self.data.fill(pair);
            return;
        }
        let row_bytes = self.row_bytes();
        for row in self.data.chunks_mut(row_bytes) {
            if let Some((last, rest)) = row.split_last_mut() {
                rest.fill(pair);
                *last = color.code() << 4;
            }
        }
    }
}

impl AsRef<[u8]> for Framebuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
