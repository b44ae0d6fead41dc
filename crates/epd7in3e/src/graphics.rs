//! Graphics support via embedded-graphics
//!
//! [`Framebuffer`] implements [`DrawTarget`] with [`Color`] as its pixel
//! color, so any embedded-graphics primitive, font or image can be drawn
//! into a frame before it is sent with
//! [`EpdModule::display_framebuffer`](crate::module::EpdModule::display_framebuffer).
//!
//! Pixels outside the frame are dropped, never reported as errors.
//!
//! ## Example
//!
//! ```rust,ignore
//! use epd7in3e::{Color, Framebuffer, HEIGHT, WIDTH};
//! use embedded_graphics::{
//!     mono_font::{ascii::FONT_10X20, MonoTextStyle},
//!     prelude::*,
//!     primitives::{Circle, PrimitiveStyle, Rectangle},
//!     text::Text,
//! };
//!
//! let mut frame = Framebuffer::new(WIDTH, HEIGHT);
//!
//! Rectangle::new(Point::new(10, 10), Size::new(200, 100))
//!     .into_styled(PrimitiveStyle::with_fill(Color::Red))
//!     .draw(&mut frame)?;
//!
//! Circle::new(Point::new(300, 40), 80)
//!     .into_styled(PrimitiveStyle::with_stroke(Color::Blue, 4))
//!     .draw(&mut frame)?;
//!
//! Text::new("Hello, E-Paper!", Point::new(10, 200),
//!     MonoTextStyle::new(&FONT_10X20, Color::Black))
//!     .draw(&mut frame)?;
//!
//! module.display_framebuffer(&frame)?;
//! ```

use core::convert::Infallible;
use embedded_graphics_core::{
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Point, Size},
    pixelcolor::{raw::RawU4, PixelColor},
    prelude::Pixel,
};

use crate::color::Color;
use crate::framebuffer::Framebuffer;

impl PixelColor for Color {
    type Raw = RawU4;
}

impl DrawTarget for Framebuffer {
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<Iter>(&mut self, pixels: Iter) -> Result<(), Self::Error>
    where
        Iter: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 {
                continue;
            }
            // Off-screen coordinates are the only failure and are ignored
            let _ = self.set_pixel(x as usize, y as usize, color);
        }

        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(self.width() as u32, self.height() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics_core::primitives::Rectangle;

    #[test]
    fn test_draw_iter_sets_pixels() {
        let mut frame = Framebuffer::new(8, 4);
        frame
            .draw_iter([
                Pixel(Point::new(0, 0), Color::Red),
                Pixel(Point::new(7, 3), Color::Green),
            ])
            .unwrap();

        assert_eq!(frame.get_pixel(0, 0).unwrap(), Color::Red);
        assert_eq!(frame.get_pixel(1, 0).unwrap(), Color::White);
        assert_eq!(frame.get_pixel(7, 3).unwrap(), Color::Green);
    }

    #[test]
    fn test_off_screen_pixels_dropped() {
        let mut frame = Framebuffer::new(4, 4);
        let before = frame.clone();
        frame
            .draw_iter([
                Pixel(Point::new(-1, 0), Color::Black),
                Pixel(Point::new(0, -1), Color::Black),
                Pixel(Point::new(4, 0), Color::Black),
                Pixel(Point::new(0, 4), Color::Black),
            ])
            .unwrap();
        assert_eq!(frame, before);
    }

    #[test]
    fn test_fill_solid_and_clear() {
        let mut frame = Framebuffer::new(6, 6);
        frame
            .fill_solid(
                &Rectangle::new(Point::new(2, 2), Size::new(2, 2)),
                Color::Blue,
            )
            .unwrap();
        assert_eq!(frame.get_pixel(2, 2).unwrap(), Color::Blue);
        assert_eq!(frame.get_pixel(3, 3).unwrap(), Color::Blue);
        assert_eq!(frame.get_pixel(4, 4).unwrap(), Color::White);

        DrawTarget::clear(&mut frame, Color::Black).unwrap();
        assert!(frame.as_bytes().iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_size() {
        let frame = Framebuffer::new(crate::WIDTH, crate::HEIGHT);
        assert_eq!(frame.size(), Size::new(800, 480));
    }
}
