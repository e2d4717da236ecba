//! Image decoding, network input preparation and landmark visualization.
//!
//! Images are handled as 8-bit sRGB [`RgbImage`]s throughout, which is also the channel order the
//! hand landmark network expects.

use std::convert::Infallible;

use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::{Rgb888, RgbColor},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle},
    text::{Baseline, Text},
};
use image::{imageops, ImageError, ImageFormat, RgbImage};

use crate::hand::{landmark::CONNECTIVITY, Hand};

/// Radius of the landmark markers drawn by [`draw_hand`], in pixels.
pub const MARKER_RADIUS: u32 = 5;

const MARKER_COLOR: Rgb888 = Rgb888::GREEN;
const SKELETON_COLOR: Rgb888 = Rgb888::new(127, 127, 127);
const LABEL_COLOR: Rgb888 = Rgb888::RED;

/// Decodes an encoded still image (JPEG or PNG) into RGB.
pub fn decode(data: &[u8]) -> Result<RgbImage, ImageError> {
    Ok(image::load_from_memory(data)?.into_rgb8())
}

/// Decodes a JPEG image, as delivered by MJPEG cameras.
pub fn decode_jpeg(data: &[u8]) -> Result<RgbImage, ImageError> {
    Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.into_rgb8())
}

/// Describes how an image was fitted into a network input of a different aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    src_width: u32,
    src_height: u32,
}

impl Letterbox {
    /// Maps a pixel position in the letterboxed image back to normalized coordinates of the source
    /// image.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.offset_x) / self.scale;
        let y = (y - self.offset_y) / self.scale;
        (x / self.src_width as f32, y / self.src_height as f32)
    }
}

/// Resizes `image` to `width`x`height` while keeping its aspect ratio, filling the remaining area
/// with black bars.
pub fn letterbox(image: &RgbImage, width: u32, height: u32) -> (RgbImage, Letterbox) {
    let (src_width, src_height) = image.dimensions();
    let scale = f32::min(
        width as f32 / src_width as f32,
        height as f32 / src_height as f32,
    );
    let scaled_width = ((src_width as f32 * scale).round() as u32).clamp(1, width);
    let scaled_height = ((src_height as f32 * scale).round() as u32).clamp(1, height);
    let offset_x = (width - scaled_width) / 2;
    let offset_y = (height - scaled_height) / 2;

    let mut target = RgbImage::new(width, height);
    if (scaled_width, scaled_height) == (src_width, src_height) {
        imageops::overlay(&mut target, image, offset_x.into(), offset_y.into());
    } else {
        let resized = imageops::resize(
            image,
            scaled_width,
            scaled_height,
            imageops::FilterType::Triangle,
        );
        imageops::overlay(&mut target, &resized, offset_x.into(), offset_y.into());
    }

    let letterbox = Letterbox {
        scale,
        offset_x: offset_x as f32,
        offset_y: offset_y as f32,
        src_width,
        src_height,
    };
    (target, letterbox)
}

/// Draws a hand's landmarks and skeleton onto `image`.
///
/// Every landmark is drawn as a filled green circle. If `label` is given, it is drawn above the
/// wrist.
pub fn draw_hand(image: &mut RgbImage, hand: &Hand, label: Option<&str>) {
    let (width, height) = image.dimensions();
    let mut target = Target(image);
    let point = |idx: usize| {
        let (x, y) = hand.landmarks()[idx].to_pixel(width, height);
        Point::new(x, y)
    };

    let skeleton = PrimitiveStyle::with_stroke(SKELETON_COLOR, 1);
    for (a, b) in CONNECTIVITY {
        Line::new(point(*a as usize), point(*b as usize))
            .into_styled(skeleton)
            .draw(&mut target)
            .unwrap_or_else(|never| match never {});
    }

    let marker = PrimitiveStyle::with_fill(MARKER_COLOR);
    for idx in 0..hand.landmarks().len() {
        Circle::with_center(point(idx), MARKER_RADIUS * 2 + 1)
            .into_styled(marker)
            .draw(&mut target)
            .unwrap_or_else(|never| match never {});
    }

    if let Some(label) = label {
        let wrist = point(0);
        let style = MonoTextStyle::new(&FONT_6X10, LABEL_COLOR);
        Text::with_baseline(label, wrist + Point::new(-20, 10), style, Baseline::Top)
            .draw(&mut target)
            .unwrap_or_else(|never| match never {});
    }
}

struct Target<'a>(&'a mut RgbImage);

impl OriginDimensions for Target<'_> {
    fn size(&self) -> Size {
        let (width, height) = self.0.dimensions();
        Size { width, height }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(pos, color) in pixels {
            if pos.x >= 0 && (pos.x as u32) < width && pos.y >= 0 && (pos.y as u32) < height {
                self.0.put_pixel(
                    pos.x as u32,
                    pos.y as u32,
                    image::Rgb([color.r(), color.g(), color.b()]),
                );
            }
        }

        Ok(())
    }
}
