// src/export/compose.rs
use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::error::ClientResult;

pub const COMPOSITE_WIDTH: u32 = 1400;
pub const COMPOSITE_HEIGHT: u32 = 500;
pub const PANEL_WIDTH: u32 = COMPOSITE_WIDTH / 2;

/// Opaque white surface with `first` scaled into the left half and
/// `second` into the right half.
pub fn compose_side_by_side(first: &DynamicImage, second: &DynamicImage) -> RgbaImage {
    let mut surface = RgbaImage::from_pixel(COMPOSITE_WIDTH, COMPOSITE_HEIGHT, Rgba([255, 255, 255, 255]));

    for (chart, x) in [(first, 0), (second, PANEL_WIDTH)] {
        let scaled = imageops::resize(&chart.to_rgba8(), PANEL_WIDTH, COMPOSITE_HEIGHT, FilterType::Triangle);
        imageops::overlay(&mut surface, &scaled, i64::from(x), 0);
    }

    surface
}

pub fn encode_png(surface: &RgbaImage) -> ClientResult<Vec<u8>> {
    let mut png = Vec::new();
    surface.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}
