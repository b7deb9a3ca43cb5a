// src/charts.rs
//! Default raster renderer for the two distribution charts.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use image::{DynamicImage, Rgba, RgbaImage};
use strum::{Display, EnumIter};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Pie,
}

pub trait ChartRenderer: Send + Sync {
    fn render(&self, kind: ChartKind, distribution: &BTreeMap<String, i64>) -> ClientResult<DynamicImage>;
}

const PALETTE: [[u8; 3]; 6] = [
    [0x3b, 0x82, 0xf6],
    [0x10, 0xb9, 0x81],
    [0xf5, 0x9e, 0x0b],
    [0xef, 0x44, 0x44],
    [0x8b, 0x5c, 0xf6],
    [0xec, 0x48, 0x99],
];

/// Bars and slices on a transparent background, one palette colour per type
/// in distribution order.
pub struct RasterChartRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for RasterChartRenderer {
    fn default() -> Self {
        Self { width: 700, height: 500 }
    }
}

impl RasterChartRenderer {
    pub fn color(index: usize) -> Rgba<u8> {
        let [r, g, b] = PALETTE[index % PALETTE.len()];
        Rgba([r, g, b, 255])
    }

    fn bar(&self, counts: &[i64]) -> RgbaImage {
        let mut canvas = RgbaImage::new(self.width, self.height);
        let margin = self.width / 20;
        let plot_w = self.width.saturating_sub(2 * margin);
        let plot_h = self.height.saturating_sub(2 * margin);
        let max = counts.iter().copied().max().unwrap_or(0).max(1) as f64;
        let slot = plot_w / counts.len() as u32;
        let bar_w = (slot * 3 / 4).max(1);

        for (i, count) in counts.iter().enumerate() {
            let bar_h = ((*count as f64 / max) * plot_h as f64).round() as u32;
            let x0 = margin + i as u32 * slot + slot.saturating_sub(bar_w) / 2;
            let y0 = margin + plot_h - bar_h;
            for x in x0..(x0 + bar_w).min(self.width) {
                for y in y0..(margin + plot_h) {
                    canvas.put_pixel(x, y, Self::color(i));
                }
            }
        }
        canvas
    }

    fn pie(&self, counts: &[i64]) -> RgbaImage {
        let mut canvas = RgbaImage::new(self.width, self.height);
        let total: i64 = counts.iter().sum();
        let cx = self.width as f64 / 2.0;
        let cy = self.height as f64 / 2.0;
        let radius = cx.min(cy) * 0.9;

        // Cumulative end angle of each slice, starting at twelve o'clock.
        let mut ends = Vec::with_capacity(counts.len());
        let mut acc = 0.0;
        for count in counts {
            acc += *count as f64 / total as f64 * 2.0 * PI;
            ends.push(acc);
        }

        for (x, y, pixel) in canvas.enumerate_pixels_mut() {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let angle = (dx.atan2(-dy) + 2.0 * PI) % (2.0 * PI);
            let slice = ends.iter().position(|end| angle < *end).unwrap_or(counts.len() - 1);
            *pixel = Self::color(slice);
        }
        canvas
    }
}

impl ChartRenderer for RasterChartRenderer {
    fn render(&self, kind: ChartKind, distribution: &BTreeMap<String, i64>) -> ClientResult<DynamicImage> {
        let counts: Vec<i64> = distribution.values().map(|c| (*c).max(0)).collect();
        if counts.iter().all(|c| *c == 0) {
            return Err(ClientError::Export(format!("no data for the {} chart", kind)));
        }
        if self.width < 40 || self.height < 40 {
            return Err(ClientError::Export("chart canvas too small".into()));
        }

        let canvas = match kind {
            ChartKind::Bar => self.bar(&counts),
            ChartKind::Pie => self.pie(&counts),
        };
        Ok(DynamicImage::ImageRgba8(canvas))
    }
}
