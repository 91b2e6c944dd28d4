use std::io::Cursor;

use anyhow::Result;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::portrait::palette::Rgb;

/// Off-screen RGBA surface with source-over blending.
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Canvas {
            image: RgbaImage::new(width.max(1), height.max(1)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.width() && y < self.height() {
            Some(*self.image.get_pixel(x, y))
        } else {
            None
        }
    }

    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return;
        }
        let dst = self.image.get_pixel_mut(x as u32, y as u32);
        let src_a = color[3] as f32 / 255.0;
        if src_a <= 0.0 {
            return;
        }
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        for channel in 0..3 {
            let src_c = color[channel] as f32 / 255.0;
            let dst_c = dst[channel] as f32 / 255.0;
            let out_c = (src_c * src_a + dst_c * dst_a * (1.0 - src_a)) / out_a;
            dst[channel] = (out_c * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    /// Fills the whole surface with a radial gradient from `inner` at the
    /// centre to `outer` at the corners.
    pub fn fill_radial_gradient(&mut self, inner: Rgb, outer: Rgb) {
        let cx = self.width() as f32 / 2.0;
        let cy = self.height() as f32 / 2.0;
        let radius = (cx * cx + cy * cy).sqrt().max(1.0);
        for (x, y, pixel) in self.image.enumerate_pixels_mut() {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let t = ((dx * dx + dy * dy).sqrt() / radius).clamp(0.0, 1.0);
            let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            *pixel = Rgba([
                mix(inner[0], outer[0]),
                mix(inner[1], outer[1]),
                mix(inner[2], outer[2]),
                255,
            ]);
        }
    }

    pub fn fill_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, color: Rgba<u8>) {
        self.fill_ellipse_above(cx, cy, rx, ry, f32::INFINITY, color);
    }

    /// Fills only the part of the ellipse whose pixel centres lie above `limit_y`.
    pub fn fill_ellipse_above(
        &mut self,
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        limit_y: f32,
        color: Rgba<u8>,
    ) {
        if rx <= 0.0 || ry <= 0.0 {
            return;
        }
        let (x0, x1) = (floor(cx - rx), ceil(cx + rx));
        let (y0, y1) = (floor(cy - ry), ceil(cy + ry));
        for y in y0..=y1 {
            let py = y as f32 + 0.5;
            if py >= limit_y {
                break;
            }
            for x in x0..=x1 {
                let px = x as f32 + 0.5;
                let nx = (px - cx) / rx;
                let ny = (py - cy) / ry;
                if nx * nx + ny * ny <= 1.0 {
                    self.blend_pixel(x, y, color);
                }
            }
        }
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, color: Rgba<u8>) {
        self.fill_ellipse(cx, cy, r, r, color);
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        for py in floor(y)..ceil(y + h) {
            for px in floor(x)..ceil(x + w) {
                self.blend_pixel(px, py, color);
            }
        }
    }

    /// Outline of an ellipse, `thickness` pixels wide, centred on the edge.
    pub fn stroke_ellipse(
        &mut self,
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        thickness: f32,
        color: Rgba<u8>,
    ) {
        if rx <= 0.0 || ry <= 0.0 || thickness <= 0.0 {
            return;
        }
        let half = thickness / 2.0;
        let (outer_x, outer_y) = (rx + half, ry + half);
        let (inner_x, inner_y) = ((rx - half).max(0.0), (ry - half).max(0.0));
        for y in floor(cy - outer_y)..=ceil(cy + outer_y) {
            for x in floor(cx - outer_x)..=ceil(cx + outer_x) {
                let px = x as f32 + 0.5 - cx;
                let py = y as f32 + 0.5 - cy;
                let outside_inner = inner_x <= 0.0
                    || inner_y <= 0.0
                    || (px / inner_x).powi(2) + (py / inner_y).powi(2) > 1.0;
                let inside_outer = (px / outer_x).powi(2) + (py / outer_y).powi(2) <= 1.0;
                if inside_outer && outside_inner {
                    self.blend_pixel(x, y, color);
                }
            }
        }
    }

    pub fn stroke_line(
        &mut self,
        from: (f32, f32),
        to: (f32, f32),
        thickness: f32,
        color: Rgba<u8>,
    ) {
        let half = (thickness / 2.0).max(0.5);
        let (ax, ay) = from;
        let (bx, by) = to;
        let (dx, dy) = (bx - ax, by - ay);
        let len_sq = dx * dx + dy * dy;
        for y in floor(ay.min(by) - half)..=ceil(ay.max(by) + half) {
            for x in floor(ax.min(bx) - half)..=ceil(ax.max(bx) + half) {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                let t = if len_sq > 0.0 {
                    (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (qx, qy) = (ax + t * dx, ay + t * dy);
                if (px - qx).powi(2) + (py - qy).powi(2) <= half * half {
                    self.blend_pixel(x, y, color);
                }
            }
        }
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

fn floor(value: f32) -> i64 {
    value.floor() as i64
}

fn ceil(value: f32) -> i64 {
    value.ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn zero_sized_canvas_is_one_pixel() {
        let canvas = Canvas::new(0, 0);
        assert_eq!((canvas.width(), canvas.height()), (1, 1));
    }

    #[test]
    fn half_transparent_paint_blends() {
        let mut canvas = Canvas::new(1, 1);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, Rgba([0, 0, 255, 255]));
        canvas.blend_pixel(0, 0, Rgba([255, 0, 0, 128]));
        let pixel = canvas.pixel(0, 0).unwrap();
        assert_eq!(pixel[3], 255);
        assert!(pixel[0] > 120 && pixel[0] < 135);
        assert!(pixel[2] > 120 && pixel[2] < 135);
    }

    #[test]
    fn ellipse_covers_centre_not_corners() {
        let mut canvas = Canvas::new(20, 20);
        canvas.fill_ellipse(10.0, 10.0, 6.0, 4.0, RED);
        assert_eq!(canvas.pixel(10, 10), Some(RED));
        assert_eq!(canvas.pixel(0, 0).unwrap()[3], 0);
        assert_eq!(canvas.pixel(10, 2).unwrap()[3], 0);
    }

    #[test]
    fn clipped_ellipse_stops_at_limit() {
        let mut canvas = Canvas::new(20, 20);
        canvas.fill_ellipse_above(10.0, 10.0, 8.0, 8.0, 10.0, RED);
        assert_eq!(canvas.pixel(10, 5), Some(RED));
        assert_eq!(canvas.pixel(10, 12).unwrap()[3], 0);
    }

    #[test]
    fn stroked_ellipse_is_hollow() {
        let mut canvas = Canvas::new(40, 40);
        canvas.stroke_ellipse(20.0, 20.0, 10.0, 10.0, 2.0, RED);
        assert_eq!(canvas.pixel(20, 20).unwrap()[3], 0);
        assert_eq!(canvas.pixel(29, 20), Some(RED));
    }

    #[test]
    fn gradient_runs_from_centre_to_corner() {
        let mut canvas = Canvas::new(50, 50);
        canvas.fill_radial_gradient([255, 255, 255], [0, 0, 0]);
        let centre = canvas.pixel(25, 25).unwrap();
        let corner = canvas.pixel(0, 0).unwrap();
        assert!(centre[0] > 240);
        assert!(corner[0] < 20);
    }

    #[test]
    fn line_and_png_encoding() {
        let mut canvas = Canvas::new(10, 10);
        canvas.stroke_line((0.0, 5.0), (10.0, 5.0), 2.0, RED);
        assert_eq!(canvas.pixel(5, 5), Some(RED));
        let png = canvas.to_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
