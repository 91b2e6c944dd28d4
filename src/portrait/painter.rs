use std::hash::{Hash, Hasher};

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use image::Rgba;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHasher;
use tracing::{debug, error};

use crate::portrait::canvas::Canvas;
use crate::portrait::palette::{
    derive_palette, opaque, with_alpha, Figure, HairStyle, OutfitAccent, PortraitPalette,
};

pub const MAX_DIMENSION: u32 = 2048;
const DESIGN_SIZE: f32 = 400.0;
const TEXTURE_DOTS: usize = 20;

/// 1×1 PNG, returned if encoding the real portrait fails.
const FALLBACK_PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const EYE: Rgba<u8> = Rgba([47, 27, 12, 255]);
const FRAME: Rgba<u8> = Rgba([30, 30, 30, 255]);
const STUD: Rgba<u8> = Rgba([192, 192, 192, 255]);

/// Maps the 400×400 design grid onto the real surface.
struct Layout {
    sx: f32,
    sy: f32,
}

impl Layout {
    fn new(canvas: &Canvas) -> Self {
        Layout {
            sx: canvas.width() as f32 / DESIGN_SIZE,
            sy: canvas.height() as f32 / DESIGN_SIZE,
        }
    }

    fn x(&self, value: f32) -> f32 {
        value * self.sx
    }

    fn y(&self, value: f32) -> f32 {
        value * self.sy
    }

    fn pt(&self, x: f32, y: f32) -> (f32, f32) {
        (self.x(x), self.y(y))
    }

    fn stroke(&self, value: f32) -> f32 {
        (value * self.sx.min(self.sy)).max(1.0)
    }
}

/// Paints a stand-in portrait for `description` and returns it as a PNG
/// data URL. Never fails: unknown descriptions use default colours and an
/// encoding failure yields a 1×1 image.
pub fn generate_placeholder_image(description: &str, width: u32, height: u32) -> String {
    let width = width.clamp(1, MAX_DIMENSION);
    let height = height.clamp(1, MAX_DIMENSION);
    let palette = derive_palette(description);
    debug!(?palette, width, height, "Painting placeholder portrait");

    let canvas = paint_portrait(&palette, width, height, description_seed(description));
    match canvas.to_png() {
        Ok(bytes) => png_data_url(&bytes),
        Err(err) => {
            error!("Failed to encode placeholder portrait: {err}");
            FALLBACK_PNG_DATA_URL.to_string()
        }
    }
}

fn png_data_url(bytes: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Splits a `data:<mime>;base64,<payload>` URL into its MIME type and bytes.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>)> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data URL"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("data URL has no payload"))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| anyhow!("data URL is not base64 encoded"))?;
    let bytes = general_purpose::STANDARD.decode(payload.trim())?;
    Ok((mime_type.to_string(), bytes))
}

fn description_seed(description: &str) -> u64 {
    let mut hasher = FxHasher::default();
    description.hash(&mut hasher);
    hasher.finish()
}

fn paint_portrait(palette: &PortraitPalette, width: u32, height: u32, seed: u64) -> Canvas {
    let mut canvas = Canvas::new(width, height);
    let layout = Layout::new(&canvas);
    let mut rng = StdRng::seed_from_u64(seed);

    let (inner, outer) = palette.mood.gradient();
    canvas.fill_radial_gradient(inner, outer);

    let mature = palette.figure == Figure::Mature;
    let skin = opaque(palette.skin.rgb());
    let hair = opaque(palette.hair.rgb());

    // Torso
    let (torso_rx, torso_ry) = if mature { (125.0, 100.0) } else { (110.0, 90.0) };
    canvas.fill_ellipse(
        layout.x(200.0),
        layout.y(390.0),
        layout.x(torso_rx),
        layout.y(torso_ry),
        opaque(palette.outfit.rgb()),
    );
    match palette.accent {
        Some(OutfitAccent::CheerStripe) => {
            canvas.fill_rect(
                layout.x(110.0),
                layout.y(340.0),
                layout.x(180.0),
                layout.y(10.0),
                WHITE,
            );
        }
        Some(OutfitAccent::BusinessCollar) => {
            let width = layout.stroke(4.0);
            canvas.stroke_line(layout.pt(175.0, 300.0), layout.pt(200.0, 335.0), width, WHITE);
            canvas.stroke_line(layout.pt(225.0, 300.0), layout.pt(200.0, 335.0), width, WHITE);
        }
        None => {}
    }

    // Neck and head
    canvas.fill_rect(
        layout.x(180.0),
        layout.y(250.0),
        layout.x(40.0),
        layout.y(55.0),
        skin,
    );
    let (head_rx, head_ry) = if mature { (70.0, 85.0) } else { (65.0, 80.0) };
    canvas.fill_ellipse(
        layout.x(200.0),
        layout.y(190.0),
        layout.x(head_rx),
        layout.y(head_ry),
        skin,
    );

    paint_hair(&mut canvas, &layout, palette.hair_style, hair);
    paint_hair_texture(&mut canvas, &layout, palette, &mut rng);

    // Eyes
    for eye_x in [175.0, 225.0] {
        canvas.fill_circle(layout.x(eye_x), layout.y(185.0), layout.stroke(8.0), EYE);
        canvas.fill_circle(
            layout.x(eye_x + 3.0),
            layout.y(182.0),
            layout.stroke(3.0),
            WHITE,
        );
    }

    // Eyebrows
    let brow = layout.stroke(4.0);
    canvas.stroke_line(layout.pt(160.0, 167.0), layout.pt(188.0, 161.0), brow, hair);
    canvas.stroke_line(layout.pt(212.0, 161.0), layout.pt(240.0, 167.0), brow, hair);

    // Lips
    canvas.fill_ellipse(
        layout.x(200.0),
        layout.y(235.0),
        layout.x(16.0),
        layout.y(6.0),
        opaque(palette.lips.rgb()),
    );

    if palette.glasses {
        let frame = layout.stroke(3.0);
        for eye_x in [175.0, 225.0] {
            canvas.stroke_ellipse(
                layout.x(eye_x),
                layout.y(185.0),
                layout.x(17.0),
                layout.y(17.0),
                frame,
                FRAME,
            );
        }
        canvas.stroke_line(layout.pt(192.0, 185.0), layout.pt(208.0, 185.0), frame, FRAME);
    }

    if palette.earrings {
        for ear_x in [134.0, 266.0] {
            canvas.fill_circle(layout.x(ear_x), layout.y(215.0), layout.stroke(4.0), STUD);
        }
    }

    canvas
}

fn paint_hair(canvas: &mut Canvas, layout: &Layout, style: HairStyle, color: Rgba<u8>) {
    match style {
        HairStyle::Long => {
            canvas.fill_ellipse_above(
                layout.x(200.0),
                layout.y(175.0),
                layout.x(78.0),
                layout.y(88.0),
                layout.y(150.0),
                color,
            );
            for side_x in [133.0, 267.0] {
                canvas.fill_ellipse(
                    layout.x(side_x),
                    layout.y(250.0),
                    layout.x(22.0),
                    layout.y(105.0),
                    color,
                );
            }
        }
        HairStyle::Short => {
            canvas.fill_ellipse_above(
                layout.x(200.0),
                layout.y(180.0),
                layout.x(72.0),
                layout.y(84.0),
                layout.y(140.0),
                color,
            );
            for side_x in [139.0, 261.0] {
                canvas.fill_ellipse(
                    layout.x(side_x),
                    layout.y(165.0),
                    layout.x(10.0),
                    layout.y(28.0),
                    color,
                );
            }
        }
        HairStyle::Mohawk => {
            canvas.fill_ellipse(
                layout.x(200.0),
                layout.y(115.0),
                layout.x(14.0),
                layout.y(50.0),
                color,
            );
        }
        HairStyle::Medium => {
            canvas.fill_ellipse_above(
                layout.x(200.0),
                layout.y(178.0),
                layout.x(75.0),
                layout.y(86.0),
                layout.y(150.0),
                color,
            );
            for side_x in [137.0, 263.0] {
                canvas.fill_ellipse(
                    layout.x(side_x),
                    layout.y(205.0),
                    layout.x(18.0),
                    layout.y(60.0),
                    color,
                );
            }
        }
    }
}

/// Semi-transparent dots inside the hair's bounding box.
fn paint_hair_texture(
    canvas: &mut Canvas,
    layout: &Layout,
    palette: &PortraitPalette,
    rng: &mut StdRng,
) {
    let (x0, y0, x1, y1) = match palette.hair_style {
        HairStyle::Long => (125.0, 92.0, 275.0, 150.0),
        HairStyle::Short => (130.0, 98.0, 270.0, 140.0),
        HairStyle::Mohawk => (188.0, 68.0, 212.0, 160.0),
        HairStyle::Medium => (127.0, 94.0, 273.0, 150.0),
    };
    let base = palette.hair.rgb();
    let highlight = [
        base[0].saturating_add(40),
        base[1].saturating_add(40),
        base[2].saturating_add(40),
    ];
    for _ in 0..TEXTURE_DOTS {
        let x = rng.gen_range(x0..x1);
        let y = rng.gen_range(y0..y1);
        let r = rng.gen_range(1.5f32..4.0);
        canvas.fill_circle(
            layout.x(x),
            layout.y(y),
            layout.stroke(r),
            with_alpha(highlight, 77),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(data_url: &str) -> image::RgbaImage {
        let (mime, bytes) = decode_data_url(data_url).unwrap();
        assert_eq!(mime, "image/png");
        image::load_from_memory(&bytes).unwrap().to_rgba8()
    }

    #[test]
    fn empty_description_still_produces_png() {
        let url = generate_placeholder_image("", 400, 400);
        assert!(url.starts_with("data:image/png;base64,"));
        let image = decode(&url);
        assert_eq!(image.dimensions(), (400, 400));
    }

    #[test]
    fn dimensions_are_clamped() {
        let tiny = decode(&generate_placeholder_image("anything", 0, 0));
        assert_eq!(tiny.dimensions(), (1, 1));
        let wide = decode(&generate_placeholder_image("anything", 5000, 64));
        assert_eq!(wide.dimensions(), (MAX_DIMENSION, 64));
    }

    #[test]
    fn same_description_paints_same_pixels() {
        let a = generate_placeholder_image("punk rebel, pink mohawk", 120, 160);
        let b = generate_placeholder_image("punk rebel, pink mohawk", 120, 160);
        assert_eq!(a, b);
    }

    #[test]
    fn palette_colours_reach_the_canvas() {
        let image = decode(&generate_placeholder_image(
            "Sarah, cheerleader, shy and innocent, long blonde hair, pale skin",
            400,
            400,
        ));
        // Centre of the torso is outfit orange.
        assert_eq!(image.get_pixel(200, 380).0, [255, 140, 0, 255]);
        // Cheek is pale skin.
        assert_eq!(image.get_pixel(165, 215).0, [255, 228, 214, 255]);
        // Long side lock is golden.
        assert_eq!(image.get_pixel(133, 300).0, [255, 215, 0, 255]);
    }

    #[test]
    fn fallback_png_is_decodable() {
        let image = decode(FALLBACK_PNG_DATA_URL);
        assert_eq!(image.dimensions(), (1, 1));
    }

    #[test]
    fn data_url_errors_are_reported() {
        assert!(decode_data_url("https://example.com/a.png").is_err());
        assert!(decode_data_url("data:image/png,plain").is_err());
        assert!(decode_data_url("data:image/png;base64").is_err());
    }
}
