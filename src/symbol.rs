use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use log::debug;
use qrcode::render::unicode::Dense1x2;
use qrcode::{Color, EcLevel, QrCode};

const DARK_PIXEL: u8 = 0;
const LIGHT_PIXEL: u8 = 255;

/// How a symbol is built and laid out as a bitmap.
///
/// `box_size` is the side of one module in pixels and `border` the width of
/// the light frame around the symbol, in modules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolConfig {
    pub ec_level: EcLevel,
    pub box_size: u32,
    pub border: u32,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        SymbolConfig {
            ec_level: EcLevel::Q,
            box_size: 6,
            border: 1,
        }
    }
}

/// Encodes `text` into the smallest symbol that fits it at the configured
/// error correction level.
pub fn build(text: &str, config: &SymbolConfig) -> Result<QrCode> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), config.ec_level)
        .with_context(|| format!("failed to encode {} bytes as a QR code", text.len()))?;

    debug!(
        "built QR symbol {:?} at {:?}, {} modules wide",
        code.version(),
        code.error_correction_level(),
        code.width()
    );

    Ok(code)
}

pub fn render_ascii(code: &QrCode) -> String {
    code.render::<Dense1x2>().quiet_zone(true).build()
}

pub fn render_bitmap(code: &QrCode, config: &SymbolConfig) -> GrayImage {
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let border = config.border;
    let box_size = config.box_size.max(1);
    let side = (modules + 2 * border) * box_size;

    GrayImage::from_fn(side, side, |x, y| {
        let (column, row) = (x / box_size, y / box_size);

        if column < border || row < border || column >= modules + border || row >= modules + border
        {
            return Luma([LIGHT_PIXEL]);
        }

        let index = ((row - border) * modules + (column - border)) as usize;

        match colors[index] {
            Color::Dark => Luma([DARK_PIXEL]),
            Color::Light => Luma([LIGHT_PIXEL]),
        }
    })
}

#[test]
fn default_config_test() {
    let config = SymbolConfig::default();

    assert_eq!(EcLevel::Q, config.ec_level);
    assert_eq!(6, config.box_size);
    assert_eq!(1, config.border);
}

#[test]
fn build_test() {
    let code = build("hello", &SymbolConfig::default()).unwrap();

    assert_eq!(21, code.width());
    assert_eq!(EcLevel::Q, code.error_correction_level());

    let longer = build(&"x".repeat(200), &SymbolConfig::default()).unwrap();

    assert!(longer.width() > code.width());
}

#[test]
fn build_too_long_test() {
    let error = build(&"x".repeat(4000), &SymbolConfig::default()).err().unwrap();

    assert!(error.to_string().contains("4000 bytes"));
}

#[test]
fn render_bitmap_test() {
    let config = SymbolConfig::default();
    let code = build("hello", &config).unwrap();
    let image = render_bitmap(&code, &config);

    assert_eq!((138, 138), image.dimensions());

    // border
    assert_eq!(LIGHT_PIXEL, image.get_pixel(0, 0)[0]);
    assert_eq!(LIGHT_PIXEL, image.get_pixel(137, 137)[0]);
    assert_eq!(LIGHT_PIXEL, image.get_pixel(5, 70)[0]);

    // top-left finder pattern corner, one module in
    assert_eq!(DARK_PIXEL, image.get_pixel(6, 6)[0]);
    assert_eq!(DARK_PIXEL, image.get_pixel(11, 11)[0]);

    // finder separator ring
    assert_eq!(LIGHT_PIXEL, image.get_pixel(6 + 6 * 7, 6)[0]);

    for pixel in image.pixels() {
        assert!(pixel[0] == DARK_PIXEL || pixel[0] == LIGHT_PIXEL);
    }
}

#[test]
fn render_bitmap_layout_test() {
    let code = build("hello", &SymbolConfig::default()).unwrap();

    let config = SymbolConfig {
        ec_level: EcLevel::Q,
        box_size: 2,
        border: 4,
    };
    let image = render_bitmap(&code, &config);

    assert_eq!((58, 58), image.dimensions());
    assert_eq!(LIGHT_PIXEL, image.get_pixel(7, 7)[0]);
    assert_eq!(DARK_PIXEL, image.get_pixel(8, 8)[0]);
}

#[test]
fn render_ascii_test() {
    let code = build("hello", &SymbolConfig::default()).unwrap();
    let ascii = render_ascii(&code);

    assert!(ascii.contains('█'));
    assert!(ascii.lines().count() > 10);
    assert!(ascii
        .lines()
        .all(|line| line.chars().count() == ascii.lines().next().unwrap().chars().count()));
}
