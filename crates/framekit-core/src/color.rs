//! Color conversions between 24-bit RGB and the panel-native RGB565.
//!
//! Colors travel through the API as `0x00RRGGBB` values. Surfaces store
//! RGB565 big-endian, which is the byte order the panel expects on the wire.

/// Packs 8-bit channels into RGB565.
#[inline]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r5 = (r >> 3) as u16;
    let g6 = (g >> 2) as u16;
    let b5 = (b >> 3) as u16;
    (r5 << 11) | (g6 << 5) | b5
}

/// Converts an RGB565 pixel to 8-bit channels, replicating the high bits
/// into the low ones so that full intensity maps to 0xFF.
#[inline]
pub fn rgb565_to_rgb888(pixel: u16) -> (u8, u8, u8) {
    let r = ((pixel >> 11) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x3F) as u8;
    let b = (pixel & 0x1F) as u8;
    let r8 = (r << 3) | (r >> 2);
    let g8 = (g << 2) | (g >> 4);
    let b8 = (b << 3) | (b >> 2);
    (r8, g8, b8)
}

/// Packs a `0xRRGGBB` color into RGB565.
#[inline]
pub fn color_to_rgb565(color: u32) -> u16 {
    let (r, g, b) = split_color(color);
    rgb888_to_rgb565(r, g, b)
}

/// Unpacks RGB565 to a `0xRRGGBB` color with the dropped low bits zeroed.
///
/// This is the inverse of [`color_to_rgb565`] up to truncation, so
/// `rgb565_to_color(color_to_rgb565(c)) == truncate_to_rgb565(c)`.
#[inline]
pub fn rgb565_to_color(pixel: u16) -> u32 {
    let r = ((pixel >> 11) & 0x1F) as u32;
    let g = ((pixel >> 5) & 0x3F) as u32;
    let b = (pixel & 0x1F) as u32;
    (r << 19) | (g << 10) | (b << 3)
}

/// Drops the bits of a `0xRRGGBB` color that RGB565 cannot hold.
#[inline]
pub fn truncate_to_rgb565(color: u32) -> u32 {
    color & 0x00F8_FCF8
}

/// Splits a `0xRRGGBB` color into channels.
#[inline]
pub fn split_color(color: u32) -> (u8, u8, u8) {
    (
        ((color >> 16) & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
        (color & 0xFF) as u8,
    )
}

/// Joins channels into a `0xRRGGBB` color.
#[inline]
pub fn join_color(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Parses a hex color string (`#RRGGBB` or `RRGGBB`) to `0xRRGGBB`.
pub fn parse_hex_color(hex: &str) -> Option<u32> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(join_color(r, g, b))
}
