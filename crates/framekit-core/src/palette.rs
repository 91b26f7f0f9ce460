//! Palette tables for the 16- and 256-color surface formats.

use std::fmt;
use std::str::FromStr;

use crate::color::color_to_rgb565;
use crate::{Error, Result};

/// Entry count of a PAL16 palette.
pub const PAL16_ENTRIES: usize = 16;

/// Entry count of a PAL256 palette.
pub const PAL256_ENTRIES: usize = 256;

/// Fixed-size lookup table from palette index to `0xRRGGBB`.
///
/// Immutable once built; surfaces share it through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteTable {
    entries: Box<[u32]>,
}

impl PaletteTable {
    /// Builds a table from exactly 16 or 256 colors.
    pub fn new(entries: Vec<u32>) -> Result<Self> {
        match entries.len() {
            PAL16_ENTRIES | PAL256_ENTRIES => Ok(Self {
                entries: entries
                    .into_iter()
                    .map(|c| c & 0x00FF_FFFF)
                    .collect(),
            }),
            n => Err(Error::PaletteSize(n)),
        }
    }

    /// Builds a table from packed `R, G, B` byte triples (48 or 768 bytes).
    pub fn from_rgb_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 3 != 0 {
            return Err(Error::PaletteSize(bytes.len() / 3));
        }
        let entries = bytes
            .chunks_exact(3)
            .map(|rgb| ((rgb[0] as u32) << 16) | ((rgb[1] as u32) << 8) | rgb[2] as u32)
            .collect();
        Self::new(entries)
    }

    /// Builds a table of `len` entries (16 or 256) from a shorter color list,
    /// filling the remainder with black.
    pub fn padded(colors: &[u32], len: usize) -> Result<Self> {
        if colors.len() > len {
            return Err(Error::PaletteSize(colors.len()));
        }
        let mut entries = colors.to_vec();
        entries.resize(len, 0);
        Self::new(entries)
    }

    /// Builds one of the built-in palettes.
    pub fn preset(preset: PalettePreset) -> Self {
        let entries = match preset {
            PalettePreset::Default => DEFAULT_16.to_vec(),
            PalettePreset::C64 => C64_16.to_vec(),
            PalettePreset::Apple2 => APPLE2_16.to_vec(),
            PalettePreset::Cga => CGA_16.to_vec(),
            PalettePreset::Msx => MSX_16.to_vec(),
            PalettePreset::Spectrum => SPECTRUM_16.to_vec(),
            PalettePreset::AdaptiveGs16 => ADAPTIVE_GS16_16.to_vec(),
            PalettePreset::Rgb676 => color_cube(&LEVELS_6, &LEVELS_7, &LEVELS_6),
            PalettePreset::Rgb685 => color_cube(&LEVELS_6, &LEVELS_8, &LEVELS_5),
            PalettePreset::Rgb884 => color_cube(&LEVELS_8, &LEVELS_8, &LEVELS_4),
        };
        Self {
            entries: entries.into_boxed_slice(),
        }
    }

    /// Number of entries (16 or 256).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a table holds 16 or 256 entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a color by index.
    pub fn get(&self, index: usize) -> Option<u32> {
        self.entries.get(index).copied()
    }

    /// Returns all entries.
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Returns the table converted to panel-native RGB565.
    pub fn rgb565_lut(&self) -> Vec<u16> {
        self.entries.iter().map(|&c| color_to_rgb565(c)).collect()
    }
}

/// Built-in palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalettePreset {
    Default,
    C64,
    Apple2,
    Cga,
    Msx,
    Spectrum,
    AdaptiveGs16,
    Rgb676,
    Rgb685,
    Rgb884,
}

impl PalettePreset {
    /// All presets, 16-color ones first.
    pub const ALL: [PalettePreset; 10] = [
        PalettePreset::Default,
        PalettePreset::C64,
        PalettePreset::Apple2,
        PalettePreset::Cga,
        PalettePreset::Msx,
        PalettePreset::Spectrum,
        PalettePreset::AdaptiveGs16,
        PalettePreset::Rgb676,
        PalettePreset::Rgb685,
        PalettePreset::Rgb884,
    ];

    /// Number of entries in this preset.
    pub fn entry_count(&self) -> usize {
        match self {
            PalettePreset::Rgb676 | PalettePreset::Rgb685 | PalettePreset::Rgb884 => {
                PAL256_ENTRIES
            }
            _ => PAL16_ENTRIES,
        }
    }
}

impl FromStr for PalettePreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "default" => Ok(PalettePreset::Default),
            "c64" => Ok(PalettePreset::C64),
            "apple2" => Ok(PalettePreset::Apple2),
            "cga" => Ok(PalettePreset::Cga),
            "msx" => Ok(PalettePreset::Msx),
            "spectrum" => Ok(PalettePreset::Spectrum),
            "adaptive-gs16" | "adaptive_gs16" => Ok(PalettePreset::AdaptiveGs16),
            "rgb676" | "676" => Ok(PalettePreset::Rgb676),
            "rgb685" | "685" => Ok(PalettePreset::Rgb685),
            "rgb884" | "884" => Ok(PalettePreset::Rgb884),
            _ => Err(Error::UnknownPalette(s.to_string())),
        }
    }
}

impl fmt::Display for PalettePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PalettePreset::Default => "default",
            PalettePreset::C64 => "c64",
            PalettePreset::Apple2 => "apple2",
            PalettePreset::Cga => "cga",
            PalettePreset::Msx => "msx",
            PalettePreset::Spectrum => "spectrum",
            PalettePreset::AdaptiveGs16 => "adaptive-gs16",
            PalettePreset::Rgb676 => "rgb676",
            PalettePreset::Rgb685 => "rgb685",
            PalettePreset::Rgb884 => "rgb884",
        };
        write!(f, "{}", name)
    }
}

// Channel levels for the 256-color cubes.
const LEVELS_4: [u8; 4] = [0x00, 0x55, 0xAA, 0xFF];
const LEVELS_5: [u8; 5] = [0x00, 0x40, 0x80, 0xC0, 0xFF];
const LEVELS_6: [u8; 6] = [0x00, 0x33, 0x66, 0x99, 0xCC, 0xFF];
const LEVELS_7: [u8; 7] = [0x00, 0x2B, 0x55, 0x80, 0xAA, 0xD5, 0xFF];
const LEVELS_8: [u8; 8] = [0x00, 0x24, 0x49, 0x6D, 0x92, 0xB6, 0xDB, 0xFF];

/// Red-major color cube, blue varying fastest; unused slots are black.
fn color_cube(r: &[u8], g: &[u8], b: &[u8]) -> Vec<u32> {
    let mut entries = Vec::with_capacity(PAL256_ENTRIES);
    for &rv in r {
        for &gv in g {
            for &bv in b {
                entries.push(((rv as u32) << 16) | ((gv as u32) << 8) | bv as u32);
            }
        }
    }
    entries.resize(PAL256_ENTRIES, 0);
    entries
}

#[rustfmt::skip]
const DEFAULT_16: [u32; 16] = [
    0x000000, 0xFFFFFF, 0xFF2121, 0xFF93C4, 0xFF8135, 0xFFF609, 0x249CA3, 0x78DC52,
    0x003FAD, 0x87F2FF, 0x8E2EC4, 0xA4839F, 0x5C406C, 0xE5CDC4, 0x91463D, 0x000000,
];

#[rustfmt::skip]
const C64_16: [u32; 16] = [
    0x000000, 0xFFFFFF, 0x883932, 0x67B6BD, 0x8B3F96, 0x55A049, 0x40318D, 0xBFCE72,
    0x8B5429, 0x574200, 0xB86962, 0x505050, 0x787878, 0x94E089, 0x7869C4, 0x9F9F9F,
];

#[rustfmt::skip]
const APPLE2_16: [u32; 16] = [
    0x000000, 0x6C2940, 0x403578, 0xD93CF0, 0x135740, 0x808080, 0x2697F0, 0xBFB4F8,
    0x404B07, 0xD9680F, 0x808080, 0xECA8BF, 0x26C30F, 0xBFCA87, 0x93D6BF, 0xFFFFFF,
];

#[rustfmt::skip]
const CGA_16: [u32; 16] = [
    0x000000, 0x0000AA, 0x00AA00, 0x00AAAA, 0xAA0000, 0xAA00AA, 0xAA5500, 0xAAAAAA,
    0x555555, 0x5555FF, 0x55FF55, 0x55FFFF, 0xFF5555, 0xFF55FF, 0xFFFF55, 0xFFFFFF,
];

#[rustfmt::skip]
const MSX_16: [u32; 16] = [
    0x000000, 0x000000, 0x3EB849, 0x74D07D, 0x5955E0, 0x8076F1, 0xB95E51, 0x65DBEF,
    0xDB6559, 0xFF897D, 0xCCC35E, 0xDED087, 0x3AA241, 0xB766B5, 0xCCCCCC, 0xFFFFFF,
];

#[rustfmt::skip]
const SPECTRUM_16: [u32; 16] = [
    0x000000, 0x0000C0, 0xC00000, 0xC000C0, 0x00C000, 0x00C0C0, 0xC0C000, 0xC0C0C0,
    0x000000, 0x0000FF, 0xFF0000, 0xFF00FF, 0x00FF00, 0x00FFFF, 0xFFFF00, 0xFFFFFF,
];

#[rustfmt::skip]
const ADAPTIVE_GS16_16: [u32; 16] = [
    0x040204, 0x888888, 0xC8C7C8, 0x484848, 0xA8A8A8, 0xE8E8E8, 0x686868, 0x282728,
    0x989898, 0x171917, 0xD8D7D8, 0x575857, 0xB8B8B8, 0xFCFEFC, 0x787878, 0x393839,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(
            PaletteTable::new(vec![0; 12]),
            Err(Error::PaletteSize(12))
        ));
        assert!(PaletteTable::new(vec![0; 16]).is_ok());
        assert!(PaletteTable::new(vec![0; 256]).is_ok());
        assert!(PaletteTable::from_rgb_bytes(&[0; 47]).is_err());
    }

    #[test]
    fn test_from_rgb_bytes() {
        let mut bytes = vec![0u8; 48];
        bytes[3..6].copy_from_slice(&[0x12, 0x34, 0x56]);
        let pal = PaletteTable::from_rgb_bytes(&bytes).unwrap();
        assert_eq!(pal.len(), 16);
        assert_eq!(pal.get(1), Some(0x123456));
        assert_eq!(pal.get(16), None);
    }

    #[test]
    fn test_padded() {
        let pal = PaletteTable::padded(&[0xFFFFFF, 0x00FF00], 16).unwrap();
        assert_eq!(pal.len(), 16);
        assert_eq!(pal.get(1), Some(0x00FF00));
        assert_eq!(pal.get(15), Some(0));
        assert!(PaletteTable::padded(&[0; 20], 16).is_err());
    }

    #[test]
    fn test_cube_presets() {
        let p676 = PaletteTable::preset(PalettePreset::Rgb676);
        assert_eq!(p676.get(1), Some(0x000033));
        assert_eq!(p676.get(6), Some(0x002B00));
        assert_eq!(p676.get(251), Some(0xFFFFFF));
        assert_eq!(p676.get(252), Some(0x000000));

        let p685 = PaletteTable::preset(PalettePreset::Rgb685);
        assert_eq!(p685.get(5), Some(0x002400));
        assert_eq!(p685.get(3), Some(0x0000C0));

        let p884 = PaletteTable::preset(PalettePreset::Rgb884);
        assert_eq!(p884.get(4), Some(0x002400));
        assert_eq!(p884.get(255), Some(0xFFFFFF));
    }

    #[test]
    fn test_preset_sizes_match_entry_count() {
        for preset in PalettePreset::ALL {
            assert_eq!(PaletteTable::preset(preset).len(), preset.entry_count());
        }
    }

    #[test]
    fn test_preset_names() {
        for preset in PalettePreset::ALL {
            assert_eq!(preset.to_string().parse::<PalettePreset>().unwrap(), preset);
        }
        assert!("nope".parse::<PalettePreset>().is_err());
    }

    #[test]
    fn test_rgb565_lut() {
        let pal = PaletteTable::preset(PalettePreset::Cga);
        let lut = pal.rgb565_lut();
        assert_eq!(lut.len(), 16);
        assert_eq!(lut[15], 0xFFFF);
        assert_eq!(lut[0], 0x0000);
    }
}
