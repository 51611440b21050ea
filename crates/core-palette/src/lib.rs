//! core-palette: named RGB palettes and index <-> packed-color conversion.
//!
//! The document engine stores packed 32-bit colors in its planes; palette
//! indices only appear at boundaries (tool scripts, XBin attribute bytes).
//! This crate owns:
//! - the builtin palettes (xterm-16, xterm-256, VGA-16),
//! - a process-wide registry of dynamic palettes keyed by content hash,
//! - exact and nearest-match index lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// Packed 32-bit ABGR color (alpha 0xFF when set). `0` means "unset":
/// no contribution to compositing, transparent for lock checks.
pub type Color32 = u32;

/// Reserved 16-bit index meaning "no palette entry" (unset color).
pub const UNSET_INDEX: u16 = u16::MAX;

/// Pack sRGB components into a [`Color32`] (ABGR layout, low byte is red).
#[inline]
pub const fn pack_rgb(r: u8, g: u8, b: u8) -> Color32 {
    0xFF00_0000 | ((b as u32) << 16) | ((g as u32) << 8) | (r as u32)
}

/// Unpack a [`Color32`] into sRGB components. Returns `None` for the unset value.
#[inline]
pub fn unpack_rgb(c: Color32) -> Option<(u8, u8, u8)> {
    if c == 0 {
        return None;
    }
    Some(((c & 0xFF) as u8, ((c >> 8) & 0xFF) as u8, ((c >> 16) & 0xFF) as u8))
}

// -------------------------------------------------------------------------------------------------
// Builtin palettes
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinPalette {
    /// 16 ANSI colors in xterm order (red=1).
    Xterm16,
    /// Full 256-entry xterm palette (16 system + 6x6x6 cube + 24 grays).
    Xterm256,
    /// 16 classic VGA text-mode colors in hardware order (blue=1).
    Vga16,
}

/// Identity of the palette a document references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaletteRef {
    Builtin(BuiltinPalette),
    /// Content hash of a dynamically registered palette.
    Dynamic(u64),
}

impl Default for PaletteRef {
    fn default() -> Self {
        PaletteRef::Builtin(BuiltinPalette::Xterm256)
    }
}

/// xterm system colors 0..=15 (also the xterm-16 palette).
const XTERM_SYSTEM: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00),
    (0x80, 0x00, 0x00),
    (0x00, 0x80, 0x00),
    (0x80, 0x80, 0x00),
    (0x00, 0x00, 0x80),
    (0x80, 0x00, 0x80),
    (0x00, 0x80, 0x80),
    (0xC0, 0xC0, 0xC0),
    (0x80, 0x80, 0x80),
    (0xFF, 0x00, 0x00),
    (0x00, 0xFF, 0x00),
    (0xFF, 0xFF, 0x00),
    (0x00, 0x00, 0xFF),
    (0xFF, 0x00, 0xFF),
    (0x00, 0xFF, 0xFF),
    (0xFF, 0xFF, 0xFF),
];

/// VGA text-mode colors in hardware order (matches XBin default palette).
const VGA16: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00),
    (0x00, 0x00, 0xAA),
    (0x00, 0xAA, 0x00),
    (0x00, 0xAA, 0xAA),
    (0xAA, 0x00, 0x00),
    (0xAA, 0x00, 0xAA),
    (0xAA, 0x55, 0x00),
    (0xAA, 0xAA, 0xAA),
    (0x55, 0x55, 0x55),
    (0x55, 0x55, 0xFF),
    (0x55, 0xFF, 0x55),
    (0x55, 0xFF, 0xFF),
    (0xFF, 0x55, 0x55),
    (0xFF, 0x55, 0xFF),
    (0xFF, 0xFF, 0x55),
    (0xFF, 0xFF, 0xFF),
];

/// Levels of the 6x6x6 color cube (indices 16..=231).
const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

fn xterm256_rgb(index: u8) -> (u8, u8, u8) {
    match index {
        0..=15 => XTERM_SYSTEM[index as usize],
        16..=231 => {
            let i = index as usize - 16;
            let r = CUBE_LEVELS[i / 36];
            let g = CUBE_LEVELS[(i / 6) % 6];
            let b = CUBE_LEVELS[i % 6];
            (r, g, b)
        }
        232..=255 => {
            let v = 8 + 10 * (index as u16 - 232);
            (v as u8, v as u8, v as u8)
        }
    }
}

fn builtin_rgb(pal: BuiltinPalette, index: u16) -> Option<(u8, u8, u8)> {
    match pal {
        BuiltinPalette::Xterm16 => XTERM_SYSTEM.get(index as usize).copied(),
        BuiltinPalette::Vga16 => VGA16.get(index as usize).copied(),
        BuiltinPalette::Xterm256 => {
            if index < 256 {
                Some(xterm256_rgb(index as u8))
            } else {
                None
            }
        }
    }
}

fn builtin_len(pal: BuiltinPalette) -> u16 {
    match pal {
        BuiltinPalette::Xterm16 | BuiltinPalette::Vga16 => 16,
        BuiltinPalette::Xterm256 => 256,
    }
}

// -------------------------------------------------------------------------------------------------
// Dynamic palette registry (process-global, append-only, keyed by content hash)
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DynamicPalette {
    pub name: String,
    pub entries: Vec<(u8, u8, u8)>,
}

fn registry() -> &'static Mutex<HashMap<u64, DynamicPalette>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, DynamicPalette>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn content_uid(entries: &[(u8, u8, u8)]) -> u64 {
    let mut h = DefaultHasher::new();
    entries.len().hash(&mut h);
    for &(r, g, b) in entries {
        r.hash(&mut h);
        g.hash(&mut h);
        b.hash(&mut h);
    }
    h.finish()
}

/// Register a dynamic palette and return its content UID. Equal RGB lists
/// deduplicate; an existing entry keeps its original name.
pub fn register_dynamic(name: &str, entries: Vec<(u8, u8, u8)>) -> u64 {
    let uid = content_uid(&entries);
    let mut reg = registry().lock().unwrap_or_else(|p| p.into_inner());
    reg.entry(uid).or_insert_with(|| {
        debug!(target: "palette", uid, name, len = entries.len(), "dynamic_palette_registered");
        DynamicPalette { name: name.to_string(), entries }
    });
    uid
}

/// Snapshot a registered dynamic palette, if present.
pub fn dynamic_palette(uid: u64) -> Option<DynamicPalette> {
    let reg = registry().lock().unwrap_or_else(|p| p.into_inner());
    reg.get(&uid).cloned()
}

// -------------------------------------------------------------------------------------------------
// Index <-> color conversion
// -------------------------------------------------------------------------------------------------

/// How `color32_to_index` resolves colors absent from the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Exact component match or the nearest entry by squared sRGB distance.
    #[default]
    Nearest,
    /// Exact component match or [`UNSET_INDEX`].
    ExactOnly,
}

/// Packed color for a palette index; `0` for the unset sentinel or an
/// out-of-range index.
pub fn index_to_color32(pal: PaletteRef, index: u16) -> Color32 {
    if index == UNSET_INDEX {
        return 0;
    }
    let rgb = match pal {
        PaletteRef::Builtin(b) => builtin_rgb(b, index),
        PaletteRef::Dynamic(uid) => {
            dynamic_palette(uid).and_then(|p| p.entries.get(index as usize).copied())
        }
    };
    match rgb {
        Some((r, g, b)) => pack_rgb(r, g, b),
        None => 0,
    }
}

fn dist2(a: (u8, u8, u8), b: (u8, u8, u8)) -> u32 {
    let dr = a.0 as i32 - b.0 as i32;
    let dg = a.1 as i32 - b.1 as i32;
    let db = a.2 as i32 - b.2 as i32;
    (dr * dr + dg * dg + db * db) as u32
}

fn nearest_in(entries: impl Iterator<Item = (u8, u8, u8)>, rgb: (u8, u8, u8)) -> Option<u16> {
    let mut best: Option<(u16, u32)> = None;
    for (i, entry) in entries.enumerate() {
        let d = dist2(entry, rgb);
        if best.map(|(_, bd)| d < bd).unwrap_or(true) {
            best = Some((i as u16, d));
            if d == 0 {
                break;
            }
        }
    }
    best.map(|(i, _)| i)
}

/// Palette index for a packed color. The unset color maps to
/// [`UNSET_INDEX`] regardless of policy.
pub fn color32_to_index(pal: PaletteRef, color: Color32, policy: MatchPolicy) -> u16 {
    let Some(rgb) = unpack_rgb(color) else {
        return UNSET_INDEX;
    };
    let nearest = match pal {
        PaletteRef::Builtin(b) => {
            nearest_in((0..builtin_len(b)).map(|i| builtin_rgb(b, i).unwrap_or((0, 0, 0))), rgb)
        }
        PaletteRef::Dynamic(uid) => {
            dynamic_palette(uid).and_then(|p| nearest_in(p.entries.iter().copied(), rgb))
        }
    };
    match (nearest, policy) {
        (Some(i), MatchPolicy::Nearest) => i,
        (Some(i), MatchPolicy::ExactOnly) => {
            if index_to_color32(pal, i) == color {
                i
            } else {
                UNSET_INDEX
            }
        }
        (None, _) => UNSET_INDEX,
    }
}

/// Nearest xterm-256 index for raw sRGB components. Hot path for the tool
/// runtime, which reports colors as xterm-256 indices.
pub fn nearest_xterm256(r: u8, g: u8, b: u8) -> u8 {
    nearest_in((0u16..256).map(|i| xterm256_rgb(i as u8)), (r, g, b)).unwrap_or(0) as u8
}

/// Packed color for an xterm-256 index.
pub fn xterm256_color32(index: u8) -> Color32 {
    let (r, g, b) = xterm256_rgb(index);
    pack_rgb(r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn packs_low_byte_red() {
        let c = pack_rgb(0x12, 0x34, 0x56);
        assert_eq!(c & 0xFF, 0x12);
        assert_eq!((c >> 8) & 0xFF, 0x34);
        assert_eq!((c >> 16) & 0xFF, 0x56);
        assert_eq!(c >> 24, 0xFF);
    }

    #[test]
    fn unset_round_trips_through_both_directions() {
        let pal = PaletteRef::Builtin(BuiltinPalette::Xterm256);
        assert_eq!(index_to_color32(pal, UNSET_INDEX), 0);
        assert_eq!(color32_to_index(pal, 0, MatchPolicy::Nearest), UNSET_INDEX);
    }

    #[test]
    fn xterm256_cube_and_grays() {
        // 16 is cube origin (0,0,0); 231 is cube max (255,255,255).
        assert_eq!(xterm256_rgb(16), (0, 0, 0));
        assert_eq!(xterm256_rgb(231), (255, 255, 255));
        // 196 = 16 + 36*5 is pure red.
        assert_eq!(xterm256_rgb(196), (255, 0, 0));
        // Grays run 8..=238 in steps of 10.
        assert_eq!(xterm256_rgb(232), (8, 8, 8));
        assert_eq!(xterm256_rgb(255), (238, 238, 238));
    }

    #[test]
    fn exact_colors_resolve_exactly() {
        let pal = PaletteRef::Builtin(BuiltinPalette::Xterm16);
        for i in 0u16..16 {
            let c = index_to_color32(pal, i);
            assert_eq!(color32_to_index(pal, c, MatchPolicy::ExactOnly), i);
        }
    }

    #[test]
    fn nearest_falls_back_for_off_palette_colors() {
        let pal = PaletteRef::Builtin(BuiltinPalette::Vga16);
        // Near-black resolves to VGA black.
        assert_eq!(color32_to_index(pal, pack_rgb(3, 2, 1), MatchPolicy::Nearest), 0);
        // ExactOnly refuses it.
        assert_eq!(color32_to_index(pal, pack_rgb(3, 2, 1), MatchPolicy::ExactOnly), UNSET_INDEX);
    }

    #[test]
    fn dynamic_palettes_deduplicate_by_content() {
        let a = register_dynamic("one", vec![(1, 2, 3), (4, 5, 6)]);
        let b = register_dynamic("two", vec![(1, 2, 3), (4, 5, 6)]);
        assert_eq!(a, b);
        let pal = dynamic_palette(a).unwrap();
        assert_eq!(pal.name, "one");
        assert_eq!(index_to_color32(PaletteRef::Dynamic(a), 1), pack_rgb(4, 5, 6));
    }

    #[test]
    fn nearest_xterm256_identity_on_palette_entries() {
        for i in [0u8, 15, 16, 21, 196, 231, 232, 255] {
            let (r, g, b) = xterm256_rgb(i);
            assert_eq!(index_to_color32(
                PaletteRef::Builtin(BuiltinPalette::Xterm256),
                nearest_xterm256(r, g, b) as u16,
            ), pack_rgb(r, g, b));
        }
    }
}
