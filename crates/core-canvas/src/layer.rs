//! Layer storage: four parallel row-major planes plus presentation metadata.

use bitflags::bitflags;
use core_palette::Color32;

bitflags! {
    /// Per-cell text attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attrs: u16 {
        const BOLD          = 1 << 0;
        const DIM           = 1 << 1;
        const ITALIC        = 1 << 2;
        const UNDERLINE     = 1 << 3;
        const STRIKETHROUGH = 1 << 4;
        const BLINK         = 1 << 5;
        const REVERSE       = 1 << 6;
    }
}

/// A cell mutation. `None` fields preserve the plane's current value, so a
/// glyph-only write cannot clobber colors and vice versa.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellWrite {
    pub cp: Option<char>,
    pub fg: Option<Color32>,
    pub bg: Option<Color32>,
    pub attrs: Option<Attrs>,
}

impl CellWrite {
    /// Glyph only; colors and attrs preserved.
    pub fn glyph(cp: char) -> Self {
        Self { cp: Some(cp), ..Self::default() }
    }

    /// Glyph plus both colors; attrs preserved.
    pub fn colored(cp: char, fg: Color32, bg: Color32) -> Self {
        Self { cp: Some(cp), fg: Some(fg), bg: Some(bg), attrs: None }
    }

    /// The fully transparent cell (used by delete/cut).
    pub fn transparent() -> Self {
        Self { cp: Some(' '), fg: Some(0), bg: Some(0), attrs: None }
    }
}

/// One value per plane for a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellValue {
    pub cp: char,
    pub fg: Color32,
    pub bg: Color32,
    pub attrs: Attrs,
}

impl CellValue {
    pub(crate) fn empty() -> Self {
        Self { cp: ' ', fg: 0, bg: 0, attrs: Attrs::empty() }
    }
}

/// A cell contributes nothing iff glyph is space and both colors are unset.
/// A space with a non-zero bg is visually opaque (background fill), and
/// attributes alone never make a cell opaque.
#[inline]
pub fn is_transparent_cell(cp: char, fg: Color32, bg: Color32) -> bool {
    cp == ' ' && fg == 0 && bg == 0
}

/// Transparency-lock check: when enabled, mutations must not flip a cell
/// between transparent and opaque.
#[inline]
pub(crate) fn transparency_transition_allowed(
    lock: bool,
    old: &CellValue,
    new: &CellValue,
) -> bool {
    if !lock {
        return true;
    }
    is_transparent_cell(old.cp, old.fg, old.bg) == is_transparent_cell(new.cp, new.fg, new.bg)
}

/// A single layer of the document. All layers share the document's
/// `cols x rows` shape; the layer's visible contribution is translated by
/// its signed offset.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub lock_transparency: bool,
    pub offset_x: i32,
    pub offset_y: i32,
    pub(crate) cells: Vec<char>,
    pub(crate) fg: Vec<Color32>,
    pub(crate) bg: Vec<Color32>,
    pub(crate) attrs: Vec<Attrs>,
}

impl Layer {
    pub(crate) fn blank(name: &str, cols: i32, rows: i32) -> Self {
        let n = (cols.max(0) as usize) * (rows.max(0) as usize);
        Self {
            name: name.to_string(),
            visible: true,
            lock_transparency: false,
            offset_x: 0,
            offset_y: 0,
            cells: vec![' '; n],
            fg: vec![0; n],
            bg: vec![0; n],
            attrs: vec![Attrs::empty(); n],
        }
    }

    pub(crate) fn resize_planes(&mut self, n: usize) {
        self.cells.resize(n, ' ');
        self.fg.resize(n, 0);
        self.bg.resize(n, 0);
        self.attrs.resize(n, Attrs::empty());
    }

    pub(crate) fn value_at(&self, idx: usize) -> CellValue {
        CellValue {
            cp: self.cells.get(idx).copied().unwrap_or(' '),
            fg: self.fg.get(idx).copied().unwrap_or(0),
            bg: self.bg.get(idx).copied().unwrap_or(0),
            attrs: self.attrs.get(idx).copied().unwrap_or_default(),
        }
    }

    /// Read-only plane access (row-major, `cols * rows` entries).
    pub fn cells(&self) -> &[char] {
        &self.cells
    }
    pub fn fg(&self) -> &[Color32] {
        &self.fg
    }
    pub fn bg(&self) -> &[Color32] {
        &self.bg
    }
    pub fn attrs(&self) -> &[Attrs] {
        &self.attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparency_is_glyph_and_both_colors() {
        assert!(is_transparent_cell(' ', 0, 0));
        assert!(!is_transparent_cell('x', 0, 0));
        assert!(!is_transparent_cell(' ', 1, 0));
        assert!(!is_transparent_cell(' ', 0, 1));
    }

    #[test]
    fn lock_permits_same_state_transitions() {
        let opaque = CellValue { cp: 'a', fg: 1, bg: 0, attrs: Attrs::empty() };
        let opaque2 = CellValue { cp: 'b', fg: 2, bg: 0, attrs: Attrs::empty() };
        let clear = CellValue::empty();
        assert!(transparency_transition_allowed(true, &opaque, &opaque2));
        assert!(!transparency_transition_allowed(true, &opaque, &clear));
        assert!(transparency_transition_allowed(false, &opaque, &clear));
    }

    #[test]
    fn attrs_do_not_affect_transparency() {
        let with_attrs = CellValue { cp: ' ', fg: 0, bg: 0, attrs: Attrs::UNDERLINE };
        let clear = CellValue::empty();
        assert!(transparency_transition_allowed(true, &with_attrs, &clear));
    }
}
