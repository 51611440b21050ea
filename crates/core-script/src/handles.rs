//! Scoped document handles exposed to tool programs.
//!
//! The canvas and layer handles are tables of scope-bound functions that
//! borrow the document only for the duration of one frame call; nothing a
//! program stores survives past the frame. Colors cross this boundary as
//! xterm-256 indices (or nil for unset); glyphs as one-codepoint strings.

use core_canvas::{Canvas, CellWrite, CopyMode, PasteMode};
use core_palette::{Color32, nearest_xterm256, unpack_rgb, xterm256_color32};
use mlua::{Lua, Scope, Table, Value};
use std::cell::RefCell;

/// Nearest xterm-256 index for a packed color; `None` for unset.
pub(crate) fn color32_to_xterm(c: Color32) -> Option<u8> {
    unpack_rgb(c).map(|(r, g, b)| nearest_xterm256(r, g, b))
}

fn index_arg_to_color(v: Option<Value>) -> Option<Color32> {
    match v {
        Some(Value::Integer(i)) => Some(xterm256_color32(i.clamp(0, 255) as u8)),
        Some(Value::Number(n)) => Some(xterm256_color32((n as i64).clamp(0, 255) as u8)),
        _ => None,
    }
}

fn first_codepoint(v: &Value) -> char {
    match v {
        Value::Integer(i) => char::from_u32((*i).max(0) as u32).unwrap_or(' '),
        Value::Number(n) => char::from_u32((*n as i64).max(0) as u32).unwrap_or(' '),
        Value::String(s) => s.to_string_lossy().chars().next().unwrap_or(' '),
        _ => ' ',
    }
}

fn parse_paste_mode(v: &Option<Value>) -> PasteMode {
    match v {
        Some(Value::Integer(1)) => PasteMode::CharOnly,
        Some(Value::Integer(2)) => PasteMode::ColorOnly,
        Some(Value::String(s)) => match s.to_string_lossy().to_ascii_lowercase().as_str() {
            "char" | "glyph" | "charonly" => PasteMode::CharOnly,
            "color" | "colour" | "coloronly" => PasteMode::ColorOnly,
            _ => PasteMode::Both,
        },
        _ => PasteMode::Both,
    }
}

fn opt_layer(v: &Option<Value>) -> Option<usize> {
    match v {
        Some(Value::Integer(i)) if *i >= 0 => Some(*i as usize),
        Some(Value::Number(n)) if *n >= 0.0 => Some(*n as usize),
        _ => None,
    }
}

/// Build the `ctx.canvas` handle: selection, clipboard and floating-move
/// operations plus composite/layer cell reads.
pub(crate) fn canvas_handle<'scope, 'env, 'a: 'env>(
    lua: &Lua,
    scope: &'scope Scope<'scope, 'env>,
    cell: &'env RefCell<&'a mut Canvas>,
) -> mlua::Result<Table> {
    let t = lua.create_table()?;

    t.set(
        "hasSelection",
        scope.create_function(move |_, _this: Value| Ok(cell.borrow().has_selection()))?,
    )?;

    t.set(
        "getSelection",
        scope.create_function(move |_, _this: Value| {
            match cell.borrow().selection_rect() {
                Some(r) => Ok((Some(r.x), Some(r.y), Some(r.w), Some(r.h))),
                None => Ok((None, None, None, None)),
            }
        })?,
    )?;

    t.set(
        "setSelection",
        scope.create_function(
            move |_, (_this, x0, y0, x1, y1): (Value, i64, i64, i64, i64)| {
                cell.borrow_mut().set_selection_corners(x0 as i32, y0 as i32, x1 as i32, y1 as i32);
                Ok(())
            },
        )?,
    )?;

    t.set(
        "clearSelection",
        scope.create_function(move |_, _this: Value| {
            cell.borrow_mut().clear_selection();
            Ok(())
        })?,
    )?;

    t.set(
        "selectionContains",
        scope.create_function(move |_, (_this, x, y): (Value, i64, i64)| {
            Ok(cell.borrow().selection_contains(x as i32, y as i32))
        })?,
    )?;

    // canvas:getCell(x, y, [mode], [layer])
    // The third slot accepts either a mode string ("composite"/"layer") or
    // a layer index; both forms are equivalent and kept for compatibility.
    t.set(
        "getCell",
        scope.create_function(
            move |_, (_this, x, y, mode_or_layer, layer): (Value, i64, i64, Option<Value>, Option<i64>)| {
                let canvas = cell.borrow();
                let mut want_layer = false;
                let mut layer_idx: Option<usize> = layer.and_then(|l| usize::try_from(l).ok());
                match &mode_or_layer {
                    Some(Value::String(s)) => {
                        want_layer = s.to_string_lossy().eq_ignore_ascii_case("layer");
                    }
                    Some(Value::Integer(i)) if *i >= 0 => layer_idx = Some(*i as usize),
                    _ => {}
                }

                let (cp, fg32, bg32) = if want_layer || layer_idx.is_some() {
                    let li = layer_idx.unwrap_or_else(|| canvas.active_layer());
                    match canvas.layer_cell_value(li, y as i32, x as i32) {
                        Some(v) => (v.cp, v.fg, v.bg),
                        None => (' ', 0, 0),
                    }
                } else {
                    match canvas.composite_cell_checked(y as i32, x as i32) {
                        Some(c) => (c.cp, c.fg, c.bg),
                        None => (' ', 0, 0),
                    }
                };

                Ok((
                    cp.to_string(),
                    color32_to_xterm(fg32),
                    color32_to_xterm(bg32),
                    cp as u32,
                ))
            },
        )?,
    )?;

    t.set(
        "clipboardHas",
        scope.create_function(move |_, _this: Value| Ok(core_canvas::clipboard_has()))?,
    )?;

    t.set(
        "clipboardSize",
        scope.create_function(move |_, _this: Value| {
            match core_canvas::clipboard_size() {
                Some((w, h)) => Ok((Some(w), Some(h))),
                None => Ok((None, None)),
            }
        })?,
    )?;

    // canvas:copySelection([modeOrLayer], [layer]) — mode is "layer"
    // (default) or "composite"; a number in the first slot is a layer.
    t.set(
        "copySelection",
        scope.create_function(
            move |_, (_this, mode_or_layer, layer): (Value, Option<Value>, Option<Value>)| {
                let mut mode = CopyMode::Layer;
                let mut layer_idx = opt_layer(&layer);
                if let Some(Value::String(s)) = &mode_or_layer {
                    if s.to_string_lossy().eq_ignore_ascii_case("composite") {
                        mode = CopyMode::Composite;
                    }
                } else if layer_idx.is_none() {
                    layer_idx = opt_layer(&mode_or_layer);
                }
                Ok(cell.borrow_mut().copy_selection(mode, layer_idx).is_ok())
            },
        )?,
    )?;

    t.set(
        "cutSelection",
        scope.create_function(move |_, (_this, layer): (Value, Option<Value>)| {
            Ok(cell.borrow_mut().cut_selection(opt_layer(&layer)).unwrap_or(false))
        })?,
    )?;

    t.set(
        "deleteSelection",
        scope.create_function(move |_, (_this, layer): (Value, Option<Value>)| {
            Ok(cell.borrow_mut().delete_selection(opt_layer(&layer)).unwrap_or(false))
        })?,
    )?;

    t.set(
        "pasteClipboard",
        scope.create_function(
            move |_,
                  (_this, x, y, layer, mode, transparent): (
                Value,
                i64,
                i64,
                Option<Value>,
                Option<Value>,
                Option<bool>,
            )| {
                let mode = parse_paste_mode(&mode);
                Ok(cell
                    .borrow_mut()
                    .paste_clipboard(
                        x as i32,
                        y as i32,
                        opt_layer(&layer),
                        mode,
                        transparent.unwrap_or(false),
                    )
                    .unwrap_or(false))
            },
        )?,
    )?;

    t.set(
        "isMovingSelection",
        scope.create_function(move |_, _this: Value| Ok(cell.borrow().is_moving_selection()))?,
    )?;

    t.set(
        "beginMoveSelection",
        scope.create_function(
            move |_, (_this, gx, gy, copy, layer): (Value, i64, i64, Option<bool>, Option<Value>)| {
                Ok(cell
                    .borrow_mut()
                    .begin_move_selection(
                        gx as i32,
                        gy as i32,
                        copy.unwrap_or(false),
                        opt_layer(&layer),
                    )
                    .is_ok())
            },
        )?,
    )?;

    t.set(
        "updateMoveSelection",
        scope.create_function(move |_, (_this, x, y): (Value, i64, i64)| {
            cell.borrow_mut().update_move_selection(x as i32, y as i32);
            Ok(())
        })?,
    )?;

    t.set(
        "commitMoveSelection",
        scope.create_function(move |_, (_this, layer): (Value, Option<Value>)| {
            Ok(cell.borrow_mut().commit_move_selection(opt_layer(&layer)).is_ok())
        })?,
    )?;

    t.set(
        "cancelMoveSelection",
        scope.create_function(move |_, (_this, layer): (Value, Option<Value>)| {
            Ok(cell.borrow_mut().cancel_move_selection(opt_layer(&layer)).is_ok())
        })?,
    )?;

    Ok(t)
}

/// Build the `layer` argument handed to `render(ctx, layer)`: cell writes
/// bound to one layer index for the frame.
pub(crate) fn layer_handle<'scope, 'env, 'a: 'env>(
    lua: &Lua,
    scope: &'scope Scope<'scope, 'env>,
    cell: &'env RefCell<&'a mut Canvas>,
    layer_index: usize,
    settings_fg: Option<u8>,
    settings_bg: Option<u8>,
) -> mlua::Result<Table> {
    let t = lua.create_table()?;
    t.set("index", layer_index)?;

    // layer:set(x, y, cp_or_str [, fg, bg])
    t.set(
        "set",
        scope.create_function(
            move |_,
                  (_this, x, y, cp, fg, bg): (
                Value,
                i64,
                i64,
                Value,
                Option<Value>,
                Option<Value>,
            )| {
                let write = CellWrite {
                    cp: Some(first_codepoint(&cp)),
                    fg: index_arg_to_color(fg),
                    bg: index_arg_to_color(bg),
                    attrs: None,
                };
                let _ = cell.borrow_mut().set_layer_cell(layer_index, y as i32, x as i32, write);
                Ok(())
            },
        )?,
    )?;

    // layer:get(x, y) -> glyph, fg, bg, cp
    t.set(
        "get",
        scope.create_function(move |_, (_this, x, y): (Value, i64, i64)| {
            let canvas = cell.borrow();
            let (cp, fg, bg) = match canvas.layer_cell_value(layer_index, y as i32, x as i32) {
                Some(v) => (v.cp, v.fg, v.bg),
                None => (' ', 0, 0),
            };
            Ok((cp.to_string(), color32_to_xterm(fg), color32_to_xterm(bg), cp as u32))
        })?,
    )?;

    // layer:clear([fill_glyph [, fg, bg]]) — colors fall back to the
    // program's settings.fg / settings.bg when omitted.
    t.set(
        "clear",
        scope.create_function(
            move |_, (_this, fill, fg, bg): (Value, Option<Value>, Option<Value>, Option<Value>)| {
                let fill_cp = fill.as_ref().map(first_codepoint).unwrap_or(' ');
                let fg = index_arg_to_color(fg).or_else(|| settings_fg.map(xterm256_color32));
                let bg = index_arg_to_color(bg).or_else(|| settings_bg.map(xterm256_color32));
                let mut canvas = cell.borrow_mut();
                let _ = canvas.clear_layer(layer_index, fill_cp);
                if fg.is_some() || bg.is_some() {
                    let _ = canvas.fill_layer(layer_index, None, fg, bg);
                }
                Ok(())
            },
        )?,
    )?;

    // layer:setRow(y, text) — clips or pads the string to the column count.
    t.set(
        "setRow",
        scope.create_function(move |_, (_this, y, text): (Value, i64, String)| {
            let mut canvas = cell.borrow_mut();
            let cols = canvas.columns();
            let mut x = 0i32;
            for cp in text.chars().take(cols as usize) {
                let _ = canvas.set_layer_cell(layer_index, y as i32, x, CellWrite::glyph(cp));
                x += 1;
            }
            while x < cols {
                let _ = canvas.set_layer_cell(layer_index, y as i32, x, CellWrite::glyph(' '));
                x += 1;
            }
            Ok(())
        })?,
    )?;

    t.set(
        "clearStyle",
        scope.create_function(move |_, (_this, x, y): (Value, i64, i64)| {
            let _ = cell.borrow_mut().clear_cell_style(layer_index, y as i32, x as i32);
            Ok(())
        })?,
    )?;

    Ok(t)
}
