//! Typed command records a tool program pushes into `ctx.out`.
//!
//! The host consumes these after both phases. Unknown record types and
//! records missing their required fields are ignored.

use mlua::{Table, Value};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCommand {
    /// Change the active brush colors (xterm-256 indices).
    PaletteSet { fg: Option<i64>, bg: Option<i64> },
    /// Change the active brush glyph.
    BrushSet { cp: u32 },
    /// Activate another tool by id.
    ToolActivate { id: String },
    /// Return to the previously active tool.
    ToolActivatePrev,
    /// Crop the canvas to the current selection.
    CropToSelection,
}

fn opt_int(table: &Table, key: &str) -> Option<i64> {
    match table.get::<Value>(key) {
        Ok(Value::Integer(i)) => Some(i),
        Ok(Value::Number(n)) => Some(n as i64),
        _ => None,
    }
}

/// Drain `ctx.out` into typed records.
pub(crate) fn drain(out: &Table) -> mlua::Result<Vec<ToolCommand>> {
    let mut commands = Vec::new();
    for i in 1..=out.raw_len() {
        let Ok(Value::Table(entry)) = out.raw_get::<Value>(i) else {
            continue;
        };
        let Ok(Value::String(ty)) = entry.get::<Value>("type") else {
            continue;
        };
        let ty = ty.to_string_lossy().to_string();
        match ty.as_str() {
            "palette.set" => {
                let fg = opt_int(&entry, "fg");
                let bg = opt_int(&entry, "bg");
                commands.push(ToolCommand::PaletteSet { fg, bg });
            }
            "brush.set" => {
                if let Some(cp) = opt_int(&entry, "cp") {
                    commands.push(ToolCommand::BrushSet { cp: cp.max(0) as u32 });
                }
            }
            "tool.activate" => {
                if let Ok(Value::String(id)) = entry.get::<Value>("id") {
                    let id = id.to_string_lossy().to_string();
                    if !id.is_empty() {
                        commands.push(ToolCommand::ToolActivate { id });
                    }
                }
            }
            "tool.activate_prev" => commands.push(ToolCommand::ToolActivatePrev),
            "canvas.crop_to_selection" => commands.push(ToolCommand::CropToSelection),
            other => {
                trace!(target: "script", command = other, "unknown_tool_command_ignored");
            }
        }
    }
    Ok(commands)
}
