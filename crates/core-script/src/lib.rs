//! core-script: the scripted tool runtime.
//!
//! Executes per-frame, user-authored tool programs in an embedded Lua
//! interpreter (restricted stdlib: math/string/table only; no io, os or
//! debug). A program defines either `render(ctx, layer)` or the classic
//! per-cell `main(coord, context, cursor, buffer)`, for which compilation
//! installs a compatibility wrapper.
//!
//! The host calls [`ScriptEngine::run_frame`] once per phase (keyboard,
//! then mouse). The document is exposed through scoped handles valid only
//! for the duration of the call; commands the program pushes into
//! `ctx.out` come back as typed [`ToolCommand`] records.

mod commands;
mod handles;
mod params;

pub use commands::ToolCommand;
pub use params::{ParamSpec, ParamType, ParamValue};

use core_canvas::{Canvas, CursorState, Hotkeys, KeyEvents, Mods};
use core_palette::xterm256_color32;
use mlua::{Function, Lua, LuaOptions, StdLib, Table, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("no tool program compiled")]
    NoProgram,
    #[error("compile error: {0}")]
    Compile(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error(transparent)]
    Canvas(#[from] core_canvas::CanvasError),
    #[error(transparent)]
    Lua(#[from] mlua::Error),
}

/// Which of the two per-frame passes is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    /// After input capture, before mouse-interaction resolution.
    #[default]
    Keyboard = 0,
    /// After cursor resolution.
    Mouse = 1,
}

/// Optional `settings` read back from a compiled program.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScriptSettings {
    /// Requested frame rate, clamped to 1..=240.
    pub fps: Option<u32>,
    /// Run a single frame instead of continuously.
    pub once: bool,
    /// Brush colors as xterm-256 indices.
    pub foreground: Option<u8>,
    pub background: Option<u8>,
}

/// Everything the host feeds a tool program for one phase.
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    pub cols: i32,
    pub rows: i32,
    pub frame: i64,
    /// Wall-clock seconds.
    pub time: f64,
    pub focused: bool,
    pub phase: FramePhase,
    /// Active brush colors as xterm-256 indices.
    pub fg: Option<u8>,
    pub bg: Option<u8>,
    /// Active brush glyph (UTF-8 and codepoint).
    pub brush: String,
    pub brush_cp: u32,
    /// Cell width/height ratio.
    pub metrics_aspect: f32,
    pub caret_x: i32,
    pub caret_y: i32,
    /// Whether `ctx.caret.{x,y}` writes move the document caret.
    pub allow_caret_writeback: bool,
    pub keys: KeyEvents,
    pub mods: Mods,
    pub hotkeys: Hotkeys,
    /// Keymap action ids pressed this frame.
    pub actions_pressed: Vec<String>,
    /// Typed codepoints in arrival order.
    pub typed: Vec<char>,
    pub cursor: CursorState,
    pub cursor_prev: CursorState,
}

impl FrameContext {
    /// Seed a frame context from the document's input capture and geometry.
    /// Brush and metrics fields keep their defaults; hosts overwrite them
    /// with the active tool state.
    pub fn from_canvas(canvas: &Canvas, phase: FramePhase, frame: i64, time: f64) -> Self {
        let input = canvas.input();
        let (caret_row, caret_col) = canvas.caret();
        Self {
            cols: canvas.columns(),
            rows: canvas.rows(),
            frame,
            time,
            focused: input.focused,
            phase,
            fg: None,
            bg: None,
            brush: " ".to_string(),
            brush_cp: ' ' as u32,
            metrics_aspect: 0.5,
            caret_x: caret_col,
            caret_y: caret_row,
            allow_caret_writeback: false,
            keys: input.keys,
            mods: input.mods,
            hotkeys: input.hotkeys,
            actions_pressed: input.actions.clone(),
            typed: input.typed.clone(),
            cursor: input.cursor,
            cursor_prev: input.cursor_prev,
        }
    }
}

/// Compatibility wrapper synthesizing `render` from a classic `main`.
const MAIN_SHIM: &str = r#"
if type(render) ~= 'function' and type(main) == 'function' then
  local __tool_buf, __tool_cols, __tool_rows
  local function __tool_ensure_buf(cols, rows)
    if not __tool_buf then __tool_buf = {} end
    __tool_cols, __tool_rows = cols, rows
    local n = cols * rows
    for i = #__tool_buf, n + 1, -1 do __tool_buf[i] = nil end
    return __tool_buf
  end
  function render(ctx, layer)
    local cols = tonumber(ctx.cols) or 0
    local rows = tonumber(ctx.rows) or 0
    if cols <= 0 or rows <= 0 then return end
    local cursor = ctx.cursor
    local buf = __tool_buf
    if (not buf) or __tool_cols ~= cols or __tool_rows ~= rows then
      buf = __tool_ensure_buf(cols, rows)
    end
    local pre = rawget(_G, 'pre')
    if type(pre) == 'function' then pre(ctx, cursor, buf) end
    for y = 0, rows - 1 do
      local row = {}
      local anyStyle = false
      for x = 0, cols - 1 do
        local idx = x + y * cols
        local out = main({x = x, y = y, index = idx}, ctx, cursor, buf)
        if type(out) == 'table' then
          local ch = out.char
          if ch == nil then ch = out[1] end
          if ch == nil then ch = ' ' end
          if type(ch) == 'number' then ch = tostring(ch) end
          local fg = out.fg; if fg == nil then fg = out.color end
          local bg = out.bg; if bg == nil then bg = out.backgroundColor end
          if type(fg) ~= 'number' then fg = nil end
          if type(bg) ~= 'number' then bg = nil end
          if fg ~= nil or bg ~= nil then
            anyStyle = true
            layer:set(x, y, ch, fg, bg)
          else
            row[x + 1] = tostring(ch)
          end
        else
          if type(out) == 'number' then out = tostring(out) end
          row[x + 1] = tostring(out)
        end
      end
      if anyStyle then
        for x = 0, cols - 1 do
          local s = row[x + 1]
          if s ~= nil then layer:set(x, y, s) end
        end
      else
        layer:setRow(y, table.concat(row))
      end
    end
    local post = rawget(_G, 'post')
    if type(post) == 'function' then post(ctx, cursor, buf) end
  end
end
"#;

/// The embedded tool runtime. One instance per tool slot; compiling a new
/// program replaces the previous one.
pub struct ScriptEngine {
    lua: Lua,
    render: Option<Function>,
    ctx: Table,
    params_table: Table,
    out_table: Table,
    last_source: String,
    settings: ScriptSettings,
    params: Vec<ParamSpec>,
    param_values: HashMap<String, ParamValue>,
    param_defaults: HashMap<String, ParamValue>,
    /// Action ids set true on `ctx.actions` last frame; nilled out before
    /// the next frame so the table only carries current presses.
    prev_actions: Vec<String>,
}

impl ScriptEngine {
    /// Create a sandboxed runtime: math/string/table stdlib only, plus the
    /// reusable `ctx` table with its nested sub-tables.
    pub fn new() -> Result<Self, ScriptError> {
        let lua = Lua::new_with(StdLib::MATH | StdLib::STRING | StdLib::TABLE, LuaOptions::default())?;

        let ctx = lua.create_table()?;
        ctx.set("metrics", lua.create_table()?)?;
        let cursor = lua.create_table()?;
        cursor.set("p", lua.create_table()?)?;
        ctx.set("cursor", cursor)?;
        ctx.set("caret", lua.create_table()?)?;
        ctx.set("keys", lua.create_table()?)?;
        ctx.set("mods", lua.create_table()?)?;
        ctx.set("hotkeys", lua.create_table()?)?;
        ctx.set("actions", lua.create_table()?)?;
        let params_table = lua.create_table()?;
        ctx.set("params", &params_table)?;
        let out_table = lua.create_table()?;
        ctx.set("out", &out_table)?;

        Ok(Self {
            lua,
            render: None,
            ctx,
            params_table,
            out_table,
            last_source: String::new(),
            settings: ScriptSettings::default(),
            params: Vec::new(),
            param_values: HashMap::new(),
            param_defaults: HashMap::new(),
            prev_actions: Vec::new(),
        })
    }

    pub fn has_program(&self) -> bool {
        self.render.is_some()
    }

    pub fn settings(&self) -> ScriptSettings {
        self.settings
    }

    pub fn param_specs(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Replace the compiled program. Identical source with a valid program
    /// is a no-op. On failure the previous program is gone (matching "a
    /// compile error returns a descriptive string; no document change").
    pub fn compile(&mut self, source: &str) -> Result<(), ScriptError> {
        if source == self.last_source && self.render.is_some() {
            return Ok(());
        }
        self.last_source.clear();
        self.settings = ScriptSettings::default();
        self.params.clear();
        self.render = None;

        // A recompile must not inherit tool globals from the previous
        // program: a script that stops defining `settings` or `main` would
        // otherwise keep using the old ones.
        let globals = self.lua.globals();
        for name in ["settings", "render", "main", "pre", "post"] {
            globals.set(name, Value::Nil)?;
        }

        self.lua
            .load(source)
            .set_name("=tool")
            .exec()
            .map_err(|e| ScriptError::Compile(e.to_string()))?;

        let has_render = matches!(globals.get::<Value>("render"), Ok(Value::Function(_)));
        if !has_render {
            let has_main = matches!(globals.get::<Value>("main"), Ok(Value::Function(_)));
            if has_main {
                self.lua
                    .load(MAIN_SHIM)
                    .set_name("=tool_shim")
                    .exec()
                    .map_err(|e| ScriptError::Compile(e.to_string()))?;
            }
        }

        let render: Function = match globals.get::<Value>("render") {
            Ok(Value::Function(f)) => f,
            _ => {
                return Err(ScriptError::Compile(
                    "Script must define either:\n\
                     \x20 - function render(ctx, layer) ... end\n\
                     or:\n\
                     \x20 - function main(coord, context, cursor, buffer) ... end  \
                     (classic per-cell style; the host will wrap it)"
                        .to_string(),
                ));
            }
        };
        self.render = Some(render);

        self.read_settings();

        let (specs, defaults) = params::read_params(&self.lua).map_err(ScriptError::Compile)?;
        // Preserve compatible previous values; otherwise take defaults.
        let mut new_values = HashMap::new();
        for spec in &specs {
            let Some(default) = defaults.get(&spec.key) else {
                continue;
            };
            let value = match self.param_values.get(&spec.key) {
                Some(old) if old.param_type() == default.param_type() => old.clone(),
                _ => default.clone(),
            };
            new_values.insert(spec.key.clone(), value);
        }
        self.params = specs;
        self.param_defaults = defaults;
        self.param_values = new_values;

        self.last_source = source.to_string();
        debug!(
            target: "script",
            params = self.params.len(),
            fps = ?self.settings.fps,
            once = self.settings.once,
            "tool_compiled"
        );
        Ok(())
    }

    fn read_settings(&mut self) {
        let mut out = ScriptSettings::default();
        if let Ok(Value::Table(settings)) = self.lua.globals().get::<Value>("settings") {
            match settings.get::<Value>("fps") {
                Ok(Value::Integer(fps)) => out.fps = Some(fps.clamp(1, 240) as u32),
                Ok(Value::Number(fps)) => out.fps = Some((fps as i64).clamp(1, 240) as u32),
                _ => {}
            }
            if let Ok(Value::Boolean(once)) = settings.get::<Value>("once") {
                out.once = once;
            }
            out.foreground = read_color_field(&settings, &["fg", "foreground", "foregroundColor"]);
            out.background = read_color_field(&settings, &["bg", "background", "backgroundColor"]);
        }
        self.settings = out;
    }

    // ---------------------------------------------------------------------------------------------
    // Parameter access (host side)
    // ---------------------------------------------------------------------------------------------

    pub fn param_value(&self, key: &str) -> Option<&ParamValue> {
        self.param_values.get(key)
    }

    /// Set a parameter; the type must match the declaration.
    pub fn set_param(&mut self, key: &str, value: ParamValue) -> bool {
        match self.param_values.get_mut(key) {
            Some(slot) if slot.param_type() == value.param_type() => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    /// Arm a button parameter: it reads true for exactly one frame.
    pub fn fire_param_button(&mut self, key: &str) -> bool {
        match self.param_values.get_mut(key) {
            Some(ParamValue::Button(armed)) => {
                *armed = true;
                true
            }
            _ => false,
        }
    }

    pub fn reset_params_to_defaults(&mut self) {
        self.param_values = self.param_defaults.clone();
    }

    // ---------------------------------------------------------------------------------------------
    // Frame execution
    // ---------------------------------------------------------------------------------------------

    /// Run one phase of the compiled program against `canvas`.
    ///
    /// Per-frame errors leave the program compiled; the host decides how to
    /// surface repeated failures. Commands are returned only when
    /// `allow_tool_commands` is set (and `ctx.out` is cleared before the
    /// call in that case).
    pub fn run_frame(
        &mut self,
        canvas: &mut Canvas,
        layer_index: usize,
        frame: &FrameContext,
        allow_tool_commands: bool,
        clear_layer_first: bool,
    ) -> Result<Vec<ToolCommand>, ScriptError> {
        let render = self.render.clone().ok_or(ScriptError::NoProgram)?;

        if clear_layer_first {
            canvas.clear_layer(layer_index, ' ')?;
            // A requested fg/bg fill applies after clearing so defaults stay
            // stable when the layer resets every frame.
            let fg = self.settings.foreground.map(xterm256_color32);
            let bg = self.settings.background.map(xterm256_color32);
            if fg.is_some() || bg.is_some() {
                canvas.fill_layer(layer_index, None, fg, bg)?;
            }
        }

        self.fill_ctx(frame, allow_tool_commands)?;

        canvas.set_tool_running(true);
        let call_result = {
            let cell = RefCell::new(canvas);
            let result = self.lua.scope(|scope| {
                let canvas_tbl = handles::canvas_handle(&self.lua, scope, &cell)?;
                self.ctx.set("canvas", canvas_tbl)?;
                let layer_tbl = handles::layer_handle(
                    &self.lua,
                    scope,
                    &cell,
                    layer_index,
                    self.settings.foreground,
                    self.settings.background,
                );
                render.call::<()>((&self.ctx, layer_tbl?))
            });
            (result, cell.into_inner())
        };
        let (result, canvas) = call_result;
        canvas.set_tool_running(false);

        if let Err(e) = result {
            let msg = e.to_string();
            warn!(target: "script", phase = ?frame.phase, error = %msg, "tool_frame_failed");
            return Err(ScriptError::Runtime(msg));
        }

        let commands = if allow_tool_commands {
            commands::drain(&self.out_table)?
        } else {
            Vec::new()
        };

        if frame.allow_caret_writeback
            && let Ok(caret) = self.ctx.get::<Table>("caret")
        {
            let as_i32 = |v: mlua::Result<Value>| -> Option<i32> {
                match v {
                    Ok(Value::Integer(i)) => Some(i as i32),
                    Ok(Value::Number(n)) => Some(n as i32),
                    _ => None,
                }
            };
            if let (Some(x), Some(y)) = (as_i32(caret.get("x")), as_i32(caret.get("y"))) {
                canvas.set_caret(x, y);
            }
        }

        Ok(commands)
    }

    fn fill_ctx(&mut self, frame: &FrameContext, allow_tool_commands: bool) -> Result<(), ScriptError> {
        let ctx = &self.ctx;
        ctx.set("cols", frame.cols)?;
        ctx.set("rows", frame.rows)?;
        ctx.set("frame", frame.frame)?;
        ctx.set("time", frame.time)?;
        ctx.set("focused", frame.focused)?;
        ctx.set("phase", frame.phase as i64)?;
        ctx.set("fg", frame.fg)?;
        ctx.set("bg", frame.bg)?;
        ctx.set("brush", if frame.brush.is_empty() { " " } else { frame.brush.as_str() })?;
        ctx.set("brushCp", frame.brush_cp)?;

        // Host parameter values; buttons reset right after exposure.
        for spec in &self.params {
            let Some(value) = self.param_values.get_mut(&spec.key) else {
                continue;
            };
            match value {
                ParamValue::Bool(b) => self.params_table.set(spec.key.as_str(), *b)?,
                ParamValue::Int(i) => self.params_table.set(spec.key.as_str(), *i)?,
                ParamValue::Float(f) => self.params_table.set(spec.key.as_str(), *f)?,
                ParamValue::Enum(s) => self.params_table.set(spec.key.as_str(), s.as_str())?,
                ParamValue::Button(armed) => {
                    self.params_table.set(spec.key.as_str(), *armed)?;
                    *armed = false;
                }
            }
        }

        let metrics: Table = ctx.get("metrics")?;
        metrics.set("aspect", frame.metrics_aspect)?;

        let caret: Table = ctx.get("caret")?;
        caret.set("x", frame.caret_x)?;
        caret.set("y", frame.caret_y)?;

        let keys: Table = ctx.get("keys")?;
        let k = &frame.keys;
        keys.set("left", k.left)?;
        keys.set("right", k.right)?;
        keys.set("up", k.up)?;
        keys.set("down", k.down)?;
        keys.set("home", k.home)?;
        keys.set("end", k.end)?;
        keys.set("backspace", k.backspace)?;
        keys.set("delete", k.delete)?;
        keys.set("enter", k.enter)?;
        keys.set("escape", k.escape)?;
        keys.set("c", k.c)?;
        keys.set("v", k.v)?;
        keys.set("x", k.x)?;
        keys.set("a", k.a)?;

        let mods: Table = ctx.get("mods")?;
        mods.set("ctrl", frame.mods.ctrl)?;
        mods.set("shift", frame.mods.shift)?;
        mods.set("alt", frame.mods.alt)?;
        mods.set("super", frame.mods.superkey)?;

        let hotkeys: Table = ctx.get("hotkeys")?;
        hotkeys.set("copy", frame.hotkeys.copy)?;
        hotkeys.set("cut", frame.hotkeys.cut)?;
        hotkeys.set("paste", frame.hotkeys.paste)?;
        hotkeys.set("selectAll", frame.hotkeys.select_all)?;
        hotkeys.set("cancel", frame.hotkeys.cancel)?;
        hotkeys.set("deleteSelection", frame.hotkeys.delete_selection)?;

        // Actions: clear last frame's keys, then set the current presses,
        // so `ctx.actions` only ever holds this frame's action ids.
        let actions: Table = ctx.get("actions")?;
        for id in self.prev_actions.drain(..) {
            actions.set(id, Value::Nil)?;
        }
        for id in &frame.actions_pressed {
            actions.set(id.as_str(), true)?;
            self.prev_actions.push(id.clone());
        }

        if allow_tool_commands {
            for i in (1..=self.out_table.raw_len()).rev() {
                self.out_table.raw_set(i, Value::Nil)?;
            }
        }

        let typed = self.lua.create_table_with_capacity(frame.typed.len(), 0)?;
        for (i, cp) in frame.typed.iter().enumerate() {
            typed.raw_set(i + 1, cp.to_string())?;
        }
        ctx.set("typed", typed)?;

        let cursor: Table = ctx.get("cursor")?;
        cursor.set("valid", frame.cursor.valid)?;
        cursor.set("x", frame.cursor.x)?;
        cursor.set("y", frame.cursor.y)?;
        cursor.set("half_y", frame.cursor.half_y)?;
        cursor.set("left", frame.cursor.left)?;
        cursor.set("right", frame.cursor.right)?;
        let prev: Table = cursor.get("p")?;
        prev.set("x", frame.cursor_prev.x)?;
        prev.set("y", frame.cursor_prev.y)?;
        prev.set("half_y", frame.cursor_prev.half_y)?;
        prev.set("left", frame.cursor_prev.left)?;
        prev.set("right", frame.cursor_prev.right)?;

        Ok(())
    }
}

fn read_color_field(settings: &Table, keys: &[&str]) -> Option<u8> {
    for key in keys {
        match settings.get::<Value>(*key) {
            Ok(Value::Integer(i)) => return Some(i.clamp(0, 255) as u8),
            Ok(Value::Number(n)) => return Some((n as i64).clamp(0, 255) as u8),
            Ok(Value::String(s)) => {
                if let Some(idx) = parse_hex_color(&s.to_string_lossy()) {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// "#RRGGBB" or "RRGGBB" -> nearest xterm-256 index.
fn parse_hex_color(s: &str) -> Option<u8> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(core_palette::nearest_xterm256(r, g, b))
}
