//! core-keymap: declarative key binding schema + runtime evaluation.
//!
//! - Stores actions (id/title/category/description) each with 1+ bindings.
//! - Chord syntax `[mod+]*key` with mods Ctrl/Shift/Alt/Super (Cmd/Meta/Win
//!   accepted as aliases) and single-char, F1..F24 or named key tokens.
//! - Persists as a schema-versioned JSON record; user overrides merge onto
//!   built-in defaults by action id.
//! - Evaluation is pure: the host supplies a per-frame key snapshot, the
//!   engine answers "was this action pressed" under context/platform gates.

mod chord;
mod defaults;

pub use chord::{ChordError, KeyToken, Mods, NamedKey, ParsedChord, parse_chord};
pub use defaults::default_actions;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Persisted schema version for the keybindings store.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Any,
    Windows,
    Linux,
    MacOS,
}

impl Platform {
    /// Compile-time best effort.
    pub fn runtime() -> Platform {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else {
            Platform::Linux
        }
    }

    fn parse(s: &str) -> Platform {
        match s.to_ascii_lowercase().as_str() {
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            "macos" => Platform::MacOS,
            _ => Platform::Any,
        }
    }

    fn matches(self, runtime: Platform) -> bool {
        self == Platform::Any || self == runtime
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Context {
    #[default]
    Global,
    Editor,
    Selection,
    Canvas,
}

impl Context {
    fn parse(s: &str) -> Context {
        match s.to_ascii_lowercase().as_str() {
            "editor" => Context::Editor,
            "selection" => Context::Selection,
            "canvas" => Context::Canvas,
            _ => Context::Global,
        }
    }
}

/// What is currently "active" when evaluating a binding.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub global: bool,
    pub editor: bool,
    pub selection: bool,
    pub canvas: bool,
    pub platform: Platform,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            global: true,
            editor: false,
            selection: false,
            canvas: false,
            platform: Platform::runtime(),
        }
    }
}

impl EvalContext {
    fn allows(&self, ctx: Context) -> bool {
        match ctx {
            Context::Global => self.global,
            Context::Editor => self.editor,
            Context::Selection => self.selection,
            Context::Canvas => self.canvas,
        }
    }
}

/// One persisted binding of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// e.g. "Ctrl+Shift+Z", "Alt+B", "Left", "F1".
    pub chord: String,
    /// "global", "editor", "selection", "canvas".
    #[serde(default)]
    pub context: String,
    /// "any", "windows", "linux", "macos".
    #[serde(default)]
    pub platform: String,
    /// Whether key auto-repeat re-triggers the action.
    #[serde(default)]
    pub repeat: bool,
}

fn default_true() -> bool {
    true
}

impl KeyBinding {
    pub fn new(chord: &str) -> Self {
        Self {
            enabled: true,
            chord: chord.to_string(),
            context: String::new(),
            platform: String::new(),
            repeat: false,
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = context.to_string();
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }
}

/// A user-facing action with a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Stable internal id, e.g. "clipboard.copy".
    pub id: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub bindings: Vec<KeyBinding>,
}

/// Schema-versioned persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeymapFile {
    pub schema_version: u32,
    pub actions: Vec<Action>,
}

#[derive(Debug, Error)]
pub enum KeymapError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed keybindings store: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported keybindings schema {0}")]
    UnsupportedSchema(u32),
}

/// One key press in the host's per-frame snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: KeyToken,
    /// True when produced by auto-repeat rather than an initial press.
    pub repeat: bool,
}

/// Everything the engine needs to evaluate chords for one frame.
#[derive(Debug, Clone, Default)]
pub struct KeySnapshot {
    pub pressed: Vec<KeyPress>,
    pub mods: Mods,
}

impl KeySnapshot {
    pub fn press(key: KeyToken, mods: Mods) -> Self {
        Self { pressed: vec![KeyPress { key, repeat: false }], mods }
    }
}

/// Common clipboard/selection hotkey results, evaluated in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hotkeys {
    pub copy: bool,
    pub cut: bool,
    pub paste: bool,
    pub select_all: bool,
    pub cancel: bool,
    pub delete_selection: bool,
}

#[derive(Debug, Clone)]
struct RuntimeBinding {
    ctx: Context,
    platform: Platform,
    chord: ParsedChord,
    repeat: bool,
}

#[derive(Debug, Clone, Default)]
struct RuntimeAction {
    bindings: SmallVec<[RuntimeBinding; 2]>,
}

/// The binding registry: defaults + tool actions + user overrides, compiled
/// into parsed chords for evaluation.
#[derive(Debug, Default)]
pub struct KeymapEngine {
    defaults: Vec<Action>,
    tool_actions: Vec<Action>,
    actions: Vec<Action>,
    runtime: HashMap<String, RuntimeAction>,
    dirty: bool,
}

impl KeymapEngine {
    pub fn new() -> Self {
        let mut engine = Self::default();
        engine.set_defaults(default_actions());
        engine
    }

    /// Replace the built-in defaults and rebuild.
    pub fn set_defaults(&mut self, defaults: Vec<Action>) {
        self.defaults = defaults;
        self.rebuild_from(None);
    }

    /// Register tool-contributed actions (kept separate so a defaults
    /// refresh does not drop them).
    pub fn set_tool_actions(&mut self, tool_actions: Vec<Action>) {
        self.tool_actions = tool_actions;
        let file_actions = std::mem::take(&mut self.actions);
        self.rebuild_from(Some(file_actions));
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Mutable access for the binding editor UI; marks the engine dirty.
    /// Call [`KeymapEngine::rebuild`] after editing.
    pub fn actions_mut(&mut self) -> &mut Vec<Action> {
        self.dirty = true;
        &mut self.actions
    }

    /// Recompile runtime chords after direct edits through `actions_mut`.
    pub fn rebuild(&mut self) {
        self.rebuild_runtime();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Merge a persisted store onto the defaults: a file action overrides
    /// the default bindings of the same id; unknown ids are kept (they may
    /// belong to tools not currently loaded).
    pub fn load(&mut self, file: KeymapFile) -> Result<(), KeymapError> {
        if file.schema_version > SCHEMA_VERSION {
            return Err(KeymapError::UnsupportedSchema(file.schema_version));
        }
        self.rebuild_from(Some(file.actions));
        self.dirty = false;
        Ok(())
    }

    pub fn load_from_bytes(&mut self, bytes: &[u8]) -> Result<(), KeymapError> {
        let file: KeymapFile = serde_json::from_slice(bytes)?;
        self.load(file)
    }

    pub fn to_file(&self) -> KeymapFile {
        KeymapFile { schema_version: SCHEMA_VERSION, actions: self.actions.clone() }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, KeymapError> {
        Ok(serde_json::to_vec_pretty(&self.to_file())?)
    }

    fn rebuild_from(&mut self, file_actions: Option<Vec<Action>>) {
        let mut merged: Vec<Action> = self.defaults.clone();
        merged.extend(self.tool_actions.iter().cloned());

        if let Some(file_actions) = file_actions {
            let index: HashMap<String, usize> =
                merged.iter().enumerate().map(|(i, a)| (a.id.clone(), i)).collect();
            for fa in file_actions {
                match index.get(fa.id.as_str()) {
                    Some(&i) => merged[i].bindings = fa.bindings,
                    None => merged.push(fa),
                }
            }
        }

        self.actions = merged;
        self.rebuild_runtime();
    }

    fn rebuild_runtime(&mut self) {
        self.runtime.clear();
        for action in &self.actions {
            let mut ra = RuntimeAction::default();
            for b in &action.bindings {
                if !b.enabled {
                    continue;
                }
                match parse_chord(&b.chord) {
                    Ok(chord) => ra.bindings.push(RuntimeBinding {
                        ctx: Context::parse(&b.context),
                        platform: Platform::parse(&b.platform),
                        chord,
                        repeat: b.repeat,
                    }),
                    Err(err) => {
                        warn!(
                            target: "keymap",
                            action = %action.id,
                            chord = %b.chord,
                            %err,
                            "chord_parse_failed"
                        );
                    }
                }
            }
            self.runtime.insert(action.id.clone(), ra);
        }
        debug!(target: "keymap", actions = self.runtime.len(), "runtime_rebuilt");
    }

    /// Whether the action's chord was pressed this frame. Only key state and
    /// chord matching; focus/popup gating is the caller's business.
    pub fn action_pressed(&self, action_id: &str, ctx: &EvalContext, keys: &KeySnapshot) -> bool {
        let Some(ra) = self.runtime.get(action_id) else {
            return false;
        };
        ra.bindings.iter().any(|b| {
            b.platform.matches(ctx.platform)
                && ctx.allows(b.ctx)
                && keys
                    .pressed
                    .iter()
                    .any(|p| (!p.repeat || b.repeat) && b.chord.matches(p.key, keys.mods))
        })
    }

    /// Evaluate the common editing hotkeys in one pass.
    pub fn eval_common_hotkeys(&self, ctx: &EvalContext, keys: &KeySnapshot) -> Hotkeys {
        Hotkeys {
            copy: self.action_pressed("clipboard.copy", ctx, keys),
            cut: self.action_pressed("clipboard.cut", ctx, keys),
            paste: self.action_pressed("clipboard.paste", ctx, keys),
            select_all: self.action_pressed("selection.select_all", ctx, keys),
            cancel: self.action_pressed("selection.clear_or_cancel", ctx, keys),
            delete_selection: self.action_pressed("selection.delete", ctx, keys),
        }
    }
}
