//! Tool parameter system: `settings.params` declarations, host-owned values.
//!
//! Values are a tagged variant matched exhaustively at every read/write
//! site. Button parameters are edge-triggered: the host arms them with
//! [`crate::ScriptEngine::fire_param_button`] and they read true for
//! exactly one frame.

use mlua::{Lua, Table, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Button,
    Int,
    Float,
    Enum,
}

/// A host-held parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    /// True for exactly one frame after the host fires it.
    Button(bool),
    Int(i64),
    Float(f64),
    Enum(String),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::Button(_) => ParamType::Button,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Enum(_) => ParamType::Enum,
        }
    }
}

/// A declared parameter, as read from `settings.params.<key>`.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub key: String,
    pub label: String,
    pub ty: ParamType,
    pub order: Option<i64>,
    pub same_line: bool,
    pub int_min: Option<i64>,
    pub int_max: Option<i64>,
    pub int_step: i64,
    pub float_min: Option<f64>,
    pub float_max: Option<f64>,
    pub float_step: Option<f64>,
    pub enum_items: Vec<String>,
}

impl ParamSpec {
    fn new(key: &str, ty: ParamType) -> Self {
        Self {
            key: key.to_string(),
            label: String::new(),
            ty,
            order: None,
            same_line: false,
            int_min: None,
            int_max: None,
            int_step: 1,
            float_min: None,
            float_max: None,
            float_step: None,
            enum_items: Vec::new(),
        }
    }
}

fn opt_string(table: &Table, key: &str) -> Option<String> {
    match table.get::<Value>(key) {
        Ok(Value::String(s)) => Some(s.to_string_lossy().to_string()),
        _ => None,
    }
}

fn opt_number(table: &Table, key: &str) -> Option<f64> {
    match table.get::<Value>(key) {
        Ok(Value::Integer(i)) => Some(i as f64),
        Ok(Value::Number(n)) => Some(n),
        _ => None,
    }
}

fn opt_bool(table: &Table, key: &str) -> Option<bool> {
    match table.get::<Value>(key) {
        Ok(Value::Boolean(b)) => Some(b),
        _ => None,
    }
}

/// Read `settings.params` into specs and default values. A missing
/// `settings` or `params` table is fine; a malformed declaration is a
/// compile error with the offending key in the message.
pub(crate) fn read_params(
    lua: &Lua,
) -> Result<(Vec<ParamSpec>, HashMap<String, ParamValue>), String> {
    let mut specs = Vec::new();
    let mut defaults = HashMap::new();

    let Ok(Value::Table(settings)) = lua.globals().get::<Value>("settings") else {
        return Ok((specs, defaults));
    };
    let Ok(Value::Table(params)) = settings.get::<Value>("params") else {
        return Ok((specs, defaults));
    };

    for pair in params.pairs::<Value, Value>() {
        let (k, v) = pair.map_err(|e| e.to_string())?;
        let (Value::String(key), Value::Table(decl)) = (k, v) else {
            continue;
        };
        let key = key.to_string_lossy().to_string();
        if key.is_empty() {
            continue;
        }

        let Some(type_s) = opt_string(&decl, "type") else {
            return Err(format!("settings.params.{key}: missing string field 'type'"));
        };

        let mut spec;
        let default;
        match type_s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => {
                spec = ParamSpec::new(&key, ParamType::Bool);
                default = ParamValue::Bool(opt_bool(&decl, "default").unwrap_or(false));
            }
            "button" => {
                // Default is always false; the host arms it per click.
                spec = ParamSpec::new(&key, ParamType::Button);
                default = ParamValue::Button(false);
            }
            "int" | "integer" => {
                spec = ParamSpec::new(&key, ParamType::Int);
                spec.int_min = opt_number(&decl, "min").map(|n| n.round() as i64);
                spec.int_max = opt_number(&decl, "max").map(|n| n.round() as i64);
                spec.int_step = opt_number(&decl, "step").map(|n| (n.round() as i64).max(1)).unwrap_or(1);
                default = ParamValue::Int(
                    opt_number(&decl, "default").map(|n| n.round() as i64).unwrap_or(0),
                );
            }
            "float" | "number" => {
                spec = ParamSpec::new(&key, ParamType::Float);
                spec.float_min = opt_number(&decl, "min");
                spec.float_max = opt_number(&decl, "max");
                spec.float_step = opt_number(&decl, "step");
                default = ParamValue::Float(opt_number(&decl, "default").unwrap_or(0.0));
            }
            "enum" => {
                spec = ParamSpec::new(&key, ParamType::Enum);
                let Ok(Value::Table(items)) = decl.get::<Value>("items") else {
                    return Err(format!("settings.params.{key}: enum requires table field 'items'"));
                };
                for i in 1..=items.raw_len() {
                    if let Ok(Value::String(s)) = items.raw_get::<Value>(i) {
                        let s = s.to_string_lossy().to_string();
                        if !s.is_empty() {
                            spec.enum_items.push(s);
                        }
                    }
                }
                if spec.enum_items.is_empty() {
                    return Err(format!(
                        "settings.params.{key}: enum 'items' must contain at least one string"
                    ));
                }
                let dv = opt_string(&decl, "default")
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| spec.enum_items[0].clone());
                default = ParamValue::Enum(dv);
            }
            other => {
                return Err(format!("settings.params.{key}: unknown type '{other}'"));
            }
        }

        spec.label = opt_string(&decl, "label").unwrap_or_default();
        spec.same_line = opt_bool(&decl, "sameLine").unwrap_or(false);
        spec.order = opt_number(&decl, "order").map(|n| n.round() as i64);

        defaults.insert(key.clone(), default);
        specs.push(spec);
    }

    // Stable order so parameter UIs do not jump around.
    specs.sort_by(|a, b| {
        if a.order.is_some() || b.order.is_some() {
            let ao = a.order.unwrap_or(0);
            let bo = b.order.unwrap_or(0);
            if ao != bo {
                return ao.cmp(&bo);
            }
        }
        a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key))
    });

    Ok((specs, defaults))
}
