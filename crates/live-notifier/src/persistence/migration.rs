//! Schema migrations for the durable registry blob.
//!
//! Each step is a pure function from version N to N+1 over raw JSON. Steps
//! keep every fragment they recognize and report the rest as notes; only a
//! blob that is not an object or that comes from a newer build is rejected.
//! After the last step every blob is checked fragment by fragment against the
//! current schema, so one bad entry is dropped on its own instead of failing
//! the typed decode of the whole file.
//!
//! Version 0 (no `version` key):
//!
//! ```json
//! {
//!   "room_info": { "100": {"name": "...", "added_by": "...", "added_time": "...",
//!                          "at_all": true, "gift_notify": false, "min_gift_price": 100} },
//!   "subscriptions": { "100": ["group-a", "group-b"] }
//! }
//! ```
//!
//! Version 1 moves the room flags into each destination's own config and
//! replaces `min_gift_price` with `high_value_only`.

use crate::errors::MigrationError;
use crate::registry::model::{ConfigField, CURRENT_SCHEMA_VERSION};
use common::types::RoomId;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

type Step = fn(Map<String, Value>, &mut Vec<String>) -> Map<String, Value>;

/// Migration steps, indexed by source version.
const STEPS: &[Step] = &[v0_to_v1];

/// Output of a successful migration.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    /// Blob in the current schema.
    pub value: Value,
    /// Version the blob was stored as.
    pub from_version: u64,
    /// Fragments that could not be interpreted and were dropped.
    pub unrecognized: Vec<String>,
}

impl Migrated {
    #[must_use]
    pub fn was_migrated(&self) -> bool {
        self.from_version < CURRENT_SCHEMA_VERSION
    }
}

/// Bring a stored blob up to the current schema version.
///
/// # Errors
///
/// `NotAnObject` if the top level is not a JSON object, `UnsupportedVersion`
/// if the blob was written by a newer schema.
pub fn migrate(value: Value) -> Result<Migrated, MigrationError> {
    let Value::Object(mut root) = value else {
        return Err(MigrationError::NotAnObject);
    };

    let mut unrecognized = Vec::new();
    let from_version = match root.get("version") {
        None => 0,
        Some(v) => match v.as_u64() {
            Some(n) => n,
            None => {
                unrecognized.push(format!("version: expected integer, found {v}"));
                0
            }
        },
    };

    if from_version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::UnsupportedVersion(from_version));
    }

    let mut version = from_version;
    while version < CURRENT_SCHEMA_VERSION {
        let step = usize::try_from(version)
            .ok()
            .and_then(|idx| STEPS.get(idx))
            .ok_or(MigrationError::UnsupportedVersion(version))?;
        root = step(root, &mut unrecognized);
        version += 1;
    }
    let root = validate_current(root, &mut unrecognized);

    Ok(Migrated {
        value: Value::Object(root),
        from_version,
        unrecognized,
    })
}

/// Legacy room-level flags.
#[derive(Debug, Clone, Copy, Default)]
struct LegacyFlags {
    at_all: bool,
    gift_notify: bool,
    high_value_only: bool,
}

impl LegacyFlags {
    fn to_config(self) -> Value {
        json!({
            "at_all": self.at_all,
            "gift_notify": self.gift_notify,
            "high_value_only": self.high_value_only,
        })
    }
}

const ROOM_META_KEYS: [&str; 3] = ["name", "added_by", "added_time"];

fn v0_to_v1(mut root: Map<String, Value>, notes: &mut Vec<String>) -> Map<String, Value> {
    let legacy_rooms = root.remove("room_info");
    let legacy_subs = root.remove("subscriptions");
    root.remove("version");
    for key in root.keys() {
        notes.push(format!("top-level key '{key}'"));
    }

    let mut room_info = Map::new();
    let mut flags_by_room = HashMap::new();

    match legacy_rooms {
        None | Some(Value::Null) => {}
        Some(Value::Object(rooms)) => {
            for (raw_key, info) in rooms {
                let Some(room_key) = room_key(&raw_key) else {
                    notes.push(format!("room_info key '{raw_key}' is not a room id"));
                    continue;
                };
                let Value::Object(info) = info else {
                    notes.push(format!("room_info['{room_key}'] is not an object"));
                    continue;
                };
                let (meta, flags) = split_room_entry(&room_key, info, notes);
                room_info.insert(room_key.clone(), Value::Object(meta));
                flags_by_room.insert(room_key, flags);
            }
        }
        Some(other) => notes.push(format!("room_info is not an object: {other}")),
    }

    let mut subscriptions = Map::new();
    match legacy_subs {
        None | Some(Value::Null) => {}
        Some(Value::Object(subs)) => {
            for (raw_key, dests) in subs {
                let Some(room_key) = room_key(&raw_key) else {
                    notes.push(format!("subscriptions key '{raw_key}' is not a room id"));
                    continue;
                };
                let flags = flags_by_room.get(&room_key).copied().unwrap_or_default();
                let configs = match dests {
                    Value::Array(list) => expand_destinations(&room_key, list, flags, notes),
                    // Already per-destination; checked by `validate_current`.
                    Value::Object(map) => map,
                    other => {
                        notes.push(format!("subscriptions['{room_key}'] unexpected: {other}"));
                        continue;
                    }
                };
                subscriptions.insert(room_key, Value::Object(configs));
            }
        }
        Some(other) => notes.push(format!("subscriptions is not an object: {other}")),
    }

    let mut out = Map::new();
    out.insert("version".to_string(), json!(1));
    out.insert("room_info".to_string(), Value::Object(room_info));
    out.insert("subscriptions".to_string(), Value::Object(subscriptions));
    out
}

/// Canonical form of a stored room key, `None` if it is not a room id.
fn room_key(raw: &str) -> Option<String> {
    raw.parse::<RoomId>().ok().map(|id| id.to_string())
}

/// Keep only the fragments of a current-schema blob that decode cleanly.
fn validate_current(
    mut root: Map<String, Value>,
    notes: &mut Vec<String>,
) -> Map<String, Value> {
    let rooms = root.remove("room_info");
    let subs = root.remove("subscriptions");
    root.remove("version");
    for key in root.keys() {
        notes.push(format!("top-level key '{key}'"));
    }

    let mut room_info = Map::new();
    for (raw_key, info) in objects_by_room("room_info", rooms, notes) {
        match info {
            Value::Object(info) => {
                let meta = room_meta(&raw_key, info, notes);
                insert_room(
                    &mut room_info,
                    "room_info",
                    &raw_key,
                    Value::Object(meta),
                    notes,
                );
            }
            other => notes.push(format!("room_info['{raw_key}'] is not an object: {other}")),
        }
    }

    let mut subscriptions = Map::new();
    for (raw_key, dests) in objects_by_room("subscriptions", subs, notes) {
        let Value::Object(dests) = dests else {
            notes.push(format!("subscriptions['{raw_key}'] is not an object: {dests}"));
            continue;
        };
        let mut configs = Map::new();
        for (dest, config) in dests {
            if dest.trim().is_empty() {
                notes.push(format!("subscriptions['{raw_key}'] has a blank destination"));
                continue;
            }
            match config {
                Value::Object(config) => {
                    let config = subscription_config(&raw_key, &dest, config, notes);
                    configs.insert(dest, Value::Object(config));
                }
                other => notes.push(format!("subscriptions['{raw_key}']['{dest}']: {other}")),
            }
        }
        insert_room(
            &mut subscriptions,
            "subscriptions",
            &raw_key,
            Value::Object(configs),
            notes,
        );
    }

    let mut out = Map::new();
    out.insert("version".to_string(), json!(CURRENT_SCHEMA_VERSION));
    out.insert("room_info".to_string(), Value::Object(room_info));
    out.insert("subscriptions".to_string(), Value::Object(subscriptions));
    out
}

fn objects_by_room(
    section: &str,
    value: Option<Value>,
    notes: &mut Vec<String>,
) -> Map<String, Value> {
    match value {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            notes.push(format!("{section} is not an object: {other}"));
            Map::new()
        }
    }
}

fn insert_room(
    section_map: &mut Map<String, Value>,
    section: &str,
    raw_key: &str,
    value: Value,
    notes: &mut Vec<String>,
) {
    let Some(key) = room_key(raw_key) else {
        notes.push(format!("{section} key '{raw_key}' is not a room id"));
        return;
    };
    if section_map.contains_key(&key) {
        notes.push(format!("{section} key '{raw_key}' duplicates room {key}"));
        return;
    }
    section_map.insert(key, value);
}

fn room_meta(
    raw_key: &str,
    info: Map<String, Value>,
    notes: &mut Vec<String>,
) -> Map<String, Value> {
    let mut meta = Map::new();
    for (key, value) in info {
        if !ROOM_META_KEYS.contains(&key.as_str()) {
            notes.push(format!("room_info['{raw_key}'].{key}"));
            continue;
        }
        match value {
            Value::String(_) => {
                meta.insert(key, value);
            }
            Value::Number(n) => {
                meta.insert(key, Value::String(n.to_string()));
            }
            Value::Null => {}
            other => notes.push(format!("room_info['{raw_key}'].{key}: {other}")),
        }
    }
    meta
}

/// Non-bool flags fall back to their defaults.
fn subscription_config(
    raw_key: &str,
    dest: &str,
    config: Map<String, Value>,
    notes: &mut Vec<String>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in config {
        if key.parse::<ConfigField>().is_err() {
            notes.push(format!("subscriptions['{raw_key}']['{dest}'].{key}"));
            continue;
        }
        match value {
            Value::Bool(_) => {
                out.insert(key, value);
            }
            Value::Null => {}
            other => notes.push(format!(
                "subscriptions['{raw_key}']['{dest}'].{key}: expected bool, found {other}"
            )),
        }
    }
    out
}

fn split_room_entry(
    room_key: &str,
    info: Map<String, Value>,
    notes: &mut Vec<String>,
) -> (Map<String, Value>, LegacyFlags) {
    let mut meta = Map::new();
    let mut flags = LegacyFlags::default();
    let mut min_gift_price: Option<Value> = None;
    let mut explicit_high_value: Option<bool> = None;

    for (key, value) in info {
        match key.as_str() {
            k if ROOM_META_KEYS.contains(&k) => match value {
                Value::String(_) => {
                    meta.insert(key.clone(), value);
                }
                Value::Number(n) => {
                    meta.insert(key.clone(), Value::String(n.to_string()));
                }
                Value::Null => {}
                other => notes.push(format!("room_info['{room_key}'].{key}: {other}")),
            },
            "at_all" => flags.at_all = legacy_bool(room_key, &key, &value, notes),
            "gift_notify" => flags.gift_notify = legacy_bool(room_key, &key, &value, notes),
            "high_value_only" => {
                explicit_high_value = Some(legacy_bool(room_key, &key, &value, notes));
            }
            "min_gift_price" => min_gift_price = Some(value),
            _ => notes.push(format!("room_info['{room_key}'].{key}")),
        }
    }

    flags.high_value_only = match explicit_high_value {
        Some(v) => v,
        None => min_gift_price
            .map(|v| threshold_present(room_key, &v, notes))
            .unwrap_or(false),
    };

    (meta, flags)
}

fn legacy_bool(room_key: &str, key: &str, value: &Value, notes: &mut Vec<String>) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        other => {
            notes.push(format!("room_info['{room_key}'].{key}: expected bool, found {other}"));
            false
        }
    }
}

/// Any finite numeric threshold means the room only wanted valuable gifts.
fn threshold_present(room_key: &str, value: &Value, notes: &mut Vec<String>) -> bool {
    match value {
        Value::Number(n) => n.as_f64().is_some_and(f64::is_finite),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(price) => price.is_finite(),
            Err(_) => {
                notes.push(format!("room_info['{room_key}'].min_gift_price: '{s}'"));
                false
            }
        },
        Value::Null => false,
        other => {
            notes.push(format!("room_info['{room_key}'].min_gift_price: {other}"));
            false
        }
    }
}

fn expand_destinations(
    room_key: &str,
    list: Vec<Value>,
    flags: LegacyFlags,
    notes: &mut Vec<String>,
) -> Map<String, Value> {
    let mut configs = Map::new();
    for dest in list {
        match dest {
            Value::String(id) if !id.trim().is_empty() => {
                configs.insert(id, flags.to_config());
            }
            other => notes.push(format!("subscriptions['{room_key}'] entry {other}")),
        }
    }
    configs
}
