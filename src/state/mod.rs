//! Device state cache
//!
//! Holds the last value observed for every parameter. The listener task is
//! the only writer; any number of readers take a short read lock and never
//! wait on socket I/O.

pub mod decoder;
pub mod lists;
pub mod volume;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Named device parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    Model,
    Power,
    /// Volume in dB
    Volume,
    /// Volume on a 0.0..=1.0 scale derived from the dB value
    VolumeLevel,
    MaxVolume,
    Mute,
    SourceList,
    Source,
    StreamType,
    VoicingList,
    Voicing,
    FocusPositionList,
    FocusPosition,
    AudioModeList,
    AudioMode,
    AudioInput,
    AudioType,
    VideoInput,
    VideoType,
    VideoOutput,
    Lipsync,
    LipsyncRange,
    DtsDialogAvailable,
    DtsDialog,
    Loudness,
    BassTrim,
    TrebleTrim,
    CenterTrim,
    HeightsTrim,
    LfeTrim,
    SurroundsTrim,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One entry of an indexed list (sources, voicings, focus positions, audio modes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub index: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Bool(bool),
    Number(f64),
    Integer(i64),
    Text(String),
    Range { min: i64, max: i64 },
    List(Vec<ListEntry>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ListEntry]> {
        match self {
            Value::List(entries) => Some(entries),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => f.write_str(s),
            Value::Range { min, max } => write!(f, "{}..{}", min, max),
            Value::List(entries) => {
                let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
                write!(f, "[{}]", names.join(", "))
            }
        }
    }
}

/// Thread-safe last-known-value store
#[derive(Debug, Clone, Default)]
pub struct StateCache {
    values: Arc<RwLock<HashMap<Param, Value>>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, param: Param) -> Option<Value> {
        self.values.read().ok()?.get(&param).cloned()
    }

    /// Store a value. Returns `true` if it differs from what was cached.
    pub fn set(&self, param: Param, value: Value) -> bool {
        match self.values.write() {
            Ok(mut values) => values.insert(param, value.clone()).as_ref() != Some(&value),
            Err(_) => false,
        }
    }

    /// Forget a value. Returns `true` if one was cached.
    pub fn remove(&self, param: Param) -> bool {
        match self.values.write() {
            Ok(mut values) => values.remove(&param).is_some(),
            Err(_) => false,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut values) = self.values.write() {
            values.clear();
        }
    }

    pub fn snapshot(&self) -> HashMap<Param, Value> {
        self.values
            .read()
            .map(|values| values.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|values| values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_changes() {
        let cache = StateCache::new();
        assert!(cache.set(Param::Volume, Value::Number(-40.5)));
        assert!(!cache.set(Param::Volume, Value::Number(-40.5)));
        assert!(cache.set(Param::Volume, Value::Number(-40.0)));
        assert_eq!(cache.get(Param::Volume), Some(Value::Number(-40.0)));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = StateCache::new();
        cache.set(Param::Mute, Value::Bool(true));
        cache.set(Param::Source, Value::Text("TV".to_string()));
        assert!(cache.remove(Param::Mute));
        assert!(!cache.remove(Param::Mute));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(Param::Source), None);
    }

    #[test]
    fn test_clones_share_storage() {
        let cache = StateCache::new();
        let reader = cache.clone();
        cache.set(Param::Power, Value::Bool(true));
        assert_eq!(reader.get(Param::Power), Some(Value::Bool(true)));
        assert_eq!(reader.snapshot().len(), 1);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Integer(120).as_f64(), Some(120.0));
        assert_eq!(Value::Number(1.5).as_i64(), None);
        assert_eq!(Value::Text("Music".to_string()).as_str(), Some("Music"));
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
    }

    #[test]
    fn test_value_display() {
        let list = Value::List(vec![
            ListEntry {
                index: 1,
                name: "TV".to_string(),
            },
            ListEntry {
                index: 2,
                name: "Roon".to_string(),
            },
        ]);
        assert_eq!(list.to_string(), "[TV, Roon]");
        assert_eq!(Value::Range { min: 0, max: 500 }.to_string(), "0..500");
    }
}
