//! Argument vector for a window process.
//!
//! ```text
//! --buntralino-port=<host port> --buntralino-name=<name> --url=<url>
//! --window-<kebab-key>=<value> ...    one per window option
//! <raw processArgs>                   only when `processArgs` is set
//! ```

use serde_json::Value;

pub const PROCESS_ARGS_KEY: &str = "processArgs";
pub const USE_SAVED_STATE_KEY: &str = "useSavedState";
pub const NAME_KEY: &str = "name";

/// Ordered window options, keyed by their camelCase names.
///
/// These are the options of `Neutralino.window.create` plus `name`, the
/// logical window name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowOptions {
    entries: Vec<(String, Value)>,
}

impl WindowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.with(NAME_KEY, Value::String(name.into()))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set an option, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// The caller-chosen logical name, if any.
    pub fn logical_name(&self) -> Option<&str> {
        self.get(NAME_KEY).and_then(Value::as_str)
    }

    /// Layer these options over `defaults`; keys set here win.
    pub fn over(self, defaults: WindowOptions) -> WindowOptions {
        let mut merged = defaults;
        for (key, value) in self.entries {
            merged.set(key, value);
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<serde_json::Map<String, Value>> for WindowOptions {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self {
            entries: map.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, Value)> for WindowOptions {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut options = Self::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}

/// The three arguments a window needs to find its way back to the host.
pub fn control_args(host_port: u16, name: &str, url: &str) -> Vec<String> {
    vec![
        format!("--buntralino-port={host_port}"),
        format!("--buntralino-name={name}"),
        format!("--url={url}"),
    ]
}

/// `useSavedState` → `use-saved-state`. A dash goes between a lowercase
/// ASCII letter and the uppercase letter after it; everything is lowercased.
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if prev_lower && c.is_ascii_uppercase() {
            out.push('-');
        }
        prev_lower = c.is_ascii_lowercase();
        out.extend(c.to_lowercase());
    }
    out
}

/// Strings are trimmed and quoted when they still contain a space. Other
/// values keep their JSON text.
pub fn normalize_argument(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.contains(' ') {
                format!("\"{trimmed}\"")
            } else {
                trimmed.to_string()
            }
        }
        other => other.to_string(),
    }
}

/// One `--window-<key>=<value>` flag per option, in order. `processArgs` also
/// contributes its raw value as an extra argument ahead of its own flag.
pub fn window_option_args(options: &WindowOptions) -> Vec<String> {
    let mut args = Vec::new();
    for (key, value) in options.iter() {
        if key == PROCESS_ARGS_KEY {
            args.push(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        args.push(format!(
            "--window-{}={}",
            kebab_case(key),
            normalize_argument(value)
        ));
    }
    args
}
