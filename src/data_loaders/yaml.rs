// ~/src/data_loaders/yaml.rs

use std::{fs, io, path::Path};

use serde_yaml::Value;

use crate::warn;

/// Reads and parses a YAML file. Missing or malformed files yield `None`.
pub fn load_yaml(path: &Path) -> Option<Value> {
    let txt = fs::read_to_string(path).ok()?;
    match serde_yaml::from_str::<Value>(&txt) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("[YAML] Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

/// Writes `value` through a sibling temp file so readers never see a
/// half-written document.
pub fn save_yaml(path: &Path, value: &Value) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let txt = serde_yaml::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, txt)?;
    fs::rename(&tmp, path)
}
