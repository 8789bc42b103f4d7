// Device name store: a YAML mapping of serial number to friendly name.
//
// The file is hand-edited, so writes never re-serialize what is already
// there. Serials seen for the first time are appended to the original text
// with a "[New]" placeholder for the user to fill in.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lwlink::JsonEvent;
use tempfile::NamedTempFile;

/// Name given to devices not yet in the file.
pub const PLACEHOLDER: &str = "[New]";

pub struct DeviceNames {
    path: PathBuf,
    /// File contents as loaded or last written.
    text: String,
    /// Serials present in `text`.
    on_disk: BTreeSet<String>,
    names: BTreeMap<String, String>,
    latest: HashMap<String, JsonEvent>,
}

impl DeviceNames {
    /// Load `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Device name file does not exist");
                String::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };

        let names = parse(&text).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), devices = names.len(), "Loaded device names");

        Ok(Self {
            path,
            text,
            on_disk: names.keys().cloned().collect(),
            names,
            latest: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `event` and return the name of the device that sent it.
    ///
    /// Events without a serial number return an empty name. Unknown serials
    /// are registered with [`PLACEHOLDER`].
    pub fn seen(&mut self, event: &JsonEvent) -> String {
        if event.serial.is_empty() {
            return String::new();
        }
        let name = self
            .names
            .entry(event.serial.clone())
            .or_insert_with(|| {
                tracing::info!(serial = %event.serial, "New device");
                PLACEHOLDER.to_string()
            })
            .clone();
        self.latest.insert(event.serial.clone(), event.clone());
        name
    }

    /// Name for `serial`, if known.
    pub fn name(&self, serial: &str) -> Option<&str> {
        self.names.get(serial).map(String::as_str)
    }

    /// Most recent event from `serial`.
    pub fn latest(&self, serial: &str) -> Option<&JsonEvent> {
        self.latest.get(serial)
    }

    /// Entries not yet in the file.
    pub fn unsaved(&self) -> BTreeMap<&str, &str> {
        self.names
            .iter()
            .filter(|(serial, _)| !self.on_disk.contains(*serial))
            .map(|(serial, name)| (serial.as_str(), name.as_str()))
            .collect()
    }

    /// Append unsaved entries to the file, replacing it atomically.
    ///
    /// Returns whether anything was written.
    pub fn write(&mut self) -> Result<bool> {
        let unsaved = self.unsaved();
        if unsaved.is_empty() {
            tracing::debug!(path = %self.path.display(), "No new devices, not writing");
            return Ok(false);
        }

        let mut text = self.text.clone();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&serde_yaml::to_string(&unsaved).context("encoding device names")?);

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temporary file in {}", dir.display()))?;
        tmp.write_all(text.as_bytes())
            .context("writing temporary device name file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;

        let added: Vec<String> = unsaved.keys().map(|s| s.to_string()).collect();
        tracing::info!(path = %self.path.display(), added = added.len(), "Wrote device names");
        self.on_disk.extend(added);
        self.text = text;
        Ok(true)
    }
}

fn parse(text: &str) -> Result<BTreeMap<String, String>> {
    let has_content = text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line != "---"
    });
    if !has_content {
        return Ok(BTreeMap::new());
    }
    Ok(serde_yaml::from_str(text)?)
}
