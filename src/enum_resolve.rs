use anyhow::Result;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::WarningKind;
use crate::stream::AinbReader;

/// Enum database: `{classname -> {value_name -> integer}}`.
///
/// Loaded from a JSON file of the same shape (see the per-game databases
/// shipped with the original tooling).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnumDb(pub BTreeMap<String, BTreeMap<String, i32>>);

impl EnumDb {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn lookup(&self, classname: &str, value_name: &str) -> Option<i32> {
        self.0.get(classname)?.get(value_name).copied()
    }

    pub fn from_json_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Enum resolve table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    /// Offset of the 4 bytes to patch.
    pub patch_offset: u32,
    pub classname: String,
    pub value_name: String,
}

impl EnumEntry {
    pub(crate) fn read(reader: &mut AinbReader) -> Result<Self> {
        Ok(Self {
            patch_offset: reader.read_u32()?,
            classname: reader.read_string_offset()?,
            value_name: reader.read_string_offset()?,
        })
    }
}

/// Applies the patch list to the reader's buffer. Patches are total
/// 4-byte writes, so the application is idempotent. Unknown entries and
/// out-of-bounds offsets are skipped with a warning.
pub(crate) fn apply_patches(
    reader: &mut AinbReader,
    entries: &[EnumEntry],
    db: &EnumDb,
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    if db.is_empty() {
        reader.warn(
            WarningKind::EmptyEnumDb,
            "Enum database is empty, did you forget to register a database \
             beforehand?"
                .to_owned(),
        );
    }
    for entry in entries {
        let end = entry.patch_offset as usize + 4;
        if end > reader.len() {
            reader.warn(
                WarningKind::OutOfBoundsEnumPatch,
                format!(
                    "Out-of-bounds enum patch with offset {:#x} (buffer \
                     size: {:#x})",
                    entry.patch_offset,
                    reader.len()
                ),
            );
            continue;
        }
        let Some(value) = db.lookup(&entry.classname, &entry.value_name)
        else {
            reader.warn(
                WarningKind::UnknownEnumEntry,
                format!(
                    "Could not find matching enum entry in database: {}::{}",
                    entry.classname, entry.value_name
                ),
            );
            continue;
        };
        reader.patch_s32(entry.patch_offset as usize, value)?;
    }
    Ok(())
}

static ENUM_DB: OnceLock<EnumDb> = OnceLock::new();

/// Installs the process-wide enum database. Intended to be called once at
/// program start, before any file with enum resolutions is decoded; later
/// calls are ignored.
pub fn set_enum_db(db: EnumDb) {
    let _ = ENUM_DB.set(db);
}

/// The process-wide enum database installed by [`set_enum_db`], if any.
pub fn global_enum_db() -> Option<&'static EnumDb> {
    ENUM_DB.get()
}
