use serde::Serialize;
use serde::de::DeserializeOwned;
use shadowgit_core::error::StateError;
use std::io::Write;
use std::path::Path;

/// Write `data` to `path` through a sibling temp file and a rename, so readers
/// never observe a half-written record.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StateError> {
    let parent = path
        .parent()
        .ok_or_else(|| StateError::corrupt(path, "record path has no parent directory"))?;
    std::fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StateError::io(parent, e))?;
    tmp.write_all(data).map_err(|e| StateError::io(path, e))?;
    tmp.flush().map_err(|e| StateError::io(path, e))?;
    tmp.persist(path).map_err(|e| StateError::io(path, e.error))?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let mut data = serde_json::to_vec_pretty(value).map_err(StateError::serialize)?;
    data.push(b'\n');
    write_atomic(path, &data)
}

/// Read a JSON record. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StateError::io(path, e)),
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StateError::corrupt(path, e))
}
