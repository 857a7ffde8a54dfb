use crate::persist;
use shadowgit_core::constants;
use shadowgit_core::error::StateError;
use shadowgit_core::types::Session;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// Each hook call is a fresh process, so the in-flight session and its change
// buffer live here between calls.

pub fn store_path(mirror_root: &Path) -> PathBuf {
    mirror_root.join(constants::ACTIVE_SESSIONS_FILE)
}

pub fn load_all(mirror_root: &Path) -> Result<BTreeMap<String, Session>, StateError> {
    Ok(persist::read_json(&store_path(mirror_root))?.unwrap_or_default())
}

pub fn get(mirror_root: &Path, session_id: &str) -> Result<Option<Session>, StateError> {
    Ok(load_all(mirror_root)?.remove(session_id))
}

pub fn save(mirror_root: &Path, session: &Session) -> Result<(), StateError> {
    let mut all = load_all(mirror_root)?;
    all.insert(session.id.clone(), session.clone());
    persist::write_json(&store_path(mirror_root), &all)
}

pub fn remove(mirror_root: &Path, session_id: &str) -> Result<Option<Session>, StateError> {
    let mut all = load_all(mirror_root)?;
    let removed = all.remove(session_id);
    if removed.is_some() {
        persist::write_json(&store_path(mirror_root), &all)?;
    }
    Ok(removed)
}

/// Remove and return every stored session matching `stale`.
pub fn remove_where(
    mirror_root: &Path,
    stale: impl Fn(&Session) -> bool,
) -> Result<Vec<Session>, StateError> {
    let (dropped, kept): (BTreeMap<_, _>, BTreeMap<_, _>) =
        load_all(mirror_root)?.into_iter().partition(|(_, session)| stale(session));
    if !dropped.is_empty() {
        persist::write_json(&store_path(mirror_root), &kept)?;
    }
    Ok(dropped.into_values().collect())
}

/// Ids of sessions other than `except` that are still accumulating.
pub fn other_active_ids(mirror_root: &Path, except: &str) -> Result<Vec<String>, StateError> {
    Ok(load_all(mirror_root)?
        .into_iter()
        .filter(|(id, session)| id != except && session.is_active())
        .map(|(id, _)| id)
        .collect())
}

/// The most recently started session, used when a caller names none.
pub fn most_recent(mirror_root: &Path) -> Result<Option<Session>, StateError> {
    Ok(load_all(mirror_root)?
        .into_values()
        .filter(Session::is_active)
        .max_by(|a, b| a.started_at.cmp(&b.started_at)))
}
