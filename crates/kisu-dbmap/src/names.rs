//! Composite property key layout.
//!
//! Every record lives under `$DatabaseMap` + `␞` + map id + `␞` + record key.
//! The marker is U+241E (SYMBOL FOR RECORD SEPARATOR), which does not occur in
//! ordinary identifiers:
//! - Record keys must be non-empty and must not contain the marker
//! - Map ids must be non-empty and must not contain the marker
//!
//! Because the record key is everything after the last marker, a map id that
//! contained the marker would still parse, but would be split in the wrong
//! place; rejecting it up front keeps the layout unambiguous.

use kisu_host::PropertyStore;

use crate::error::{MapError, MapResult};

/// Leading segment of every map property key.
pub const MAP_PREFIX: &str = "$DatabaseMap";

/// Separator between the prefix, the map id and the record key.
pub const MAP_MARKER: char = '\u{241E}';

/// The property key prefix shared by every record of map `id`.
///
/// # Examples
///
/// ```
/// use kisu_dbmap::names::map_prefix;
///
/// assert_eq!(map_prefix("market:1"), "$DatabaseMap\u{241E}market:1\u{241E}");
/// ```
pub fn map_prefix(id: &str) -> String {
    format!("{MAP_PREFIX}{MAP_MARKER}{id}{MAP_MARKER}")
}

/// The property key of record `key` in map `id`.
pub fn composite_key(id: &str, key: &str) -> String {
    format!("{}{key}", map_prefix(id))
}

/// Split a property key into `(map id, record key)`.
///
/// Returns `None` for keys that do not belong to any map.
pub fn split_composite(property_id: &str) -> Option<(&str, &str)> {
    let rest = property_id
        .strip_prefix(MAP_PREFIX)?
        .strip_prefix(MAP_MARKER)?;
    let (id, key) = rest.rsplit_once(MAP_MARKER)?;
    if id.is_empty() || key.is_empty() {
        return None;
    }
    Some((id, key))
}

/// Validate a record key.
pub fn validate_key(key: &str) -> MapResult<()> {
    if key.is_empty() {
        return Err(MapError::InvalidKey {
            key: key.to_string(),
            reason: "record key must not be empty".into(),
        });
    }
    if key.contains(MAP_MARKER) {
        return Err(MapError::InvalidKey {
            key: key.to_string(),
            reason: "must not contain the record separator".into(),
        });
    }
    Ok(())
}

/// Validate a map id.
pub fn validate_id(id: &str) -> MapResult<()> {
    if id.is_empty() {
        return Err(MapError::InvalidId {
            id: id.to_string(),
            reason: "map id must not be empty".into(),
        });
    }
    if id.contains(MAP_MARKER) {
        return Err(MapError::InvalidId {
            id: id.to_string(),
            reason: "must not contain the record separator".into(),
        });
    }
    Ok(())
}

/// Ids of every map with at least one record, restricted to ids starting
/// with `id_prefix`. Sorted and deduplicated.
pub fn map_ids(properties: &dyn PropertyStore, id_prefix: &str) -> MapResult<Vec<String>> {
    let mut ids: Vec<String> = properties
        .property_ids()?
        .iter()
        .filter_map(|property_id| split_composite(property_id))
        .filter(|(id, _)| id.starts_with(id_prefix))
        .map(|(id, _)| id.to_string())
        .collect();
    ids.sort();
    ids.dedup();
    Ok(ids)
}
