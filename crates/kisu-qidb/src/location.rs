//! Resolution of the world-wide storage location.
//!
//! The column is chosen once per world, from the first player seen, and kept
//! in dynamic properties so later sessions reuse it without a player.

use tracing::{debug, info};

use kisu_host::{Dimension, PropertyStore};
use kisu_types::{DynamicValue, Vector3};

use crate::error::QidbResult;

pub const LOCATION_X_KEY: &str = "qidb:x";
pub const LOCATION_Z_KEY: &str = "qidb:z";
pub const INITIALISED_KEY: &str = "qidb:initialised";

/// Height carriers are spawned at.
pub const SPAWN_Y: f64 = 318.0;

/// Name of the ticking area that keeps the storage column loaded.
pub const TICKING_AREA_NAME: &str = "storagearea";

fn stored_coordinate(properties: &dyn PropertyStore, key: &str) -> QidbResult<Option<f64>> {
    Ok(properties
        .get_property(key)?
        .as_ref()
        .and_then(DynamicValue::as_f64))
}

/// Resolve the storage location, persisting it on first use.
///
/// Returns `Ok(None)` while neither a stored column nor a player exists.
pub fn resolve_location(
    properties: &dyn PropertyStore,
    dimension: &dyn Dimension,
) -> QidbResult<Option<Vector3>> {
    let mut x = stored_coordinate(properties, LOCATION_X_KEY)?;
    let mut z = stored_coordinate(properties, LOCATION_Z_KEY)?;

    if x.is_none() || z.is_none() {
        let Some(player) = dimension.player_location()? else {
            debug!("no player yet; storage location pending");
            return Ok(None);
        };
        if x.is_none() {
            properties.set_property(LOCATION_X_KEY, Some(player.x.into()))?;
            x = Some(player.x);
        }
        if z.is_none() {
            properties.set_property(LOCATION_Z_KEY, Some(player.z.into()))?;
            z = Some(player.z);
        }
    }

    let (Some(x), Some(z)) = (x, z) else {
        return Ok(None);
    };
    let spawn = Vector3::new(x, SPAWN_Y, z);

    let initialised = properties
        .get_property(INITIALISED_KEY)?
        .as_ref()
        .and_then(DynamicValue::as_bool)
        .unwrap_or(false);
    if !initialised {
        properties.set_property(INITIALISED_KEY, Some(true.into()))?;
        dimension.add_ticking_area(TICKING_AREA_NAME, spawn.above(1.0), spawn)?;
        info!(location = %spawn, "storage ticking area added");
    }

    Ok(Some(spawn))
}
