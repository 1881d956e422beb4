//! Enumeration of front files on disk.

use std::io;
use std::path::Path;

use calvault_store::FileSystem;
use calvault_types::{EntityId, EntityKind};
use tracing::{debug, warn};

use crate::error::VaultResult;

/// Ids of every `<kind>/<id>.json` front file, ascending.
///
/// A missing directory means no entities. Leftover temporary files from
/// interrupted atomic writes are ignored quietly; any other unexpected name
/// is logged and ignored.
pub(crate) fn front_file_ids(fs: &dyn FileSystem, kind: EntityKind) -> VaultResult<Vec<EntityId>> {
    let dir = Path::new(kind.as_str());
    let names = match fs.list_dir(dir) {
        Ok(names) => names,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        if name.starts_with(".tmp") {
            debug!(%kind, entry = %name, "ignoring temporary file");
            continue;
        }
        let id = name
            .strip_suffix(".json")
            .and_then(|stem| stem.parse::<i64>().ok())
            .filter(|raw| *raw > 0);
        match id {
            Some(raw) => ids.push(EntityId::new(raw)),
            None => warn!(%kind, entry = %name, "ignoring stray file"),
        }
    }
    ids.sort();
    Ok(ids)
}
