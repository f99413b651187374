//! On-disk layout of a single store.
//!
//! Everything lives under `<root>/<store-name>/`:
//!
//! ```text
//! <root>/<store-name>/
//!   .ledger                       highest assigned position, decimal text
//!   .store.lock                   cross-process exclusive lock file
//!   events/0000000001.json        one event per position, zero-padded
//!   indices/event_type/<T>.json   { "positions": [...] }
//!   indices/tags/<k>_<v>.json     { "positions": [...] }, lowercased
//!   projections/...               projection states, owned by the
//!                                 projections crate
//! ```
//!
//! Directory names are pinned lowercase; the layout never varies by
//! platform.

use std::path::{Path, PathBuf};

/// Width of zero-padded event filenames. Fixed for the lifetime of a store.
pub const POSITION_PAD_WIDTH: usize = 10;

/// Resolved filesystem locations for one store instance.
#[derive(Clone, Debug)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    /// Resolve the layout for `store_name` under `root_path`.
    #[must_use]
    pub fn new(root_path: &Path, store_name: &str) -> Self {
        Self {
            root: root_path.join(store_name),
        }
    }

    /// The store's own directory (`<root>/<store-name>`).
    #[must_use]
    pub fn store_dir(&self) -> &Path {
        &self.root
    }

    /// The ledger file.
    #[must_use]
    pub fn ledger(&self) -> PathBuf {
        self.root.join(".ledger")
    }

    /// The cross-process lock file.
    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".store.lock")
    }

    /// Directory of per-position event payload files.
    #[must_use]
    pub fn events_dir(&self) -> PathBuf {
        self.root.join("events")
    }

    /// Payload file for one position, e.g. `events/0000000042.json`.
    #[must_use]
    pub fn event_file(&self, position: u64) -> PathBuf {
        self.events_dir()
            .join(format!("{position:0width$}.json", width = POSITION_PAD_WIDTH))
    }

    /// Directory of event-type index files.
    #[must_use]
    pub fn type_index_dir(&self) -> PathBuf {
        self.root.join("indices").join("event_type")
    }

    /// Directory of tag index files.
    #[must_use]
    pub fn tag_index_dir(&self) -> PathBuf {
        self.root.join("indices").join("tags")
    }

    /// Root directory for projection data.
    #[must_use]
    pub fn projections_dir(&self) -> PathBuf {
        self.root.join("projections")
    }

    /// Directory of projection checkpoint files.
    #[must_use]
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.projections_dir().join("_checkpoints")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_files_are_zero_padded_to_ten_digits() {
        let paths = StorePaths::new(Path::new("/data"), "main");
        assert_eq!(
            paths.event_file(1),
            PathBuf::from("/data/main/events/0000000001.json")
        );
        assert_eq!(
            paths.event_file(1_234_567_890),
            PathBuf::from("/data/main/events/1234567890.json")
        );
    }

    #[test]
    fn layout_is_rooted_under_store_name() {
        let paths = StorePaths::new(Path::new("/data"), "tenant-a");
        assert_eq!(paths.ledger(), PathBuf::from("/data/tenant-a/.ledger"));
        assert_eq!(
            paths.tag_index_dir(),
            PathBuf::from("/data/tenant-a/indices/tags")
        );
        assert_eq!(
            paths.checkpoints_dir(),
            PathBuf::from("/data/tenant-a/projections/_checkpoints")
        );
    }
}
