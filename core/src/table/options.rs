use std::fmt;
use std::sync::Arc;

use crate::constants::DEFAULT_INDEX_INTERVAL;

use super::comparator::{Comparator, default_comparator};

/// Configuration for building a table.
#[derive(Clone)]
pub struct TableOptions {
    /// Every `index_interval`th entry is sampled into the sparse index.
    /// Lookups scan at most this many records after the index probe.
    pub index_interval: u32,
    /// Ordering that added keys must follow. Persisted in the file.
    pub comparator: Arc<dyn Comparator>,
    /// fsync the finished file before it is renamed into place.
    pub sync_on_finish: bool,
}

impl TableOptions {
    pub fn with_comparator(comparator: Arc<dyn Comparator>) -> Self {
        Self {
            comparator,
            ..Self::default()
        }
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            index_interval: DEFAULT_INDEX_INTERVAL,
            comparator: default_comparator(),
            sync_on_finish: true,
        }
    }
}

impl fmt::Debug for TableOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableOptions")
            .field("index_interval", &self.index_interval)
            .field("comparator", &self.comparator.config())
            .field("sync_on_finish", &self.sync_on_finish)
            .finish()
    }
}
