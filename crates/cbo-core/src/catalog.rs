//! # Catalog Interface
//!
//! The catalog provides the optimizer with metadata about the database schema:
//! table column definitions, table-level statistics and the storage distribution
//! of each table. The cost model needs row counts, column NDVs and size estimates
//! to compare alternative plans; the property planner needs to know how a table's
//! rows are already spread across nodes to avoid redundant exchanges.
//!
//! ## Key Lookups
//!
//! Tables are identified by `TableRef` (schema + name). The catalog returns:
//! - `get_table_stats`: Row count, total size, and per-column statistics. `None` if
//!   the table is unknown; the optimizer then falls back to default estimates.
//! - `get_table_columns`: Column definitions. `None` if the table is unknown.
//! - `get_table_distribution`: How the table is stored. `None` means the rows are
//!   spread with no locality guarantee (round-robin).
//!
//! ## Shared Statistics
//!
//! [`SharedStatisticsCache`] holds a snapshot of statistics that many concurrent
//! optimization sessions read. A refresh replaces the whole snapshot; readers keep
//! using the snapshot they already hold.

use crate::expr::{ColumnRef, TableRef};
use crate::properties::DistributionSpec;
use crate::stats::Statistics;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Catalog provides schema and statistics information.
pub trait Catalog: Send + Sync {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics>;
    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<ColumnRef>>;

    fn get_table_distribution(&self, _table: &TableRef) -> Option<DistributionSpec> {
        None
    }
}

/// In-memory catalog for testing and development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    pub table_stats: HashMap<TableRef, Statistics>,
    pub table_columns: HashMap<TableRef, Vec<ColumnRef>>,
    pub table_distributions: HashMap<TableRef, DistributionSpec>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &TableRef, columns: Vec<ColumnRef>, stats: Statistics) {
        self.table_columns.insert(table.clone(), columns);
        self.table_stats.insert(table.clone(), stats);
    }

    /// Register a table whose statistics are unknown.
    pub fn add_table_without_stats(&mut self, table: &TableRef, columns: Vec<ColumnRef>) {
        self.table_columns.insert(table.clone(), columns);
    }

    pub fn set_distribution(&mut self, table: &TableRef, distribution: DistributionSpec) {
        self.table_distributions.insert(table.clone(), distribution);
    }
}

impl Catalog for InMemoryCatalog {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics> {
        self.table_stats.get(table).cloned()
    }

    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<ColumnRef>> {
        self.table_columns.get(table).cloned()
    }

    fn get_table_distribution(&self, table: &TableRef) -> Option<DistributionSpec> {
        self.table_distributions.get(table).cloned()
    }
}

type StatsSnapshot = Arc<HashMap<TableRef, Statistics>>;

/// Read-mostly statistics shared across optimization sessions.
///
/// Lookups clone the current snapshot `Arc` under a read lock and release it
/// immediately, so a session never waits on a refresh for longer than the
/// pointer swap. Stale reads are acceptable.
pub struct SharedStatisticsCache {
    snapshot: RwLock<StatsSnapshot>,
    columns: HashMap<TableRef, Vec<ColumnRef>>,
    distributions: HashMap<TableRef, DistributionSpec>,
}

impl SharedStatisticsCache {
    /// Build a cache from a catalog's schema information and an initial set of
    /// statistics.
    pub fn new(
        columns: HashMap<TableRef, Vec<ColumnRef>>,
        distributions: HashMap<TableRef, DistributionSpec>,
        stats: HashMap<TableRef, Statistics>,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(stats)),
            columns,
            distributions,
        }
    }

    pub fn from_catalog(catalog: &InMemoryCatalog) -> Self {
        Self::new(
            catalog.table_columns.clone(),
            catalog.table_distributions.clone(),
            catalog.table_stats.clone(),
        )
    }

    /// The statistics snapshot currently published.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot.read().clone()
    }

    /// Replace the published statistics. Sessions that already took a snapshot
    /// keep reading the old one.
    pub fn refresh(&self, stats: HashMap<TableRef, Statistics>) {
        let next = Arc::new(stats);
        *self.snapshot.write() = next;
        tracing::debug!("statistics cache refreshed");
    }
}

impl Catalog for SharedStatisticsCache {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics> {
        self.snapshot().get(table).cloned()
    }

    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<ColumnRef>> {
        self.columns.get(table).cloned()
    }

    fn get_table_distribution(&self, table: &TableRef) -> Option<DistributionSpec> {
        self.distributions.get(table).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DataType;

    #[test]
    fn test_in_memory_lookup() {
        let t = TableRef::new("tpch", "nation");
        let mut catalog = InMemoryCatalog::new();
        catalog.add_table(
            &t,
            vec![ColumnRef::new(Some("nation"), "n_nationkey", 0, DataType::Int64)],
            Statistics::new(25.0, 2500.0),
        );
        assert_eq!(catalog.get_table_stats(&t).map(|s| s.row_count), Some(25.0));
        assert!(catalog.get_table_distribution(&t).is_none());
        assert!(catalog.get_table_stats(&TableRef::new("tpch", "region")).is_none());
    }

    #[test]
    fn test_shared_cache_refresh_keeps_old_snapshot() {
        let t = TableRef::new("s", "t");
        let mut stats = HashMap::new();
        stats.insert(t.clone(), Statistics::new(10.0, 100.0));
        let cache = SharedStatisticsCache::new(HashMap::new(), HashMap::new(), stats);

        let before = cache.snapshot();
        let mut next = HashMap::new();
        next.insert(t.clone(), Statistics::new(20.0, 200.0));
        cache.refresh(next);

        assert_eq!(before.get(&t).map(|s| s.row_count), Some(10.0));
        assert_eq!(cache.get_table_stats(&t).map(|s| s.row_count), Some(20.0));
    }

    #[test]
    fn test_shared_cache_concurrent_readers() {
        let t = TableRef::new("s", "t");
        let mut stats = HashMap::new();
        stats.insert(t.clone(), Statistics::new(10.0, 100.0));
        let cache = SharedStatisticsCache::new(HashMap::new(), HashMap::new(), stats);

        crossbeam::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|_| {
                    for _ in 0..100 {
                        let rows = cache.get_table_stats(&t).map(|s| s.row_count);
                        assert!(rows == Some(10.0) || rows == Some(30.0));
                    }
                });
            }
            s.spawn(|_| {
                let mut next = HashMap::new();
                next.insert(t.clone(), Statistics::new(30.0, 300.0));
                cache.refresh(next);
            });
        })
        .unwrap();
    }
}
