//! The module graph: an arena of records with identity-keyed deduplication.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::record::{Identity, ModuleId, ModuleRecord};

/// Arena of module records for one loading session.
///
/// Records are addressed by [`ModuleId`]; the dedup table guarantees at most
/// one record per identity, which is what makes cyclic graphs safe to build.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    records: Vec<ModuleRecord>,
    ids: FxHashMap<Identity, ModuleId>,
    hits: usize,
}

impl ModuleGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the record for an identity. The boolean is true
    /// when the record was newly created.
    pub(crate) fn intern(&mut self, identity: Identity) -> (ModuleId, bool) {
        if let Some(&id) = self.ids.get(&identity) {
            self.hits += 1;
            return (id, false);
        }
        let id = ModuleId(self.records.len() as u32);
        self.records.push(ModuleRecord::new(id, identity.clone()));
        self.ids.insert(identity, id);
        (id, true)
    }

    /// The record id for an identity, if loaded.
    pub fn lookup(&self, identity: &Identity) -> Option<ModuleId> {
        self.ids.get(identity).copied()
    }

    /// The record for an id minted by this graph.
    pub fn record(&self, id: ModuleId) -> &ModuleRecord {
        &self.records[id.index()]
    }

    pub(crate) fn record_mut(&mut self, id: ModuleId) -> &mut ModuleRecord {
        &mut self.records[id.index()]
    }

    /// Number of records in the graph.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the graph holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Dedup-table statistics for this session.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            records: self.records.len(),
            hits: self.hits,
            misses: self.records.len(),
        }
    }

    /// Records reachable from `root`, dependencies before dependents.
    /// Cycle-safe: each record appears exactly once.
    pub(crate) fn post_order(&self, root: ModuleId) -> Vec<ModuleId> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::new();
        self.visit_post_order(root, &mut visited, &mut order);
        order
    }

    fn visit_post_order(
        &self,
        id: ModuleId,
        visited: &mut FxHashSet<ModuleId>,
        order: &mut Vec<ModuleId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let deps: Vec<ModuleId> = self.record(id).dependencies().map(|(_, d)| d).collect();
        for dep in deps {
            self.visit_post_order(dep, visited, order);
        }
        order.push(id);
    }
}

/// Dedup-table counters, in the spirit of a cache hit/miss report. A hit is
/// an identity reached through a second edge or specifier; a miss created a
/// record.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStats {
    /// Number of records in the arena.
    pub records: usize,
    /// Lookups answered by an existing record.
    pub hits: usize,
    /// Lookups that created a record.
    pub misses: usize,
}

impl GraphStats {
    /// Fraction of lookups answered by an existing record.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
