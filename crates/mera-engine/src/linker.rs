//! Cycle-aware linking: binding instantiation, export resolution, namespace
//! construction.
//!
//! Linking walks the already-built graph and resolves every import to a
//! concrete binding slot, possibly in another record. Star-export closures
//! are computed with a three-color traversal so that `export *` cycles
//! terminate, and indirect-export chains carry a resolve set so that a chain
//! revisiting a record is reported instead of looping.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::binding::{Binding, Mutability};
use crate::decl::ImportBinding;
use crate::graph::ModuleGraph;
use crate::loader::LoaderOptions;
use crate::namespace::Namespace;
use crate::record::{ExportResolution, Identity, ModuleError, ModuleId, ModuleState};
use crate::value::Value;

/// Structural linking failure, reported once per offending record.
#[derive(Debug, Error, Clone)]
pub enum LinkError {
    /// The name is reachable through two or more distinct star-export
    /// sources with no local or indirect override.
    #[error("ambiguous export '{name}' from '{module}'")]
    AmbiguousBinding {
        /// The requested name.
        name: String,
        /// The module it was requested from.
        module: Identity,
    },
    /// The name does not exist anywhere in the module's export surface.
    #[error("module '{module}' has no export named '{name}'")]
    UnresolvedExport {
        /// The requested name.
        name: String,
        /// The module it was requested from.
        module: Identity,
    },
    /// A re-export chain revisited a record without reaching a local
    /// binding.
    #[error("cyclic re-export of '{name}' through '{module}'")]
    CyclicIndirectExport {
        /// The exported name whose chain cycles.
        name: String,
        /// The module declaring the re-export.
        module: Identity,
    },
    /// A structurally referenced module failed in an earlier phase.
    #[error("dependency '{module}' failed: {source}")]
    UpstreamFailure {
        /// The failed module.
        module: Identity,
        /// Its first failure.
        #[source]
        source: Box<ModuleError>,
    },
}

/// Outcome of resolving one export name against one record.
enum Resolution {
    /// The ultimate owning slot.
    Binding(Binding),
    /// Two or more distinct star sources, no override.
    Ambiguous,
    /// Not part of the record's export surface.
    NotFound,
    /// The resolve set was revisited; a cycle with no owning slot.
    Circular,
}

pub(crate) struct Linker<'g> {
    graph: &'g mut ModuleGraph,
    options: LoaderOptions,
    /// Black entries of the star-closure traversal: completed name sets.
    names: FxHashMap<ModuleId, Rc<BTreeSet<String>>>,
    /// Gray entries: records on the current traversal path. A gray hit is a
    /// star cycle and contributes no additional names.
    names_in_progress: FxHashSet<ModuleId>,
}

impl<'g> Linker<'g> {
    pub(crate) fn new(graph: &'g mut ModuleGraph, options: LoaderOptions) -> Self {
        Self {
            graph,
            options,
            names: FxHashMap::default(),
            names_in_progress: FxHashSet::default(),
        }
    }

    /// Link everything reachable from `root`. Idempotent; already-linked
    /// records are skipped.
    pub(crate) fn link(&mut self, root: ModuleId) -> Result<(), LinkError> {
        let order = self.graph.post_order(root);

        // Pass 1: instantiate one dead-zone slot per declared name.
        for &id in &order {
            let record = self.graph.record(id);
            if record.state() != ModuleState::Unlinked {
                continue;
            }
            let scope = record.scope.clone();
            let lexicals = record.lexicals.clone();
            let hoisted: Vec<String> = record.hoisted.iter().map(|h| h.name.clone()).collect();
            for decl in &lexicals {
                scope.declare(&decl.name, decl.mutability);
            }
            for name in &hoisted {
                scope.declare(name, Mutability::Hoisted);
            }
            self.graph.record_mut(id).set_state(ModuleState::Linking);
        }

        // Passes 2-4, dependencies first: export tables, imports,
        // namespaces. The first failure is surfaced; records that
        // structurally reference the offender are poisoned, siblings that
        // already linked stay linked.
        for &id in &order {
            match self.graph.record(id).state() {
                ModuleState::Linked | ModuleState::Evaluating | ModuleState::Evaluated => continue,
                ModuleState::Errored => {
                    let record = self.graph.record(id);
                    let Some(cause) = record.error().cloned() else {
                        continue;
                    };
                    let error = LinkError::UpstreamFailure {
                        module: record.identity().clone(),
                        source: Box::new(cause),
                    };
                    self.poison_dependents(&order, id);
                    return Err(error);
                }
                ModuleState::Unlinked | ModuleState::Linking => {}
            }
            if let Err(error) = self.link_one(id) {
                self.graph
                    .record_mut(id)
                    .fail(ModuleError::Link(error.clone()));
                self.poison_dependents(&order, id);
                return Err(error);
            }
            self.graph.record_mut(id).set_state(ModuleState::Linked);
            debug!(module = %self.graph.record(id).identity(), "linked module");
            if self.options.eager_namespaces {
                self.ensure_namespace(id);
            }
        }
        Ok(())
    }

    /// Passes 2 and 3 for one record: build its export table, then resolve
    /// its imports into scope aliases.
    fn link_one(&mut self, id: ModuleId) -> Result<(), LinkError> {
        let dep_failure = {
            let graph = &*self.graph;
            graph.record(id).dependencies().find_map(|(_, dep)| {
                let dep_record = graph.record(dep);
                dep_record
                    .error()
                    .map(|cause| (dep_record.identity().clone(), cause.clone()))
            })
        };
        if let Some((module, cause)) = dep_failure {
            return Err(LinkError::UpstreamFailure {
                module,
                source: Box::new(cause),
            });
        }

        self.ensure_exports(id)?;

        let imports = self.graph.record(id).imports.clone();
        let scope = self.graph.record(id).scope.clone();
        for link in imports {
            self.ensure_exports(link.module)?;
            let dep_identity = self.graph.record(link.module).identity().clone();
            for binding in link.bindings {
                match binding {
                    ImportBinding::Named { import, local } => {
                        match self.graph.record(link.module).resolved_exports.get(&import) {
                            Some(ExportResolution::Binding(slot)) => {
                                scope.alias(&local, slot.clone());
                            }
                            Some(ExportResolution::Ambiguous) => {
                                return Err(LinkError::AmbiguousBinding {
                                    name: import,
                                    module: dep_identity,
                                });
                            }
                            None => {
                                return Err(LinkError::UnresolvedExport {
                                    name: import,
                                    module: dep_identity,
                                });
                            }
                        }
                    }
                    ImportBinding::Namespace { local } => {
                        let namespace = self.ensure_namespace(link.module);
                        // Namespace bindings are initialized at link time;
                        // they are never in the dead zone.
                        scope.alias(
                            &local,
                            Binding::initialized(
                                &local,
                                Mutability::Const,
                                Value::Namespace(namespace),
                            ),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Build the record's resolved export table: local exports, indirect
    /// chains followed to their owning slots, then the star closure.
    fn ensure_exports(&mut self, id: ModuleId) -> Result<(), LinkError> {
        if self.graph.record(id).exports_resolved {
            return Ok(());
        }
        let identity = self.graph.record(id).identity().clone();
        let mut table: FxHashMap<String, ExportResolution> = FxHashMap::default();

        let locals = self.graph.record(id).local_exports.clone();
        let scope = self.graph.record(id).scope.clone();
        for entry in locals {
            let binding =
                scope
                    .binding(&entry.local_name)
                    .ok_or_else(|| LinkError::UnresolvedExport {
                        name: entry.export_name.clone(),
                        module: identity.clone(),
                    })?;
            table.insert(entry.export_name, ExportResolution::Binding(binding));
        }

        let indirects = self.graph.record(id).indirect_exports.clone();
        for entry in indirects {
            let dep_identity = self.graph.record(entry.module).identity().clone();
            let mut seen = vec![(id, entry.export_name.clone())];
            match self.resolve_export(entry.module, &entry.import_name, &mut seen) {
                Resolution::Binding(slot) => {
                    table.insert(entry.export_name, ExportResolution::Binding(slot));
                }
                Resolution::Ambiguous => {
                    return Err(LinkError::AmbiguousBinding {
                        name: entry.import_name,
                        module: dep_identity,
                    });
                }
                Resolution::NotFound => {
                    return Err(LinkError::UnresolvedExport {
                        name: entry.import_name,
                        module: dep_identity,
                    });
                }
                Resolution::Circular => {
                    return Err(LinkError::CyclicIndirectExport {
                        name: entry.export_name,
                        module: identity.clone(),
                    });
                }
            }
        }

        // Star-exported names fill the remainder. Ambiguity is recorded in
        // the table rather than raised: it only becomes an error when the
        // name is requested directly.
        let star_names = self.exported_names(id);
        for name in star_names.iter() {
            if name == "default" || table.contains_key(name) {
                continue;
            }
            let mut seen = Vec::new();
            match self.resolve_export(id, name, &mut seen) {
                Resolution::Binding(slot) => {
                    table.insert(name.clone(), ExportResolution::Binding(slot));
                }
                Resolution::Ambiguous => {
                    debug!(module = %identity, name = %name, "ambiguous star export");
                    table.insert(name.clone(), ExportResolution::Ambiguous);
                }
                Resolution::NotFound | Resolution::Circular => {}
            }
        }

        let record = self.graph.record_mut(id);
        record.resolved_exports = table;
        record.exports_resolved = true;
        Ok(())
    }

    /// Resolve one export name against one record, following indirect
    /// chains and star sources. The resolve set accumulates every
    /// `(record, name)` pair visited; a revisit is a cycle.
    fn resolve_export(
        &self,
        module: ModuleId,
        name: &str,
        seen: &mut Vec<(ModuleId, String)>,
    ) -> Resolution {
        if seen.iter().any(|(m, n)| *m == module && n == name) {
            return Resolution::Circular;
        }
        seen.push((module, name.to_string()));

        enum Step {
            Local(Option<Binding>),
            Indirect(ModuleId, String),
            Stars(Vec<ModuleId>),
        }
        let step = {
            let record = self.graph.record(module);
            if let Some(entry) = record.local_exports.iter().find(|e| e.export_name == name) {
                Step::Local(record.scope.binding(&entry.local_name))
            } else if let Some(entry) = record
                .indirect_exports
                .iter()
                .find(|e| e.export_name == name)
            {
                Step::Indirect(entry.module, entry.import_name.clone())
            } else {
                Step::Stars(record.star_exports.clone())
            }
        };

        match step {
            Step::Local(Some(binding)) => Resolution::Binding(binding),
            Step::Local(None) => Resolution::NotFound,
            Step::Indirect(dep, import_name) => self.resolve_export(dep, &import_name, seen),
            Step::Stars(stars) => {
                // A default export is never provided by a star re-export.
                if name == "default" {
                    return Resolution::NotFound;
                }
                let mut star_resolution: Option<Binding> = None;
                for dep in stars {
                    match self.resolve_export(dep, name, seen) {
                        Resolution::Ambiguous => return Resolution::Ambiguous,
                        Resolution::Binding(found) => match &star_resolution {
                            Some(previous) if !Binding::same_slot(previous, &found) => {
                                return Resolution::Ambiguous;
                            }
                            Some(_) => {}
                            None => star_resolution = Some(found),
                        },
                        Resolution::NotFound | Resolution::Circular => {}
                    }
                }
                match star_resolution {
                    Some(binding) => Resolution::Binding(binding),
                    None => Resolution::NotFound,
                }
            }
        }
    }

    /// The transitive set of names the record exports, including star
    /// closures. Three-color: a gray hit is a star cycle and contributes
    /// nothing; only top-level results are memoized black, since a set
    /// computed under a gray ancestor is truncated by the cycle.
    fn exported_names(&mut self, module: ModuleId) -> Rc<BTreeSet<String>> {
        if let Some(names) = self.names.get(&module) {
            return Rc::clone(names);
        }
        let top_level = self.names_in_progress.is_empty();
        if !self.names_in_progress.insert(module) {
            return Rc::new(BTreeSet::new());
        }

        let (locals, indirects, stars) = {
            let record = self.graph.record(module);
            (
                record
                    .local_exports
                    .iter()
                    .map(|e| e.export_name.clone())
                    .collect::<Vec<_>>(),
                record
                    .indirect_exports
                    .iter()
                    .map(|e| e.export_name.clone())
                    .collect::<Vec<_>>(),
                record.star_exports.clone(),
            )
        };
        let mut names: BTreeSet<String> = locals.into_iter().chain(indirects).collect();
        for dep in stars {
            for name in self.exported_names(dep).iter() {
                if name != "default" {
                    names.insert(name.clone());
                }
            }
        }

        self.names_in_progress.remove(&module);
        let names = Rc::new(names);
        if top_level {
            self.names.insert(module, Rc::clone(&names));
        }
        names
    }

    /// The record's namespace object, building and caching it on first use.
    /// Requires the record's export table.
    fn ensure_namespace(&mut self, module: ModuleId) -> Namespace {
        if let Some(namespace) = self.graph.record(module).namespace() {
            return namespace.clone();
        }
        let record = self.graph.record(module);
        let namespace = namespace_from_exports(record.identity().clone(), &record.resolved_exports);
        self.graph.record_mut(module).namespace = Some(namespace.clone());
        namespace
    }

    /// Mark every record that transitively references `failed` as errored
    /// with a wrapped upstream cause.
    fn poison_dependents(&mut self, order: &[ModuleId], failed: ModuleId) {
        let mut poisoned: FxHashSet<ModuleId> = order
            .iter()
            .copied()
            .filter(|&id| self.graph.record(id).error().is_some())
            .collect();
        poisoned.insert(failed);
        loop {
            let mut changed = false;
            for &id in order {
                if poisoned.contains(&id) {
                    continue;
                }
                let hit = self
                    .graph
                    .record(id)
                    .dependencies()
                    .map(|(_, dep)| dep)
                    .find(|dep| poisoned.contains(dep));
                let Some(dep) = hit else { continue };
                let Some(cause) = self.graph.record(dep).error().cloned() else {
                    continue;
                };
                let dependency = self.graph.record(dep).identity().clone();
                self.graph
                    .record_mut(id)
                    .fail(ModuleError::Link(LinkError::UpstreamFailure {
                        module: dependency,
                        source: Box::new(cause),
                    }));
                poisoned.insert(id);
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }
}

/// The frozen namespace view of a resolved export table: sorted, minus
/// ambiguous entries, minus `default`. Inspects key presence only; slot
/// values are never read.
pub(crate) fn namespace_from_exports(
    module: Identity,
    exports: &FxHashMap<String, ExportResolution>,
) -> Namespace {
    let mut entries = BTreeMap::new();
    for (name, resolution) in exports {
        if name == "default" {
            continue;
        }
        if let ExportResolution::Binding(binding) = resolution {
            entries.insert(name.clone(), binding.clone());
        }
    }
    Namespace::new(module, entries)
}
