//! Module records: identity, lifecycle state, wired declarations, bindings.

use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::binding::Binding;
use crate::decl::{HoistedDecl, ImportBinding, LexicalDecl, LocalExport, Statement};
use crate::eval::EvalError;
use crate::linker::LinkError;
use crate::loader::LoadError;
use crate::namespace::Namespace;
use crate::scope::ModuleScope;

/// The canonical key of a module, produced by the host's `normalize`.
///
/// Two specifiers normalizing to the same identity always map to the same
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Wrap a canonical key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Identity {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// A stable arena index for one module record.
///
/// All graph edges are id lookups rather than owning references, which is
/// what lets dependency cycles exist without reference cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub(crate) u32);

impl ModuleId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lifecycle state of a module record. Transitions are forward-only;
/// `Errored` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleState {
    /// Loaded and wired into the graph; no bindings exist yet.
    Unlinked,
    /// Binding instantiation has started.
    Linking,
    /// Every import is resolved to a concrete slot.
    Linked,
    /// The body is executing or suspended at an await.
    Evaluating,
    /// The body has run to completion, exactly once.
    Evaluated,
    /// A load, link, or evaluation failure; sticky.
    Errored,
}

/// The first failure recorded against a module, whatever phase produced it.
#[derive(Debug, Error, Clone)]
pub enum ModuleError {
    /// Fetch, normalization, or parse failure during graph construction.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Structural failure during linking.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Uncaught failure during body execution.
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// An import declaration wired to its resolved dependency.
#[derive(Debug, Clone)]
pub(crate) struct ImportLink {
    pub module: ModuleId,
    pub bindings: Vec<ImportBinding>,
}

/// A named re-export wired to its resolved dependency.
#[derive(Debug, Clone)]
pub(crate) struct IndirectLink {
    pub export_name: String,
    pub module: ModuleId,
    pub import_name: String,
}

/// One entry of a record's linker-resolved export table.
#[derive(Debug, Clone)]
pub enum ExportResolution {
    /// The export resolves to a concrete slot (possibly in another record).
    Binding(Binding),
    /// The name is reachable through two or more distinct star-export
    /// sources with no local override. Absent from the namespace; a direct
    /// import of it is a link error.
    Ambiguous,
}

/// One module: identity, declarations, binding table, namespace, lifecycle.
#[derive(Debug)]
pub struct ModuleRecord {
    id: ModuleId,
    identity: Identity,
    state: ModuleState,
    /// `(specifier as written, resolved id)` in first-occurrence order.
    pub(crate) dependencies: Vec<(String, ModuleId)>,
    pub(crate) imports: Vec<ImportLink>,
    pub(crate) local_exports: Vec<LocalExport>,
    pub(crate) indirect_exports: Vec<IndirectLink>,
    /// Resolved targets of `export * from`, in textual order.
    pub(crate) star_exports: Vec<ModuleId>,
    pub(crate) hoisted: Vec<HoistedDecl>,
    pub(crate) lexicals: Vec<LexicalDecl>,
    pub(crate) body: Vec<Statement>,
    pub(crate) scope: ModuleScope,
    pub(crate) resolved_exports: FxHashMap<String, ExportResolution>,
    pub(crate) exports_resolved: bool,
    pub(crate) namespace: Option<Namespace>,
    error: Option<ModuleError>,
}

impl ModuleRecord {
    pub(crate) fn new(id: ModuleId, identity: Identity) -> Self {
        Self {
            id,
            identity,
            state: ModuleState::Unlinked,
            dependencies: Vec::new(),
            imports: Vec::new(),
            local_exports: Vec::new(),
            indirect_exports: Vec::new(),
            star_exports: Vec::new(),
            hoisted: Vec::new(),
            lexicals: Vec::new(),
            body: Vec::new(),
            scope: ModuleScope::new(),
            resolved_exports: FxHashMap::default(),
            exports_resolved: false,
            namespace: None,
            error: None,
        }
    }

    /// The record's arena id.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// The record's canonical identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The record's lifecycle state.
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// The first failure recorded against this module, if any.
    pub fn error(&self) -> Option<&ModuleError> {
        self.error.as_ref()
    }

    /// Dependencies in first-occurrence order.
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, ModuleId)> {
        self.dependencies.iter().map(|(s, id)| (s.as_str(), *id))
    }

    /// The namespace object, if it has been constructed.
    pub fn namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }

    /// The module's lexical scope.
    pub fn scope(&self) -> &ModuleScope {
        &self.scope
    }

    /// Advance the lifecycle state. A no-op on errored records.
    pub(crate) fn set_state(&mut self, next: ModuleState) {
        if self.state == ModuleState::Errored {
            return;
        }
        debug_assert!(next >= self.state, "backward state transition");
        self.state = next;
    }

    /// Record the first failure and move to `Errored`. Later failures are
    /// ignored; the first cause is sticky.
    pub(crate) fn fail(&mut self, error: ModuleError) {
        if self.error.is_none() {
            self.error = Some(error);
            self.state = ModuleState::Errored;
        }
    }

    /// The resolved id for a dependency specifier, if wired.
    pub(crate) fn dependency(&self, specifier: &str) -> Option<ModuleId> {
        self.dependencies
            .iter()
            .find(|(s, _)| s == specifier)
            .map(|(_, id)| *id)
    }

    /// Record a dependency edge, collapsing duplicate specifiers to the
    /// first occurrence.
    pub(crate) fn add_dependency(&mut self, specifier: &str, id: ModuleId) {
        if self.dependency(specifier).is_none() {
            self.dependencies.push((specifier.to_string(), id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvalError;

    #[test]
    fn test_forward_transitions() {
        let mut record = ModuleRecord::new(ModuleId(0), Identity::new("m"));
        assert_eq!(record.state(), ModuleState::Unlinked);
        record.set_state(ModuleState::Linking);
        record.set_state(ModuleState::Linked);
        record.set_state(ModuleState::Evaluating);
        record.set_state(ModuleState::Evaluated);
        assert_eq!(record.state(), ModuleState::Evaluated);
    }

    #[test]
    fn test_first_error_is_sticky() {
        let mut record = ModuleRecord::new(ModuleId(0), Identity::new("m"));
        record.fail(ModuleError::Eval(EvalError::Thrown {
            message: "first".into(),
        }));
        record.fail(ModuleError::Eval(EvalError::Thrown {
            message: "second".into(),
        }));
        assert_eq!(record.state(), ModuleState::Errored);
        assert!(matches!(
            record.error(),
            Some(ModuleError::Eval(EvalError::Thrown { message })) if message == "first"
        ));

        // Errored absorbs all later transitions.
        record.set_state(ModuleState::Evaluated);
        assert_eq!(record.state(), ModuleState::Errored);
    }

    #[test]
    fn test_dependency_collapse() {
        let mut record = ModuleRecord::new(ModuleId(0), Identity::new("m"));
        record.add_dependency("./a", ModuleId(1));
        record.add_dependency("./b", ModuleId(2));
        record.add_dependency("./a", ModuleId(1));
        let deps: Vec<_> = record.dependencies().collect();
        assert_eq!(deps, vec![("./a", ModuleId(1)), ("./b", ModuleId(2))]);
    }
}
