//! The loading session: graph construction over a host, plus the link and
//! evaluate entry points.

use thiserror::Error;
use tracing::debug;

use crate::eval::{EvalError, Evaluator};
use crate::graph::{GraphStats, ModuleGraph};
use crate::host::{FetchError, ModuleHost, ParseError, ResolveError};
use crate::linker::{namespace_from_exports, LinkError, Linker};
use crate::namespace::Namespace;
use crate::record::{
    Identity, ImportLink, IndirectLink, ModuleError, ModuleId, ModuleRecord, ModuleState,
};

/// Graph-construction failure. Load failures are never retried and poison
/// every dependent that reaches the failed record.
#[derive(Debug, Error, Clone)]
pub enum LoadError {
    /// The host could not normalize a specifier.
    #[error("failed to resolve '{specifier}': {source}")]
    Resolve {
        /// The specifier as written.
        specifier: String,
        /// Host diagnostic.
        #[source]
        source: ResolveError,
    },
    /// The host could not retrieve the source.
    #[error("failed to fetch '{identity}': {source}")]
    Fetch {
        /// The module that failed to fetch.
        identity: Identity,
        /// Host diagnostic.
        #[source]
        source: FetchError,
    },
    /// The host could not parse the source.
    #[error("failed to parse '{identity}': {source}")]
    Parse {
        /// The module that failed to parse.
        identity: Identity,
        /// Host diagnostic.
        #[source]
        source: ParseError,
    },
    /// A dependency of this module failed to load.
    #[error("dependency '{dependency}' of '{module}' failed: {source}")]
    Upstream {
        /// The dependent module.
        module: Identity,
        /// The failed dependency.
        dependency: Identity,
        /// The dependency's first failure.
        #[source]
        source: Box<ModuleError>,
    },
}

/// Session configuration.
#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    /// Build every record's namespace object during linking. When false,
    /// construction is deferred to first access.
    pub eager_namespaces: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            eager_namespaces: true,
        }
    }
}

/// One graph-resolution session: owns the host, the options, and the graph.
///
/// The dedup table lives for the lifetime of the session, so resolving two
/// specifiers that normalize to the same identity yields the same record,
/// and independent sessions never interfere.
#[derive(Debug)]
pub struct ModuleLoader<H> {
    host: H,
    graph: ModuleGraph,
    options: LoaderOptions,
}

impl<H: ModuleHost> ModuleLoader<H> {
    /// Create a session over a host with default options.
    pub fn new(host: H) -> Self {
        Self {
            host,
            graph: ModuleGraph::new(),
            options: LoaderOptions::default(),
        }
    }

    /// Replace the session options.
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// The underlying host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The session's module graph.
    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    /// Dedup-table statistics.
    pub fn stats(&self) -> GraphStats {
        self.graph.stats()
    }

    /// The record for an id minted by this session.
    pub fn record(&self, id: ModuleId) -> &ModuleRecord {
        self.graph.record(id)
    }

    /// A record's lifecycle state.
    pub fn state(&self, id: ModuleId) -> ModuleState {
        self.graph.record(id).state()
    }

    /// A record's canonical identity.
    pub fn identity(&self, id: ModuleId) -> &Identity {
        self.graph.record(id).identity()
    }

    /// Build the dependency graph rooted at a specifier.
    ///
    /// Every reachable record ends `Unlinked` or `Errored`; no bindings are
    /// resolved. A root failure aborts the call; a failure deeper in the
    /// graph leaves the record poisoned and surfaces at the first ancestor
    /// that uses it.
    pub fn resolve_graph(&mut self, specifier: &str) -> Result<ModuleId, LoadError> {
        let identity =
            self.host
                .normalize(None, specifier)
                .map_err(|source| LoadError::Resolve {
                    specifier: specifier.to_string(),
                    source,
                })?;
        let root = self.load(identity);
        match self.graph.record(root).error() {
            Some(ModuleError::Load(error)) => Err(error.clone()),
            _ => Ok(root),
        }
    }

    /// Resolve every import of the graph rooted at `root` to a concrete
    /// binding slot. Idempotent: already-linked records are skipped.
    pub fn link(&mut self, root: ModuleId) -> Result<(), LinkError> {
        Linker::new(&mut self.graph, self.options).link(root)
    }

    /// Run module bodies in dependency order, initializing binding slots.
    pub fn evaluate(&mut self, root: ModuleId) -> Result<(), EvalError> {
        Evaluator::new(&mut self.graph).evaluate(root)
    }

    /// The namespace object of a linked record, building it on demand.
    pub fn namespace(&mut self, id: ModuleId) -> Option<Namespace> {
        if let Some(namespace) = self.graph.record(id).namespace() {
            return Some(namespace.clone());
        }
        let record = self.graph.record(id);
        if !record.exports_resolved {
            return None;
        }
        let namespace = namespace_from_exports(record.identity().clone(), &record.resolved_exports);
        self.graph.record_mut(id).namespace = Some(namespace.clone());
        Some(namespace)
    }

    /// Resolve, link, and evaluate in one call, returning the root
    /// namespace.
    pub fn load_link_evaluate(&mut self, specifier: &str) -> Result<Namespace, ModuleError> {
        let root = self.resolve_graph(specifier)?;
        self.link(root)?;
        self.evaluate(root)?;
        Ok(self
            .namespace(root)
            .expect("evaluated root has resolved exports"))
    }

    /// Load one identity and everything reachable from it. The dedup table
    /// short-circuits identities that are already present or currently
    /// loading, which is what makes cyclic graphs safe to build.
    fn load(&mut self, identity: Identity) -> ModuleId {
        let (id, newly_created) = self.graph.intern(identity.clone());
        if !newly_created {
            debug!(module = %identity, "dedup hit");
            return id;
        }
        debug!(module = %identity, "loading module");

        let source = match self.host.fetch(&identity) {
            Ok(source) => source,
            Err(source) => {
                let error = LoadError::Fetch {
                    identity: identity.clone(),
                    source,
                };
                self.graph.record_mut(id).fail(error.into());
                return id;
            }
        };
        let declarations = match self.host.parse(&identity, &source) {
            Ok(declarations) => declarations,
            Err(source) => {
                let error = LoadError::Parse {
                    identity: identity.clone(),
                    source,
                };
                self.graph.record_mut(id).fail(error.into());
                return id;
            }
        };

        // Resolve and load dependencies in first-occurrence order. All of
        // them are visited even after a failure so the graph shape stays
        // complete; only the first failure is recorded.
        let requests: Vec<String> = declarations.requests().map(str::to_string).collect();
        let mut deps: Vec<(String, ModuleId)> = Vec::new();
        let mut own_error: Option<LoadError> = None;
        for specifier in requests {
            if deps.iter().any(|(seen, _)| *seen == specifier) {
                continue;
            }
            match self.host.normalize(Some(&identity), &specifier) {
                Ok(dep_identity) => {
                    let dep = self.load(dep_identity);
                    deps.push((specifier, dep));
                }
                Err(source) => {
                    own_error.get_or_insert(LoadError::Resolve { specifier, source });
                }
            }
        }

        let upstream = if own_error.is_none() {
            deps.iter().find_map(|&(_, dep)| {
                let dep_record = self.graph.record(dep);
                dep_record
                    .error()
                    .map(|cause| (dep_record.identity().clone(), cause.clone()))
            })
        } else {
            None
        };

        let record = self.graph.record_mut(id);
        for (specifier, dep) in deps {
            record.add_dependency(&specifier, dep);
        }
        for entry in declarations.imports {
            if let Some(dep) = record.dependency(&entry.specifier) {
                record.imports.push(ImportLink {
                    module: dep,
                    bindings: entry.bindings,
                });
            }
        }
        for entry in declarations.indirect_exports {
            if let Some(dep) = record.dependency(&entry.specifier) {
                record.indirect_exports.push(IndirectLink {
                    export_name: entry.export_name,
                    module: dep,
                    import_name: entry.import_name,
                });
            }
        }
        for specifier in declarations.star_exports {
            if let Some(dep) = record.dependency(&specifier) {
                record.star_exports.push(dep);
            }
        }
        record.local_exports = declarations.local_exports;
        record.hoisted = declarations.hoisted;
        record.lexicals = declarations.lexicals;
        record.body = declarations.body;

        if let Some(error) = own_error {
            record.fail(error.into());
        } else if let Some((dependency, cause)) = upstream {
            record.fail(
                LoadError::Upstream {
                    module: identity,
                    dependency,
                    source: Box::new(cause),
                }
                .into(),
            );
        }
        id
    }
}
