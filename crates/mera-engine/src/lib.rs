//! Mera module engine
//!
//! Resolution, linking, and evaluation ordering for ES-style source modules:
//! - **Loader**: resolves specifiers through a host, builds the dependency
//!   graph, deduplicates records by canonical identity (`loader` module)
//! - **Linker**: resolves every import to a concrete binding slot, computes
//!   star-export closures, flags ambiguity, builds frozen namespaces
//!   (`linker` module)
//! - **Evaluator**: orders bodies dependency-first, supports cycles and
//!   cooperative suspension, drives bindings out of the temporal dead zone
//!   (`eval` module)
//!
//! Parsing and expression evaluation stay with the host: a [`ModuleHost`]
//! turns specifiers into [`Declarations`], and statements carry opaque
//! [`Expr`] thunks the evaluator runs against each module's scope.
//!
//! # Example
//!
//! ```rust,ignore
//! use mera_engine::{Declarations, Expr, MemoryHost, ModuleLoader};
//!
//! let mut host = MemoryHost::new();
//! host.insert(
//!     "lib",
//!     Declarations::new()
//!         .with_let("answer")
//!         .with_init("answer", Expr::value(42))
//!         .with_export("answer"),
//! );
//! host.insert(
//!     "main",
//!     Declarations::new().with_import("lib", &[("answer", "answer")]),
//! );
//!
//! let mut loader = ModuleLoader::new(host);
//! let ns = loader.load_link_evaluate("lib").unwrap();
//! assert_eq!(ns.get("answer").unwrap().as_number(), Some(42.0));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Binding slots: storage cells with TDZ state.
pub mod binding;
/// Parsed declaration lists produced by the host's parser.
pub mod decl;
/// Evaluation ordering and body execution.
pub mod eval;
/// The record arena and dedup table.
pub mod graph;
/// Host collaborator traits and the in-memory host.
pub mod host;
/// Import/export resolution and namespace construction.
pub mod linker;
/// The loading session and graph construction.
pub mod loader;
/// Frozen namespace objects.
pub mod namespace;
/// Module records and identities.
pub mod record;
/// Per-module lexical scopes.
pub mod scope;
/// Runtime values.
pub mod value;

pub use binding::{Binding, Mutability, UninitializedBindingError};
pub use decl::{
    Declarations, Expr, HoistedDecl, ImportBinding, ImportEntry, IndirectExport, LexicalDecl,
    LocalExport, Statement,
};
pub use eval::EvalError;
pub use graph::{GraphStats, ModuleGraph};
pub use host::{FetchError, MemoryHost, ModuleHost, ParseError, ResolveError, SourceText};
pub use linker::LinkError;
pub use loader::{LoadError, LoaderOptions, ModuleLoader};
pub use namespace::{FrozenMutationError, Namespace};
pub use record::{ExportResolution, Identity, ModuleError, ModuleId, ModuleRecord, ModuleState};
pub use scope::ModuleScope;
pub use value::{HostFunction, Value};
