//! Parsed module declarations.
//!
//! [`Declarations`] is the contract between the host's parser and the engine:
//! ordered import and export entries, hoisting metadata, and the statement
//! body. Expressions stay opaque to the engine; they are host thunks evaluated
//! against the module's scope.

use std::fmt;
use std::rc::Rc;

use crate::binding::Mutability;
use crate::eval::EvalError;
use crate::scope::ModuleScope;
use crate::value::{HostFunction, Value};

/// An opaque host expression, evaluated against a module scope.
#[derive(Clone)]
pub struct Expr {
    thunk: Rc<dyn Fn(&ModuleScope) -> Result<Value, EvalError>>,
}

impl Expr {
    /// Wrap a host closure.
    pub fn new(f: impl Fn(&ModuleScope) -> Result<Value, EvalError> + 'static) -> Self {
        Self { thunk: Rc::new(f) }
    }

    /// A constant expression.
    pub fn value(v: impl Into<Value>) -> Self {
        let v = v.into();
        Self::new(move |_| Ok(v.clone()))
    }

    /// An expression that reads a binding from the module scope.
    pub fn read(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |scope| scope.read(&name))
    }

    /// An expression that throws.
    pub fn throws(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| {
            Err(EvalError::Thrown {
                message: message.clone(),
            })
        })
    }

    pub(crate) fn eval(&self, scope: &ModuleScope) -> Result<Value, EvalError> {
        (self.thunk)(scope)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Expr")
    }
}

/// One top-level statement of a module body.
#[derive(Debug, Clone)]
pub enum Statement {
    /// A lexical declaration's initializer, running at its textual position.
    /// Flips the named binding out of the dead zone.
    Initialize {
        /// The lexical binding being initialized.
        name: String,
        /// Initializer expression.
        expr: Expr,
    },
    /// An expression statement, evaluated for its side effects.
    Expression(Expr),
    /// A top-level await: the expression starts the awaited sub-computation,
    /// then the module suspends and yields control to the driver.
    Await(Expr),
}

/// One binding introduced by an import declaration.
#[derive(Debug, Clone)]
pub enum ImportBinding {
    /// `import { import as local } from ...`
    Named {
        /// The export name in the source module.
        import: String,
        /// The local alias in the importing module.
        local: String,
    },
    /// `import * as local from ...`
    Namespace {
        /// The local alias bound to the namespace object.
        local: String,
    },
}

/// An import declaration.
#[derive(Debug, Clone)]
pub struct ImportEntry {
    /// The specifier as written.
    pub specifier: String,
    /// The bindings the declaration introduces, in textual order.
    pub bindings: Vec<ImportBinding>,
}

/// `export { local as name }` of a binding declared in this module.
#[derive(Debug, Clone)]
pub struct LocalExport {
    /// The name visible to importers.
    pub export_name: String,
    /// The declared local name backing it.
    pub local_name: String,
}

/// `export { import_name as export_name } from specifier`.
#[derive(Debug, Clone)]
pub struct IndirectExport {
    /// The name visible to importers of this module.
    pub export_name: String,
    /// The specifier of the source module, as written.
    pub specifier: String,
    /// The name requested from the source module.
    pub import_name: String,
}

/// A hoisted function or class declaration.
///
/// The initializer runs before any top-level statement of the module body;
/// it typically captures the scope it receives.
#[derive(Debug, Clone)]
pub struct HoistedDecl {
    /// The declared name.
    pub name: String,
    /// Constructs the function or class value.
    pub init: Expr,
}

/// A lexical (`let`/`const`) declaration.
#[derive(Debug, Clone)]
pub struct LexicalDecl {
    /// The declared name.
    pub name: String,
    /// `Let` or `Const`.
    pub mutability: Mutability,
}

/// Everything the parser extracts from one module's source.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    /// Import declarations in textual order.
    pub imports: Vec<ImportEntry>,
    /// Exports of locally declared bindings.
    pub local_exports: Vec<LocalExport>,
    /// Named re-exports from other modules.
    pub indirect_exports: Vec<IndirectExport>,
    /// `export * from` specifiers in textual order.
    pub star_exports: Vec<String>,
    /// Hoisted function/class declarations.
    pub hoisted: Vec<HoistedDecl>,
    /// Lexical declarations, slot-created at link time.
    pub lexicals: Vec<LexicalDecl>,
    /// The statement body, in textual order.
    pub body: Vec<Statement>,
}

impl Declarations {
    /// An empty declaration list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named-import declaration; `pairs` are `(import, local)` names.
    pub fn with_import(mut self, specifier: impl Into<String>, pairs: &[(&str, &str)]) -> Self {
        self.imports.push(ImportEntry {
            specifier: specifier.into(),
            bindings: pairs
                .iter()
                .map(|(import, local)| ImportBinding::Named {
                    import: (*import).to_string(),
                    local: (*local).to_string(),
                })
                .collect(),
        });
        self
    }

    /// Add a namespace import (`import * as local`).
    pub fn with_import_namespace(
        mut self,
        specifier: impl Into<String>,
        local: impl Into<String>,
    ) -> Self {
        self.imports.push(ImportEntry {
            specifier: specifier.into(),
            bindings: vec![ImportBinding::Namespace {
                local: local.into(),
            }],
        });
        self
    }

    /// Export a local binding under its own name.
    pub fn with_export(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let local = name.clone();
        self.with_export_as(local, name)
    }

    /// Export a local binding under a different name.
    pub fn with_export_as(mut self, local: impl Into<String>, export: impl Into<String>) -> Self {
        self.local_exports.push(LocalExport {
            export_name: export.into(),
            local_name: local.into(),
        });
        self
    }

    /// Re-export a name from another module.
    pub fn with_export_from(
        mut self,
        export: impl Into<String>,
        specifier: impl Into<String>,
        import: impl Into<String>,
    ) -> Self {
        self.indirect_exports.push(IndirectExport {
            export_name: export.into(),
            specifier: specifier.into(),
            import_name: import.into(),
        });
        self
    }

    /// Add `export * from specifier`.
    pub fn with_export_star(mut self, specifier: impl Into<String>) -> Self {
        self.star_exports.push(specifier.into());
        self
    }

    /// Declare a `let` binding.
    pub fn with_let(mut self, name: impl Into<String>) -> Self {
        self.lexicals.push(LexicalDecl {
            name: name.into(),
            mutability: Mutability::Let,
        });
        self
    }

    /// Declare a `const` binding.
    pub fn with_const(mut self, name: impl Into<String>) -> Self {
        self.lexicals.push(LexicalDecl {
            name: name.into(),
            mutability: Mutability::Const,
        });
        self
    }

    /// Declare a hoisted function whose body is a host closure over the
    /// module scope and the call arguments.
    pub fn with_function(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&ModuleScope, &[Value]) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        let body = Rc::new(body);
        self.hoisted.push(HoistedDecl {
            name: name.into(),
            init: Expr::new(move |scope| {
                let scope = scope.clone();
                let body = Rc::clone(&body);
                Ok(Value::Function(HostFunction::new(move |args| {
                    body(&scope, args)
                })))
            }),
        });
        self
    }

    /// Append a lexical initializer statement.
    pub fn with_init(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.body.push(Statement::Initialize {
            name: name.into(),
            expr,
        });
        self
    }

    /// Append an expression statement.
    pub fn with_stmt(mut self, expr: Expr) -> Self {
        self.body.push(Statement::Expression(expr));
        self
    }

    /// Append a top-level await.
    pub fn with_await(mut self, expr: Expr) -> Self {
        self.body.push(Statement::Await(expr));
        self
    }

    /// Requested specifiers in declaration order: imports, then named
    /// re-exports, then star re-exports. Duplicates are kept; the loader
    /// collapses them to the first occurrence.
    pub(crate) fn requests(&self) -> impl Iterator<Item = &str> {
        self.imports
            .iter()
            .map(|i| i.specifier.as_str())
            .chain(self.indirect_exports.iter().map(|e| e.specifier.as_str()))
            .chain(self.star_exports.iter().map(|s| s.as_str()))
    }
}
