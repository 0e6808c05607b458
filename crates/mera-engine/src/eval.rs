//! Evaluation ordering and cooperative module body execution.
//!
//! The driver is a single-threaded scheduler over the dependency-first
//! order. A body suspending at an await parks its resumption state, keyed by
//! record id, and control moves to other records whose dependencies are
//! satisfied; a dependent outside a cycle is never entered while a
//! dependency is still evaluating.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{debug, trace};

use crate::binding::UninitializedBindingError;
use crate::decl::Statement;
use crate::graph::ModuleGraph;
use crate::record::{Identity, ModuleError, ModuleId, ModuleState};

/// Failure raised during body execution, or by the read/write surface host
/// thunks use.
#[derive(Debug, Error, Clone)]
pub enum EvalError {
    /// A binding was accessed inside its temporal dead zone.
    #[error(transparent)]
    Uninitialized(#[from] UninitializedBindingError),
    /// The name is not declared in the scope.
    #[error("'{name}' is not defined")]
    UnboundName {
        /// The undeclared name.
        name: String,
    },
    /// A const binding was written after initialization.
    #[error("assignment to constant '{name}'")]
    AssignmentToConst {
        /// The const binding.
        name: String,
    },
    /// An imported alias was written; imports are read-only views.
    #[error("assignment to imported binding '{name}'")]
    AssignmentToImport {
        /// The imported alias.
        name: String,
    },
    /// An uncaught failure thrown by a host thunk.
    #[error("{message}")]
    Thrown {
        /// The thrown description.
        message: String,
    },
    /// Evaluation was requested before linking completed.
    #[error("module '{module}' is not linked")]
    NotLinked {
        /// The unlinked module.
        module: Identity,
    },
    /// Evaluation was requested on a module that already failed in an
    /// earlier phase.
    #[error("module '{module}' previously failed: {source}")]
    Failed {
        /// The failed module.
        module: Identity,
        /// Its first failure.
        #[source]
        source: Box<ModuleError>,
    },
    /// A dependency failed, so this body was never entered.
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

impl EvalError {
    /// A thrown failure with the given description. Convenience for host
    /// thunks.
    pub fn thrown(message: impl Into<String>) -> Self {
        EvalError::Thrown {
            message: message.into(),
        }
    }
}

/// Resumption state for one module body.
struct Task {
    module: ModuleId,
    /// Index of the next statement to execute.
    pc: usize,
    hoisted_done: bool,
}

enum Outcome {
    Completed,
    Suspended,
    Failed,
}

pub(crate) struct Evaluator<'g> {
    graph: &'g mut ModuleGraph,
}

impl<'g> Evaluator<'g> {
    pub(crate) fn new(graph: &'g mut ModuleGraph) -> Self {
        Self { graph }
    }

    /// Run bodies reachable from `root` in dependency order, exactly once
    /// each. Returns the root's outcome; a previously evaluated root
    /// returns its cached result.
    pub(crate) fn evaluate(&mut self, root: ModuleId) -> Result<(), EvalError> {
        match self.graph.record(root).state() {
            ModuleState::Evaluated => return Ok(()),
            ModuleState::Errored => return Err(self.stored_failure(root)),
            ModuleState::Linked | ModuleState::Evaluating => {}
            ModuleState::Unlinked | ModuleState::Linking => {
                return Err(EvalError::NotLinked {
                    module: self.graph.record(root).identity().clone(),
                });
            }
        }

        let order = self.graph.post_order(root);
        let components = SccIndex::build(self.graph, root);

        let mut started: FxHashSet<ModuleId> = FxHashSet::default();
        let mut suspended: VecDeque<Task> = VecDeque::new();
        loop {
            let next = order
                .iter()
                .copied()
                .find(|&m| !started.contains(&m) && self.ready(m, &components));
            if let Some(module) = next {
                started.insert(module);
                match self.graph.record(module).state() {
                    ModuleState::Evaluated | ModuleState::Errored => continue,
                    _ => {}
                }
                if let Some((dependency, cause)) = self.failed_dependency(module) {
                    let identity = self.graph.record(module).identity().clone();
                    debug!(module = %identity, dependency = %dependency, "dependency failed, body not entered");
                    self.graph
                        .record_mut(module)
                        .fail(ModuleError::Eval(EvalError::Upstream {
                            module: identity,
                            dependency,
                            source: Box::new(cause),
                        }));
                    continue;
                }
                let mut task = Task {
                    module,
                    pc: 0,
                    hoisted_done: false,
                };
                if matches!(self.run(&mut task), Outcome::Suspended) {
                    suspended.push_back(task);
                }
                continue;
            }
            if let Some(mut task) = suspended.pop_front() {
                if matches!(self.run(&mut task), Outcome::Suspended) {
                    suspended.push_back(task);
                }
                continue;
            }
            break;
        }

        match self.graph.record(root).state() {
            ModuleState::Evaluated => Ok(()),
            _ => Err(self.stored_failure(root)),
        }
    }

    /// Whether every dependency of `module` is finished, failed, or part of
    /// the same strongly connected component.
    fn ready(&self, module: ModuleId, components: &SccIndex) -> bool {
        self.graph.record(module).dependencies().all(|(_, dep)| {
            matches!(
                self.graph.record(dep).state(),
                ModuleState::Evaluated | ModuleState::Errored
            ) || components.same_component(module, dep)
        })
    }

    fn failed_dependency(&self, module: ModuleId) -> Option<(Identity, ModuleError)> {
        self.graph
            .record(module)
            .dependencies()
            .find_map(|(_, dep)| {
                let record = self.graph.record(dep);
                record
                    .error()
                    .map(|cause| (record.identity().clone(), cause.clone()))
            })
    }

    /// Execute or resume one body. Hoisted bindings initialize before the
    /// first statement; an await yields after its expression has run.
    fn run(&mut self, task: &mut Task) -> Outcome {
        let (scope, identity) = {
            let record = self.graph.record(task.module);
            (record.scope.clone(), record.identity().clone())
        };

        if !task.hoisted_done {
            self.graph
                .record_mut(task.module)
                .set_state(ModuleState::Evaluating);
            debug!(module = %identity, "evaluating module");
            let hoisted = self.graph.record(task.module).hoisted.clone();
            for decl in hoisted {
                let step = decl
                    .init
                    .eval(&scope)
                    .and_then(|value| scope.initialize(&decl.name, value));
                if let Err(error) = step {
                    return self.fail(task.module, error);
                }
            }
            task.hoisted_done = true;
        }

        let body = self.graph.record(task.module).body.clone();
        while task.pc < body.len() {
            let statement = body[task.pc].clone();
            task.pc += 1;
            let step = match statement {
                Statement::Initialize { name, expr } => expr
                    .eval(&scope)
                    .and_then(|value| scope.initialize(&name, value)),
                Statement::Expression(expr) => expr.eval(&scope).map(|_| ()),
                Statement::Await(expr) => match expr.eval(&scope) {
                    Ok(_) => {
                        trace!(module = %identity, "suspended at await");
                        return Outcome::Suspended;
                    }
                    Err(error) => Err(error),
                },
            };
            if let Err(error) = step {
                return self.fail(task.module, error);
            }
        }

        self.graph
            .record_mut(task.module)
            .set_state(ModuleState::Evaluated);
        debug!(module = %identity, "evaluated module");
        Outcome::Completed
    }

    fn fail(&mut self, module: ModuleId, error: EvalError) -> Outcome {
        debug!(module = %self.graph.record(module).identity(), %error, "module body failed");
        self.graph.record_mut(module).fail(ModuleError::Eval(error));
        Outcome::Failed
    }

    fn stored_failure(&self, module: ModuleId) -> EvalError {
        let record = self.graph.record(module);
        match record.error() {
            Some(ModuleError::Eval(error)) => error.clone(),
            Some(other) => EvalError::Failed {
                module: record.identity().clone(),
                source: Box::new(other.clone()),
            },
            None => EvalError::NotLinked {
                module: record.identity().clone(),
            },
        }
    }
}

/// Strongly connected components of the dependency graph, used to let cycle
/// members start while the rest of their cycle is still evaluating.
struct SccIndex {
    root_of: FxHashMap<ModuleId, ModuleId>,
}

impl SccIndex {
    fn build(graph: &ModuleGraph, root: ModuleId) -> Self {
        let mut state = SccState {
            index: FxHashMap::default(),
            low: FxHashMap::default(),
            on_stack: FxHashSet::default(),
            stack: Vec::new(),
            counter: 0,
            root_of: FxHashMap::default(),
        };
        strongconnect(graph, root, &mut state);
        Self {
            root_of: state.root_of,
        }
    }

    fn same_component(&self, a: ModuleId, b: ModuleId) -> bool {
        match (self.root_of.get(&a), self.root_of.get(&b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }
}

struct SccState {
    index: FxHashMap<ModuleId, u32>,
    low: FxHashMap<ModuleId, u32>,
    on_stack: FxHashSet<ModuleId>,
    stack: Vec<ModuleId>,
    counter: u32,
    root_of: FxHashMap<ModuleId, ModuleId>,
}

fn strongconnect(graph: &ModuleGraph, v: ModuleId, state: &mut SccState) {
    state.index.insert(v, state.counter);
    state.low.insert(v, state.counter);
    state.counter += 1;
    state.stack.push(v);
    state.on_stack.insert(v);

    let deps: Vec<ModuleId> = graph.record(v).dependencies().map(|(_, d)| d).collect();
    for w in deps {
        if !state.index.contains_key(&w) {
            strongconnect(graph, w, state);
            let low_w = state.low[&w];
            if low_w < state.low[&v] {
                state.low.insert(v, low_w);
            }
        } else if state.on_stack.contains(&w) {
            let index_w = state.index[&w];
            if index_w < state.low[&v] {
                state.low.insert(v, index_w);
            }
        }
    }

    if state.low[&v] == state.index[&v] {
        while let Some(w) = state.stack.pop() {
            state.on_stack.remove(&w);
            state.root_of.insert(w, v);
            if w == v {
                break;
            }
        }
    }
}
