//! The query object: owns parsed query state, coordinates execution,
//! and hands out result iterators over a reference-counted handle.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::compare::CompareFlags;
use crate::diagnostics::{ErrorHandlers, MessageHandler};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::language::LanguageFactory;
use crate::literal::Literal;
use crate::query_results::QueryResults;
use crate::row::Row;
use crate::rowsource::{OrderCondition, RowSourceHandle};
use crate::triple::{Prefix, Source, Triple};
use crate::variables::VariablesTable;

/// A declared select variable: `name` plus an optional pre-bound value
/// supplied through the API (distinct from the variables table's
/// addressing slots — see [`crate::variables::Variable`] for that).
#[derive(Debug, Clone, PartialEq)]
pub struct SelectVariable {
    pub name: Rc<str>,
    pub value: Option<Literal>,
}

/// A reserved, currently-uninhabited switch for `rasqal_query_set_feature`:
/// the hook is real, but there is nothing to select yet.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {}

/// The owned state of a query: declared sequences, execution flags,
/// and the engine-side pipeline. Addressed only through [`Query`],
/// which wraps it in `Rc<RefCell<_>>` for sharing with live
/// [`QueryResults`] iterators.
pub struct QueryInner {
    self_ref: Weak<RefCell<QueryInner>>,
    factory: Option<Rc<dyn LanguageFactory>>,
    language_name: Option<String>,
    language_uri: Option<String>,

    query_string: Option<String>,
    base_uri: Option<String>,

    pub(crate) selects: Vec<SelectVariable>,
    sources: Vec<Source>,
    triples: Vec<Triple>,
    constraints: Vec<Expr>,
    prefixes: Vec<Prefix>,
    ordered_triples: Option<Vec<Triple>>,
    order_conditions: Vec<OrderCondition>,

    pub(crate) variables: VariablesTable,

    prepared: bool,
    executed: bool,
    pub(crate) finished: bool,
    pub(crate) failed: bool,

    pub(crate) result_count: u64,
    pub(crate) compare_flags: CompareFlags,
    pub(crate) distinct: bool,

    pub(crate) binding_values: Vec<Option<Literal>>,

    pub(crate) error_handlers: ErrorHandlers,
    user_data: Option<Rc<dyn Any>>,

    pub(crate) root: Option<RowSourceHandle>,
}

impl QueryInner {
    fn new(
        self_ref: Weak<RefCell<QueryInner>>,
        factory: Option<Rc<dyn LanguageFactory>>,
        language_name: Option<&str>,
        language_uri: Option<&str>,
    ) -> Self {
        Self {
            self_ref,
            factory,
            language_name: language_name.map(str::to_string),
            language_uri: language_uri.map(str::to_string),
            query_string: None,
            base_uri: None,
            selects: Vec::new(),
            sources: Vec::new(),
            triples: Vec::new(),
            constraints: Vec::new(),
            prefixes: Vec::new(),
            ordered_triples: None,
            order_conditions: Vec::new(),
            variables: VariablesTable::new(),
            prepared: false,
            executed: false,
            finished: false,
            failed: false,
            result_count: 0,
            compare_flags: CompareFlags::NONE,
            distinct: false,
            binding_values: Vec::new(),
            error_handlers: ErrorHandlers::default(),
            user_data: None,
            root: None,
        }
    }

    /// Test-only constructor for exercising the row-source pipeline
    /// without going through [`Query::new`]/`prepare`/`execute`.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(Weak::new(), None, None, None)
    }

    /// Recover the shared handle a row-source needs to address the
    /// query. Only valid once the query has actually been wrapped in
    /// an `Rc` by [`Query::new`].
    pub fn self_handle(&self) -> Rc<RefCell<QueryInner>> {
        self.self_ref
            .upgrade()
            .expect("QueryInner::self_handle called before the query was wrapped in Rc")
    }

    /// Install the root row-source built by the language factory's
    /// `execute` hook, run after the engine's execute-init.
    pub fn set_root_rowsource(&mut self, root: RowSourceHandle) {
        self.root = Some(root);
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn language_name(&self) -> Option<&str> {
        self.language_name.as_deref()
    }

    pub fn language_uri(&self) -> Option<&str> {
        self.language_uri.as_deref()
    }

    pub fn variables(&self) -> &VariablesTable {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariablesTable {
        &mut self.variables
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    /// Running count of results produced so far; meaningful
    /// mid-iteration, not just after exhaustion.
    pub fn result_count(&self) -> u64 {
        self.result_count
    }

    /// Reset per-execution counters.
    pub(crate) fn execute_init(&mut self) {
        self.result_count = 0;
        self.finished = false;
    }

    /// Release the root row-source chain. Idempotent.
    pub(crate) fn execute_finish(&mut self) {
        self.root.take();
    }

    /// Pull one result: `-1` error, `0` end, `>0` row.
    ///
    /// Takes the shared handle rather than `&mut self`: a filter or sort
    /// row-source evaluates expressions by re-borrowing the same
    /// `RefCell` to read `variables`/`compare_flags`, so this must not
    /// run while the handle is already borrowed. The root is taken out
    /// of `self` for the duration of the pull and put back before
    /// inspecting the outcome.
    pub(crate) fn get_next_result(handle: &Rc<RefCell<QueryInner>>) -> i32 {
        let Some(mut root) = handle.borrow_mut().root.take() else {
            return 0;
        };
        let outcome = root.next_row();
        let mut inner = handle.borrow_mut();
        inner.root = Some(root);
        match outcome {
            Ok(Some(row)) => {
                inner.apply_row_to_variables(&row);
                inner.result_count += 1;
                1
            }
            Ok(None) => 0,
            Err(e) => {
                inner.error_handlers.error(&e.to_string());
                -1
            }
        }
    }

    fn apply_row_to_variables(&mut self, row: &Row) {
        for (i, value) in row.values.iter().enumerate() {
            self.variables.set_value(i, value.clone());
        }
    }

    /// Fill `binding_values` from the variables table, one slot per
    /// select variable. `selects` and `variables` are populated in
    /// independent orders (`add_variable` prepends to `selects` but
    /// the table assigns indices by append order), so each select must
    /// be resolved to its table index by name rather than assumed to
    /// share position `i`.
    pub(crate) fn assign_binding_values(&mut self) {
        let selects = &self.selects;
        let variables = &self.variables;
        self.binding_values = selects
            .iter()
            .map(|select| variables.lookup(&select.name).and_then(|index| variables.get_value(index)))
            .collect();
    }
}

impl Drop for QueryInner {
    fn drop(&mut self) {
        if self.executed {
            self.execute_finish();
        }
        if let Some(factory) = self.factory.take() {
            factory.terminate(self);
        }
    }
}

/// User-facing handle to a query: owns the parsed select list,
/// sources, triples, constraints, and prefixes, and coordinates
/// execution. Reference-counted so that [`QueryResults`] iterators may
/// outlive this handle; the count is the `Rc` strong count,
/// incremented by every live iterator and decremented when each is
/// dropped.
pub struct Query {
    inner: Rc<RefCell<QueryInner>>,
}

impl Query {
    /// Resolve a language factory by name or URI (or the registry's
    /// default if both are `None`) and run its `init` hook.
    pub fn new(
        registry: &crate::language::LanguageRegistry,
        name: Option<&str>,
        uri: Option<&str>,
    ) -> Result<Self> {
        let factory = registry.resolve(name, uri).ok_or_else(|| Error::UnknownLanguage {
            name: name.map(str::to_string),
            uri: uri.map(str::to_string),
        })?;

        let inner = Rc::new_cyclic(|weak| {
            RefCell::new(QueryInner::new(weak.clone(), Some(factory.clone()), name, uri))
        });

        {
            let mut guard = inner.borrow_mut();
            factory.init(&mut guard)?;
        }

        Ok(Self { inner })
    }

    /// Parse `query_string` into the query's declared sequences. If no
    /// `base_uri` is given, the current working directory is used.
    /// Single-shot: a second call rejects.
    pub fn prepare(&mut self, query_string: Option<&str>, base_uri: Option<&str>) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.failed {
            return Err(Error::QueryFailed);
        }
        if inner.prepared {
            return Err(Error::AlreadyPrepared);
        }

        let base = match base_uri {
            Some(uri) => uri.to_string(),
            None => std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        inner.base_uri = Some(base);
        inner.query_string = query_string.map(str::to_string);

        if let Some(factory) = inner.factory.clone() {
            if let Err(e) = factory.prepare(&mut inner) {
                inner.failed = true;
                return Err(Error::LanguagePrepare(e.to_string()));
            }
        }

        inner.variables.lock();
        inner.prepared = true;
        Ok(())
    }

    /// Execute the prepared query, returning a result iterator already
    /// advanced to the first row. Single-shot.
    pub fn execute(&mut self) -> Result<QueryResults> {
        let mut inner = self.inner.borrow_mut();
        if inner.failed {
            return Err(Error::QueryFailed);
        }
        if !inner.prepared {
            return Err(Error::NotPrepared);
        }
        if inner.executed {
            return Err(Error::AlreadyExecuted);
        }

        inner.execute_init();

        if let Some(factory) = inner.factory.clone() {
            if let Err(e) = factory.execute(&mut inner) {
                inner.failed = true;
                inner.finished = true;
                return Err(Error::LanguageExecute(e.to_string()));
            }
        }
        inner.executed = true;
        drop(inner);

        let results = QueryResults::new(self.inner.clone());
        results.next();
        Ok(results)
    }

    /// Explicit release, mirroring the original's `free()`. Equivalent
    /// to letting `self` drop; provided as a named counterpart for
    /// callers that want an explicit teardown call.
    pub fn free(self) {}

    pub fn set_user_data<T: 'static>(&mut self, value: T) {
        self.inner.borrow_mut().user_data = Some(Rc::new(value));
    }

    pub fn user_data<T: 'static>(&self) -> Option<Rc<T>> {
        self.inner.borrow().user_data.clone().and_then(|rc| rc.downcast::<T>().ok())
    }

    pub fn set_fatal_error_handler(&mut self, user_data: Rc<dyn Any>, handler: MessageHandler) {
        self.inner
            .borrow_mut()
            .error_handlers
            .set_fatal_error_handler(user_data, handler);
    }

    pub fn set_error_handler(&mut self, user_data: Rc<dyn Any>, handler: MessageHandler) {
        self.inner.borrow_mut().error_handlers.set_error_handler(user_data, handler);
    }

    pub fn set_warning_handler(&mut self, user_data: Rc<dyn Any>, handler: MessageHandler) {
        self.inner
            .borrow_mut()
            .error_handlers
            .set_warning_handler(user_data, handler);
    }

    /// Reserved switch point for query features; currently always a
    /// no-op because no feature is defined yet.
    pub fn set_feature(&mut self, feature: Feature, _value: i64) {
        match feature {}
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.inner.borrow_mut().distinct = distinct;
    }

    pub fn distinct(&self) -> bool {
        self.inner.borrow().distinct
    }

    pub fn set_compare_flags(&mut self, flags: CompareFlags) {
        self.inner.borrow_mut().compare_flags = flags;
    }

    pub fn compare_flags(&self) -> CompareFlags {
        self.inner.borrow().compare_flags
    }

    pub fn query_string(&self) -> Option<String> {
        self.inner.borrow().query_string.clone()
    }

    pub fn base_uri(&self) -> Option<String> {
        self.inner.borrow().base_uri.clone()
    }

    // -- Sources -----------------------------------------------------

    /// Declarations prepend, matching the original `rasqal_query_add_source`
    /// family's use of `raptor_sequence_shift`.
    pub fn add_source(&mut self, source: Source) {
        self.inner.borrow_mut().sources.insert(0, source);
    }

    pub fn get_sources(&self) -> Vec<Source> {
        self.inner.borrow().sources.clone()
    }

    pub fn get_source(&self, idx: usize) -> Option<Source> {
        self.inner.borrow().sources.get(idx).cloned()
    }

    // -- Select variables ---------------------------------------------

    /// Add a select variable, registering it in the variables table if
    /// it isn't already addressed there.
    pub fn add_variable(&mut self, name: impl Into<Rc<str>>) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let name: Rc<str> = name.into();
        if inner.variables.lookup(&name).is_none() {
            inner.variables.add_variable(name.clone())?;
        }
        inner.selects.insert(0, SelectVariable { name, value: None });
        Ok(())
    }

    pub fn get_variables(&self) -> Vec<SelectVariable> {
        self.inner.borrow().selects.clone()
    }

    pub fn get_variable(&self, idx: usize) -> Option<SelectVariable> {
        self.inner.borrow().selects.get(idx).cloned()
    }

    /// Linear search over the select list, mirroring
    /// `rasqal_query_has_variable`.
    pub fn has_variable(&self, name: &str) -> bool {
        self.inner.borrow().selects.iter().any(|v| &*v.name == name)
    }

    /// Update a previously-added select variable's pre-bound value.
    /// Errors if `name` was never `add_variable`d, mirroring
    /// `rasqal_query_set_variable`'s `return 1` path.
    pub fn set_variable(&mut self, name: &str, value: Option<Literal>) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        match inner.selects.iter_mut().find(|v| &*v.name == name) {
            Some(v) => {
                v.value = value;
                Ok(())
            }
            None => Err(Error::UnknownVariable(name.to_string())),
        }
    }

    // -- Triples -------------------------------------------------------

    pub fn add_triple(&mut self, triple: Triple) {
        self.inner.borrow_mut().triples.insert(0, triple);
    }

    pub fn get_triples(&self) -> Vec<Triple> {
        self.inner.borrow().triples.clone()
    }

    pub fn get_triple(&self, idx: usize) -> Option<Triple> {
        self.inner.borrow().triples.get(idx).cloned()
    }

    pub fn set_ordered_triples(&mut self, triples: Option<Vec<Triple>>) {
        self.inner.borrow_mut().ordered_triples = triples;
    }

    pub fn ordered_triples(&self) -> Option<Vec<Triple>> {
        self.inner.borrow().ordered_triples.clone()
    }

    // -- Constraints ----------------------------------------------------

    pub fn add_constraint(&mut self, expr: Expr) {
        self.inner.borrow_mut().constraints.insert(0, expr);
    }

    pub fn get_constraints(&self) -> Vec<Expr> {
        self.inner.borrow().constraints.clone()
    }

    pub fn get_constraint(&self, idx: usize) -> Option<Expr> {
        self.inner.borrow().constraints.get(idx).cloned()
    }

    // -- Prefixes -------------------------------------------------------

    pub fn add_prefix(&mut self, prefix: Prefix) {
        self.inner.borrow_mut().prefixes.insert(0, prefix);
    }

    pub fn get_prefixes(&self) -> Vec<Prefix> {
        self.inner.borrow().prefixes.clone()
    }

    pub fn get_prefix(&self, idx: usize) -> Option<Prefix> {
        self.inner.borrow().prefixes.get(idx).cloned()
    }

    // -- Order conditions -------------------------------------------------

    pub fn add_order_condition(&mut self, condition: OrderCondition) {
        self.inner.borrow_mut().order_conditions.push(condition);
    }

    pub fn order_conditions(&self) -> Vec<OrderCondition> {
        self.inner.borrow().order_conditions.clone()
    }

    /// Shared handle to the inner state, for language factories and
    /// row-sources that need to address this query.
    pub fn inner_handle(&self) -> Rc<RefCell<QueryInner>> {
        self.inner.clone()
    }
}
