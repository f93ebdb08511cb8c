//! The language factory contract and the registry of installed
//! factories, selectable by short name or URI.
//!
//! This crate ships no parser: a `LanguageFactory` is the seam a query
//! language implementation attaches to. `prepare` is the only hook a
//! real factory must implement; `init`, `execute`, and `terminate` have
//! no-op defaults for factories that don't need them.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::Result;
use crate::query::QueryInner;

/// A query-language plugin, consumed but not defined by the core.
///
/// Hooks operate directly on [`QueryInner`] rather than the
/// reference-counted [`crate::query::Query`] handle: a factory never
/// needs shared ownership of the query, only mutable access to its
/// declared sequences, so taking `&mut QueryInner` avoids an awkward
/// re-borrow of the query's own `RefCell` from inside its own method
/// call.
pub trait LanguageFactory {
    /// Short name used for lookup, e.g. `"rasqal"` or `"sparql"`.
    fn name(&self) -> &str;

    /// Human-readable label.
    fn label(&self) -> &str;

    /// URI identifying the language, if any.
    fn uri(&self) -> Option<&str> {
        None
    }

    /// One-time hook run from [`crate::query::Query::new`], before `prepare`.
    fn init(&self, query: &mut QueryInner) -> Result<()> {
        let _ = query;
        Ok(())
    }

    /// Parse the query string into the query's declared sequences.
    fn prepare(&self, query: &mut QueryInner) -> Result<()>;

    /// Optional hook run after the engine's execute-init; this is
    /// where a factory typically builds the root row-source
    /// from its triple-pattern matcher and installs it with
    /// [`QueryInner::set_root_rowsource`].
    fn execute(&self, query: &mut QueryInner) -> Result<()> {
        let _ = query;
        Ok(())
    }

    /// Run just before the query's owned state is released.
    fn terminate(&self, query: &mut QueryInner) {
        let _ = query;
    }
}

/// Registry of installed language factories, selectable by name or URI.
/// The first factory registered becomes the default, used when both
/// `name` and `uri` are `None`.
#[derive(Default)]
pub struct LanguageRegistry {
    factories: IndexMap<String, Rc<dyn LanguageFactory>>,
    default_name: Option<String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Rc<dyn LanguageFactory>) {
        let name = factory.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.factories.insert(name, factory);
    }

    /// Resolve by short name, then by URI, then (if both are `None`) the
    /// default factory.
    pub fn resolve(&self, name: Option<&str>, uri: Option<&str>) -> Option<Rc<dyn LanguageFactory>> {
        if let Some(name) = name {
            if let Some(f) = self.factories.get(name) {
                return Some(f.clone());
            }
        }
        if let Some(uri) = uri {
            if let Some(f) = self.factories.values().find(|f| f.uri() == Some(uri)) {
                return Some(f.clone());
            }
        }
        if name.is_none() && uri.is_none() {
            if let Some(default) = &self.default_name {
                return self.factories.get(default).cloned();
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A minimal factory used by this crate's own integration tests
    //! (there is no real query-language parser in this core).

    use super::*;
    use crate::row::Row;
    use crate::rowsource::{RowSourceHandle, ValuesRowSource};
    use std::cell::RefCell;

    /// A factory whose "parsing" is just installing a pre-built leaf
    /// row-source, so tests can drive [`crate::query::Query`] end to
    /// end without a real query-language parser.
    pub(crate) struct FixtureFactory {
        pub(crate) rows: RefCell<Option<Vec<Row>>>,
        pub(crate) variable_names: Vec<Rc<str>>,
    }

    impl LanguageFactory for FixtureFactory {
        fn name(&self) -> &str {
            "fixture"
        }

        fn label(&self) -> &str {
            "Fixture test factory"
        }

        fn prepare(&self, _query: &mut QueryInner) -> Result<()> {
            Ok(())
        }

        fn execute(&self, query: &mut QueryInner) -> Result<()> {
            let rows = self.rows.borrow_mut().take().unwrap_or_default();
            let handle = query.self_handle();
            let leaf = ValuesRowSource::new(handle, self.variable_names.clone(), rows);
            query.set_root_rowsource(RowSourceHandle::new(Box::new(leaf)));
            Ok(())
        }
    }

    /// A factory that installs a leaf wrapped in a filter (and,
    /// optionally, a sort) row-source as the query's root, so tests can
    /// exercise the full pipeline — not just a bare leaf — through
    /// [`crate::query::Query::execute`].
    pub(crate) struct PipelineFixtureFactory {
        pub(crate) rows: RefCell<Option<Vec<Row>>>,
        pub(crate) variable_names: Vec<Rc<str>>,
        pub(crate) filter_expr: Option<crate::expr::Expr>,
        pub(crate) order_conditions: Vec<crate::rowsource::OrderCondition>,
    }

    impl LanguageFactory for PipelineFixtureFactory {
        fn name(&self) -> &str {
            "pipeline-fixture"
        }

        fn label(&self) -> &str {
            "Pipeline fixture test factory"
        }

        fn prepare(&self, _query: &mut QueryInner) -> Result<()> {
            Ok(())
        }

        fn execute(&self, query: &mut QueryInner) -> Result<()> {
            use crate::rowsource::{FilterRowSource, SortRowSource};

            let rows = self.rows.borrow_mut().take().unwrap_or_default();
            let handle = query.self_handle();
            let leaf = RowSourceHandle::new(Box::new(ValuesRowSource::new(
                handle.clone(),
                self.variable_names.clone(),
                rows,
            )));

            let filtered = match &self.filter_expr {
                Some(expr) => RowSourceHandle::new(Box::new(FilterRowSource::new(
                    handle.clone(),
                    leaf,
                    expr.clone(),
                ))),
                None => leaf,
            };

            let root = if self.order_conditions.is_empty() {
                filtered
            } else {
                RowSourceHandle::new(Box::new(SortRowSource::new(
                    handle,
                    filtered,
                    self.order_conditions.clone(),
                )))
            };

            query.set_root_rowsource(root);
            Ok(())
        }
    }
}
