//! The reference-counted result iterator handed back by
//! [`crate::query::Query::execute`].
//!
//! Holding a clone of the query's `Rc<RefCell<QueryInner>>` is what lets
//! an iterator outlive the `Query` handle that created it: dropping the
//! `Query` only drops one strong reference, and the inner state stays
//! alive as long as any `QueryResults` (or row-source) still
//! references it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::literal::Literal;
use crate::query::QueryInner;

/// An iterator over a query's result rows. Advances eagerly: `execute`
/// already calls `next()` once to position this at the first row (or
/// immediately mark it finished if there are none).
pub struct QueryResults {
    query: Rc<RefCell<QueryInner>>,
}

impl QueryResults {
    pub(crate) fn new(query: Rc<RefCell<QueryInner>>) -> Self {
        Self { query }
    }

    /// Advance to the next row. Returns whether the result set is now
    /// finished (exhausted or failed) — mirrors the original's
    /// "is this the end" return convention rather than "did we get a
    /// row", since callers check bindings via the getters below.
    pub fn next(&self) -> bool {
        if self.query.borrow().finished {
            return true;
        }
        match QueryInner::get_next_result(&self.query) {
            1 => {
                self.query.borrow_mut().assign_binding_values();
                false
            }
            0 => {
                self.query.borrow_mut().finished = true;
                true
            }
            _ => {
                let mut inner = self.query.borrow_mut();
                inner.failed = true;
                inner.finished = true;
                true
            }
        }
    }

    pub fn finished(&self) -> bool {
        self.query.borrow().finished
    }

    pub fn failed(&self) -> bool {
        self.query.borrow().failed
    }

    /// Results produced so far; meaningful mid-iteration, not just
    /// after exhaustion.
    pub fn get_count(&self) -> u64 {
        self.query.borrow().result_count
    }

    pub fn get_bindings_count(&self) -> usize {
        self.query.borrow().binding_values.len()
    }

    pub fn get_binding_value(&self, offset: usize) -> Option<Literal> {
        self.query.borrow().binding_values.get(offset).cloned().flatten()
    }

    pub fn get_binding_name(&self, offset: usize) -> Option<Rc<str>> {
        self.query.borrow().selects.get(offset).map(|v| v.name.clone())
    }

    pub fn get_binding_value_by_name(&self, name: &str) -> Option<Literal> {
        let inner = self.query.borrow();
        inner
            .selects
            .iter()
            .position(|v| &*v.name == name)
            .and_then(|idx| inner.binding_values.get(idx).cloned().flatten())
    }

    /// Snapshot of the current row: parallel vectors of names and
    /// values, owned clones (cheap: `Literal` string payloads are
    /// `Rc<str>`).
    pub fn get_bindings(&self) -> (Vec<Rc<str>>, Vec<Option<Literal>>) {
        let inner = self.query.borrow();
        let names = inner.selects.iter().map(|v| v.name.clone()).collect();
        (names, inner.binding_values.clone())
    }

    /// Explicit release, mirroring the original's `free()`. Equivalent
    /// to dropping `self`.
    pub fn free(self) {}
}
