//! The pull-based row-source pipeline: a polymorphic operator contract,
//! the wrapper that enforces its lifecycle, and the three concrete
//! operators this core ships — `filter`, `sort` (optionally distinct),
//! and `values` (an in-memory leaf standing in for the triple-store
//! matcher, which is an external collaborator this crate does not
//! implement).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use crate::Result;
use crate::compare::CompareFlags;
use crate::error::Error;
use crate::expr::{Expr, evaluate};
use crate::literal::{self, Literal, as_boolean};
use crate::query::QueryInner;
use crate::row::Row;

/// The closed capability set a row-source implements. A default
/// `read_all_rows` routes through repeated `read_row` for
/// operators that don't inherently batch; `sort` is the inverse case
/// and overrides `read_all_rows` while refusing `read_row` outright.
pub trait RowSource {
    /// One-time initialization; may fail.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called exactly once before the first read. Returns the declared
    /// output arity (`size`).
    fn ensure_variables(&mut self) -> Result<usize>;

    /// Pull one row, or `None` at end of stream.
    fn read_row(&mut self) -> Result<Option<Row>>;

    /// Materialize every remaining row. The default walks `read_row`
    /// until exhaustion; operators that inherently batch (sort)
    /// override this instead of implementing `read_row`.
    fn read_all_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.read_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Release the inner source and private state. Called exactly once
    /// at teardown by [`RowSourceHandle`]; implementations need not
    /// guard against repeat calls themselves.
    fn finish(&mut self) {}

    /// Upward link to the owning query.
    fn query(&self) -> Rc<RefCell<QueryInner>>;
}

/// Enforces the framework's lifecycle guarantees around a boxed
/// [`RowSource`]: `init` before any other call, `ensure_variables`
/// exactly once before the first read, `finish` exactly once at
/// teardown. Also unifies the `read_row`/`read_all_rows` split so a
/// caller can always ask for "the next row" regardless of which path
/// the wrapped operator natively supports.
pub struct RowSourceHandle {
    inner: Box<dyn RowSource>,
    initialized: bool,
    variables_ensured: bool,
    finished: bool,
    size: usize,
    /// Populated once a batch-only operator (sort) has materialized;
    /// drained one row at a time by `next_row`.
    batch: Option<std::vec::IntoIter<Row>>,
}

impl RowSourceHandle {
    pub fn new(inner: Box<dyn RowSource>) -> Self {
        Self {
            inner,
            initialized: false,
            variables_ensured: false,
            finished: false,
            size: 0,
            batch: None,
        }
    }

    fn ensure_init(&mut self) -> Result<()> {
        if !self.initialized {
            self.inner.init()?;
            self.initialized = true;
        }
        Ok(())
    }

    /// Populate and return `size`, running `init` first if needed.
    /// Idempotent: a second call is a no-op beyond returning the
    /// cached size.
    pub fn ensure_variables(&mut self) -> Result<usize> {
        self.ensure_init()?;
        if !self.variables_ensured {
            self.size = self.inner.ensure_variables()?;
            self.variables_ensured = true;
        }
        Ok(self.size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Pull the next row, whichever path the wrapped operator supports.
    ///
    /// Binds the variables table from the row before returning it: the
    /// enclosing operator (a filter's or sort's expression evaluator)
    /// reads variables by name out of the table, not out of the row
    /// it was just handed, so the table must reflect this row before
    /// the caller evaluates anything against it — mirroring the
    /// original's `rasqal_rowsource_read_row` calling
    /// `rasqal_row_bind_variables` ahead of the wrapping operator's own
    /// evaluation.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        self.ensure_variables()?;
        let row = if let Some(batch) = &mut self.batch {
            batch.next()
        } else {
            match self.inner.read_row() {
                Ok(row) => row,
                Err(Error::UnsupportedRowSourceOperation(_)) => {
                    let mut iter = self.inner.read_all_rows()?.into_iter();
                    let first = iter.next();
                    self.batch = Some(iter);
                    first
                }
                Err(e) => return Err(e),
            }
        };
        if let Some(row) = &row {
            self.bind_variables(row);
        }
        Ok(row)
    }

    /// Materialize every remaining row at once, binding the variables
    /// table from each row in turn as it's produced (see `next_row`).
    pub fn read_all_rows(&mut self) -> Result<Vec<Row>> {
        self.ensure_variables()?;
        let rows = if let Some(batch) = self.batch.take() {
            batch.collect()
        } else {
            self.inner.read_all_rows()?
        };
        for row in &rows {
            self.bind_variables(row);
        }
        Ok(rows)
    }

    fn bind_variables(&self, row: &Row) {
        let query = self.inner.query();
        let q = query.borrow();
        for (i, value) in row.values.iter().enumerate() {
            q.variables.set_value(i, value.clone());
        }
    }

    pub fn finish(&mut self) {
        if !self.finished {
            self.inner.finish();
            self.finished = true;
        }
    }

    pub fn query(&self) -> Rc<RefCell<QueryInner>> {
        self.inner.query()
    }
}

impl Drop for RowSourceHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Upgrade a row-source's back-reference to its owning query.
///
/// Row-sources hold a `Weak` rather than an `Rc` here: the query's
/// `root` slot owns the whole row-source chain, so a strong
/// back-reference would form an `Rc` cycle and the query would never
/// be freed. Existence of the row-source implies the query is alive
/// (nothing drives `read_row`/`read_all_rows` except code holding a
/// strong reference to the query), so the upgrade is expected to
/// always succeed.
fn upgrade(query: &Weak<RefCell<QueryInner>>) -> Rc<RefCell<QueryInner>> {
    query
        .upgrade()
        .expect("row-source outlived its owning query")
}

/// An in-memory leaf row-source standing in for the triple-store
/// matcher (out of scope for this core): yields a fixed, pre-built
/// sequence of rows under a fixed variable schema.
pub struct ValuesRowSource {
    query: Weak<RefCell<QueryInner>>,
    size: usize,
    rows: std::vec::IntoIter<Row>,
}

impl ValuesRowSource {
    pub fn new(query: Rc<RefCell<QueryInner>>, variable_names: Vec<Rc<str>>, rows: Vec<Row>) -> Self {
        let size = variable_names.len();
        Self {
            query: Rc::downgrade(&query),
            size,
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for ValuesRowSource {
    fn ensure_variables(&mut self) -> Result<usize> {
        Ok(self.size)
    }

    fn read_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }

    fn query(&self) -> Rc<RefCell<QueryInner>> {
        upgrade(&self.query)
    }
}

/// Wraps an inner source and an expression; yields only the rows for
/// which the expression is true.
pub struct FilterRowSource {
    query: Weak<RefCell<QueryInner>>,
    inner: RowSourceHandle,
    expr: Expr,
    offset: u64,
}

impl FilterRowSource {
    pub fn new(query: Rc<RefCell<QueryInner>>, inner: RowSourceHandle, expr: Expr) -> Self {
        Self {
            query: Rc::downgrade(&query),
            inner,
            expr,
            offset: 0,
        }
    }
}

impl RowSource for FilterRowSource {
    fn ensure_variables(&mut self) -> Result<usize> {
        self.inner.ensure_variables()
    }

    fn read_row(&mut self) -> Result<Option<Row>> {
        let query = upgrade(&self.query);
        loop {
            let mut row = match self.inner.next_row()? {
                Some(row) => row,
                None => return Ok(None),
            };

            let accepted = {
                let q = query.borrow();
                match evaluate(&q.variables, &self.expr, q.compare_flags) {
                    Ok(lit) => as_boolean(&lit).accepts(),
                    Err(e) => {
                        q.error_handlers.warning(&format!("filter expression: {e}"));
                        false
                    }
                }
            };

            if !accepted {
                continue;
            }

            // Refresh every slot from the variables table: the
            // evaluator may have narrowed bindings not yet present on
            // the inbound row.
            let q = query.borrow();
            for (i, slot) in row.values.iter_mut().enumerate() {
                *slot = q.variables.get_value(i);
            }
            drop(q);

            row.offset = self.offset;
            self.offset += 1;
            return Ok(Some(row));
        }
    }

    fn finish(&mut self) {
        self.inner.finish();
    }

    fn query(&self) -> Rc<RefCell<QueryInner>> {
        upgrade(&self.query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortState {
    Unprocessed,
    Processing,
    Exhausted,
}

/// One `ORDER BY`-style condition: an expression plus sort direction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCondition {
    pub expr: Expr,
    pub ascending: bool,
}

impl OrderCondition {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: false,
        }
    }
}

/// Materializes the inner source, ordered by a composite key computed
/// from `order_conditions`, optionally deduplicating.
/// Pass-through mode (no order conditions) delegates straight to
/// the inner source's `read_all_rows`. Only reachable via
/// `read_all_rows`; `read_row` always fails.
pub struct SortRowSource {
    query: Weak<RefCell<QueryInner>>,
    inner: RowSourceHandle,
    order_conditions: Vec<OrderCondition>,
    order_size: i64,
    state: SortState,
}

impl SortRowSource {
    pub fn new(
        query: Rc<RefCell<QueryInner>>,
        inner: RowSourceHandle,
        order_conditions: Vec<OrderCondition>,
    ) -> Self {
        Self {
            query: Rc::downgrade(&query),
            inner,
            order_conditions,
            order_size: 0,
            state: SortState::Unprocessed,
        }
    }

    fn process(&mut self) -> Result<Vec<Row>> {
        let query = upgrade(&self.query);
        let distinct = query.borrow().distinct;
        let mut buffer: Vec<Row> = Vec::new();
        let mut offset = 0u64;

        while let Some(mut row) = self.inner.next_row()? {
            row.set_order_size(self.order_conditions.len());
            {
                let q = query.borrow();
                for condition in &self.order_conditions {
                    let key = match evaluate(&q.variables, &condition.expr, q.compare_flags) {
                        Ok(lit) => lit,
                        Err(e) => {
                            q.error_handlers
                                .warning(&format!("order condition: {e}; treating as false"));
                            Literal::Boolean(false)
                        }
                    };
                    row.order_values.push(key);
                }
            }
            row.offset = offset;
            offset += 1;

            if distinct {
                let flags = query.borrow().compare_flags;
                let is_duplicate = buffer
                    .iter()
                    .any(|existing| order_keys_equal(&existing.order_values, &row.order_values, flags));
                if is_duplicate {
                    // Row is dropped: the first-inserted row under this
                    // key already won.
                    continue;
                }
            }

            buffer.push(row);
        }

        let flags = query.borrow().compare_flags;
        let ascending: Vec<bool> = self.order_conditions.iter().map(|c| c.ascending).collect();
        buffer.sort_by(|a, b| {
            let ord = compare_order_keys(&a.order_values, &b.order_values, &ascending, flags);
            if ord == Ordering::Equal {
                a.offset.cmp(&b.offset)
            } else {
                ord
            }
        });

        Ok(buffer)
    }
}

impl RowSource for SortRowSource {
    fn init(&mut self) -> Result<()> {
        self.order_size = if self.order_conditions.is_empty() {
            -1
        } else {
            self.order_conditions.len() as i64
        };
        Ok(())
    }

    fn ensure_variables(&mut self) -> Result<usize> {
        self.inner.ensure_variables()
    }

    fn read_row(&mut self) -> Result<Option<Row>> {
        Err(Error::UnsupportedRowSourceOperation(
            "sort row-source only supports read_all_rows",
        ))
    }

    fn read_all_rows(&mut self) -> Result<Vec<Row>> {
        if self.state == SortState::Exhausted {
            return Ok(Vec::new());
        }

        if self.order_size <= 0 {
            self.state = SortState::Exhausted;
            return self.inner.read_all_rows();
        }

        self.state = SortState::Processing;
        let rows = self.process()?;
        self.state = SortState::Exhausted;
        Ok(rows)
    }

    fn finish(&mut self) {
        self.inner.finish();
    }

    fn query(&self) -> Rc<RefCell<QueryInner>> {
        upgrade(&self.query)
    }
}

fn order_keys_equal(a: &[Literal], b: &[Literal], flags: CompareFlags) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| literal::compare(x, y, flags) == Ordering::Equal)
}

fn compare_order_keys(a: &[Literal], b: &[Literal], ascending: &[bool], flags: CompareFlags) -> Ordering {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let ord = literal::compare(x, y, flags);
        if ord != Ordering::Equal {
            return if ascending.get(i).copied().unwrap_or(true) {
                ord
            } else {
                ord.reverse()
            };
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CompareOp;
    use crate::query::QueryInner;

    fn test_query() -> Rc<RefCell<QueryInner>> {
        Rc::new(RefCell::new(QueryInner::for_tests()))
    }

    fn row_of(values: Vec<Literal>) -> Row {
        Row {
            values: values.into_iter().map(Some).collect(),
            order_values: Vec::new(),
            offset: 0,
        }
    }

    fn values_handle(query: &Rc<RefCell<QueryInner>>, rows: Vec<Row>) -> RowSourceHandle {
        RowSourceHandle::new(Box::new(ValuesRowSource::new(
            query.clone(),
            vec!["x".into()],
            rows,
        )))
    }

    #[test]
    fn s1_filter_pass_through() {
        let query = test_query();
        {
            let mut q = query.borrow_mut();
            q.variables_mut().add_variable("x").unwrap();
        }
        let rows = vec![
            row_of(vec![Literal::Integer(1)]),
            row_of(vec![Literal::Integer(2)]),
            row_of(vec![Literal::Integer(3)]),
        ];
        let inner = values_handle(&query, rows);
        let expr = Expr::compare(CompareOp::Gt, Expr::var("x"), Expr::literal(Literal::Integer(1)));
        let mut filter = RowSourceHandle::new(Box::new(FilterRowSource::new(query.clone(), inner, expr)));

        let out = filter.read_all_rows().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].values[0], Some(Literal::Integer(2)));
        assert_eq!(out[0].offset, 0);
        assert_eq!(out[1].values[0], Some(Literal::Integer(3)));
        assert_eq!(out[1].offset, 1);
    }

    #[test]
    fn s2_filter_type_error_yields_empty() {
        let query = test_query();
        {
            let mut q = query.borrow_mut();
            q.variables_mut().add_variable("x").unwrap();
        }
        let rows = vec![row_of(vec![Literal::String {
            value: "abc".into(),
            language: None,
            datatype: None,
        }])];
        let inner = values_handle(&query, rows);
        // Comparing a string to an integer isn't a type error under this
        // crate's total comparator — exercise the evaluator's actual
        // type-error path instead: referencing an unbound variable
        // inside the filter expression.
        let expr = Expr::compare(
            CompareOp::Gt,
            Expr::var("unbound"),
            Expr::literal(Literal::Integer(1)),
        );
        let mut filter = RowSourceHandle::new(Box::new(FilterRowSource::new(query.clone(), inner, expr)));
        let out = filter.read_all_rows().unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn s3_sort_ascending() {
        let query = test_query();
        let rows = vec![
            row_of(vec![Literal::Integer(3)]),
            row_of(vec![Literal::Integer(1)]),
            row_of(vec![Literal::Integer(2)]),
        ];
        let inner = values_handle(&query, rows);
        let order = vec![OrderCondition::asc(Expr::var("x"))];
        {
            let mut q = query.borrow_mut();
            q.variables_mut().add_variable("x").unwrap();
        }
        let mut sort = RowSourceHandle::new(Box::new(SortRowSource::new(query.clone(), inner, order)));
        let out = sort.read_all_rows().unwrap();
        let values: Vec<_> = out.iter().map(|r| r.values[0].clone()).collect();
        assert_eq!(
            values,
            vec![
                Some(Literal::Integer(1)),
                Some(Literal::Integer(2)),
                Some(Literal::Integer(3)),
            ]
        );
    }

    #[test]
    fn s4_sort_stability_on_ties() {
        let query = test_query();
        {
            let mut q = query.borrow_mut();
            q.variables_mut().add_variable("x").unwrap();
        }
        // order key is ?x for both rows; the evaluator reads ?x, so we
        // drive two rows with equal ?x but different secondary payload
        // by encoding the payload in the row itself via a second slot
        // is unnecessary here — the row's first slot carries ?x and we
        // assert on row identity via a marker embedded in a second
        // literal value smuggled through Decimal for readability.
        let a = Row {
            values: vec![Some(Literal::Integer(1)), Some(Literal::String {
                value: "a".into(),
                language: None,
                datatype: None,
            })],
            order_values: Vec::new(),
            offset: 0,
        };
        let b = Row {
            values: vec![Some(Literal::Integer(1)), Some(Literal::String {
                value: "b".into(),
                language: None,
                datatype: None,
            })],
            order_values: Vec::new(),
            offset: 0,
        };
        let inner = RowSourceHandle::new(Box::new(ValuesRowSource::new(
            query.clone(),
            vec!["x".into(), "y".into()],
            vec![a, b],
        )));
        let order = vec![OrderCondition::asc(Expr::var("x"))];
        let mut sort = RowSourceHandle::new(Box::new(SortRowSource::new(query.clone(), inner, order)));
        let out = sort.read_all_rows().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].values[1],
            Some(Literal::String {
                value: "a".into(),
                language: None,
                datatype: None
            })
        );
        assert_eq!(
            out[1].values[1],
            Some(Literal::String {
                value: "b".into(),
                language: None,
                datatype: None
            })
        );
    }

    #[test]
    fn s5_distinct_collapses_duplicates() {
        let query = test_query();
        {
            let mut q = query.borrow_mut();
            q.variables_mut().add_variable("x").unwrap();
            q.set_distinct(true);
        }
        let rows = vec![
            row_of(vec![Literal::Integer(1)]),
            row_of(vec![Literal::Integer(1)]),
        ];
        let inner = values_handle(&query, rows);
        let order = vec![OrderCondition::asc(Expr::var("x"))];
        let mut sort = RowSourceHandle::new(Box::new(SortRowSource::new(query.clone(), inner, order)));
        let out = sort.read_all_rows().unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn sort_is_idempotent_after_exhaustion() {
        let query = test_query();
        {
            let mut q = query.borrow_mut();
            q.variables_mut().add_variable("x").unwrap();
        }
        let rows = vec![row_of(vec![Literal::Integer(1)])];
        let inner = values_handle(&query, rows);
        let order = vec![OrderCondition::asc(Expr::var("x"))];
        let mut sort = RowSourceHandle::new(Box::new(SortRowSource::new(query.clone(), inner, order)));
        let first = sort.read_all_rows().unwrap();
        assert_eq!(first.len(), 1);
        let second = sort.read_all_rows().unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn sort_read_row_is_unsupported_directly_on_the_operator() {
        let query = test_query();
        let inner = values_handle(&query, vec![]);
        let mut sort = SortRowSource::new(query.clone(), inner, vec![OrderCondition::asc(Expr::var("x"))]);
        assert!(matches!(
            sort.read_row(),
            Err(Error::UnsupportedRowSourceOperation(_))
        ));
    }

    #[test]
    fn handle_unifies_batch_only_operator_through_next_row() {
        let query = test_query();
        {
            let mut q = query.borrow_mut();
            q.variables_mut().add_variable("x").unwrap();
        }
        let rows = vec![
            row_of(vec![Literal::Integer(2)]),
            row_of(vec![Literal::Integer(1)]),
        ];
        let inner = values_handle(&query, rows);
        let order = vec![OrderCondition::asc(Expr::var("x"))];
        let mut sort = RowSourceHandle::new(Box::new(SortRowSource::new(query.clone(), inner, order)));
        let first = sort.next_row().unwrap().unwrap();
        assert_eq!(first.values[0], Some(Literal::Integer(1)));
        let second = sort.next_row().unwrap().unwrap();
        assert_eq!(second.values[0], Some(Literal::Integer(2)));
        assert!(sort.next_row().unwrap().is_none());
    }
}
