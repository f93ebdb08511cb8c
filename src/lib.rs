//! A single-threaded RDF query engine core: query object lifecycle,
//! reference-counted result iterators, and a pull-based row-source
//! pipeline (filter, sort, distinct) over triple data supplied by an
//! external store.
//!
//! This crate does not parse any query language and does not match
//! triple patterns against a store; both are external collaborators.
//! What it owns is the query's declared state, the result-iterator
//! contract, and the row-source operators that turn matched triples
//! into ordered, filtered result rows.

/// Comparison-semantics flags shared by the evaluator and the sort
/// row-source.
pub mod compare;
/// Error-handler hooks and the `tracing` bridge.
pub mod diagnostics;
/// Error types and the crate's `Result` alias.
pub mod error;
/// Expression trees and the evaluator.
pub mod expr;
/// Query-language plugin contract and factory registry.
pub mod language;
/// The tagged RDF value type.
pub mod literal;
/// The query object and its owned state.
pub mod query;
/// The reference-counted result iterator.
pub mod query_results;
/// Row representation flowing through the row-source pipeline.
pub mod row;
/// The pull-based row-source operator pipeline.
pub mod rowsource;
/// Triple patterns, sources, and namespace prefixes.
pub mod triple;
/// Registry of named bind variables and their current values.
pub mod variables;

pub use crate::{
    compare::CompareFlags,
    diagnostics::{ErrorHandlers, MessageHandler, Severity},
    error::{Error, Result},
    expr::{CompareOp, EvalResult, Expr},
    language::{LanguageFactory, LanguageRegistry},
    literal::{BoolCoercion, Literal, TypeError},
    query::{Feature, Query, QueryInner, SelectVariable},
    query_results::QueryResults,
    row::Row,
    rowsource::{FilterRowSource, OrderCondition, RowSource, RowSourceHandle, SortRowSource, ValuesRowSource},
    triple::{Prefix, Source, Triple, TriplePart},
    variables::{Variable, VariablesTable},
};
