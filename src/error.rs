//! Errors produced by the query engine core.

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents all the ways a query-engine operation can fail.
///
/// Expression type errors are deliberately not a variant here: they are a
/// separate, non-fatal channel (see [`crate::literal::TypeError`]) that
/// filter contexts collapse to `false` and that never aborts a pipeline.
/// Every variant below corresponds to a construction failure or an engine
/// failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `Query::new` found no factory matching the requested name or URI.
    #[error("no query language matches name {name:?} / uri {uri:?}")]
    UnknownLanguage {
        name: Option<String>,
        uri: Option<String>,
    },

    /// `prepare` called on a query that was already prepared.
    #[error("query is already prepared")]
    AlreadyPrepared,

    /// `execute` called on a query that was already executed.
    #[error("query is already executed")]
    AlreadyExecuted,

    /// `execute` called before `prepare`.
    #[error("query has not been prepared")]
    NotPrepared,

    /// Any operation attempted once the query has entered the `failed` state.
    #[error("operation attempted on a failed query")]
    QueryFailed,

    /// The language factory's `prepare` hook reported failure.
    #[error("language factory failed to prepare query: {0}")]
    LanguagePrepare(String),

    /// The language factory's `execute` hook reported failure.
    #[error("language factory failed to execute query: {0}")]
    LanguageExecute(String),

    /// A row-source's `init` failed.
    #[error("row-source initialization failed: {0}")]
    RowSourceInit(String),

    /// An inner-source failure propagated out of `read_row`/`read_all_rows`.
    /// The caller treats this as fatal for the whole query.
    #[error("row-source pipeline failed")]
    RowSourceFailed,

    /// `set_variable` referenced a name that was never `add_variable`d.
    #[error("variable {0:?} was not added to the query")]
    UnknownVariable(String),

    /// A variable was added after `prepare` locked the variables table.
    #[error("variables table is locked; no further variables may be added after prepare")]
    VariablesTableLocked,

    /// A row-source was asked to perform an operation its handler vtable
    /// does not implement — e.g. the sort row-source only supports
    /// `read_all_rows`, never `read_row`.
    #[error("row-source does not support this operation: {0}")]
    UnsupportedRowSourceOperation(&'static str),
}
