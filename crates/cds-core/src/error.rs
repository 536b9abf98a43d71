/// Error taxonomy for the mapping and extraction pipelines.
///
/// Fatal-at-mapping variants (`ConfigMissing`, `UnknownTable`, `UnknownProcessor`,
/// `UnknownStrategy`, `EmptyTable`, `BadLine`) terminate the resource mapping that raised them;
/// the run continues with the next mapping. Row-scope variants (`MissingColumn`,
/// `ProcessorFailure`, `BadTimestamp`) are caught by the caller, logged, and the offending row is
/// skipped. `TransportFailure` never aborts the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CdsError {
    #[error("no resource mappings found in config")]
    ConfigMissing,

    #[error("unknown table referenced: {0}")]
    UnknownTable(String),

    #[error("unknown processor referenced: {0}")]
    UnknownProcessor(String),

    #[error("unknown table-load strategy: {0}")]
    UnknownStrategy(String),

    #[error("missing column {column} in row {row_index} of resource type {resource_type}")]
    MissingColumn {
        resource_type: String,
        row_index: usize,
        column: String,
    },

    #[error("processor {processor} failed on row {row_index}: {source}")]
    ProcessorFailure {
        processor: String,
        row_index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("missing or unparseable timestamp column {column} in row {row_index}")]
    BadTimestamp { column: String, row_index: usize },

    #[error("transport failure talking to {url}: {source}")]
    TransportFailure {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("table {0} loaded with zero rows")]
    EmptyTable(String),

    #[error("unrecoverable bad line in table {table}: {detail}")]
    BadLine { table: String, detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
