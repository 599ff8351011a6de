//! Boundary error types for the ingest → convert → parse → insert pipeline.
//!
//! Each stage of the pipeline gets its own error enum rather than one
//! catch-all, since the right recovery action differs per stage (spec §7):
//! a [`DecodeError`] abandons the current message but keeps the connection,
//! a [`TemplateError`] may be informational (missing template) rather than
//! fatal, and an [`InsertError`] drives a worker's retry/reconnect loop.

use std::net::SocketAddr;

/// Errors surfaced while reconstructing framed messages from a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message header truncated: need {need} bytes, have {have}")]
    TruncatedHeader { need: usize, have: usize },

    #[error("message body truncated: need {need} bytes, have {have}")]
    TruncatedBody { need: usize, have: usize },

    #[error("declared message length {length} is below the minimum header size")]
    LengthTooShort { length: usize },

    #[error("declared message length {length} exceeds the configured maximum {max}")]
    LengthTooLarge { length: usize, max: usize },

    #[error("lz4 frame error: {0}")]
    Lz4(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("unrecognized framing magic byte {0:#04x}")]
    UnknownFraming(u8),

    #[error("malformed wire format: {0}")]
    Format(String),
}

/// Errors from template learning, refresh and lookup.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template {template_id} references no fields")]
    EmptyDefinition { template_id: u16 },

    #[error("template {template_id} declares {declared} fields but only {parsed} were parsable")]
    FieldCountMismatch {
        template_id: u16,
        declared: usize,
        parsed: usize,
    },

    #[error("no template {template_id} is in force for this session/ODID")]
    MissingTemplate { template_id: u16 },

    #[error("withdraw of template {template_id} ignored: session is UDP-sourced")]
    WithdrawIgnoredOnUdp { template_id: u16 },

    #[error(
        "redefinition of live template {template_id} rejected: session is TCP/TLS/SCTP-sourced and the live version has not been withdrawn"
    )]
    RedefinitionRejected { template_id: u16 },

    #[error("template id {template_id} is below the minimum of 256")]
    InvalidTemplateId { template_id: u16 },

    #[error("options template {template_id} declares a scope field count of 0")]
    InvalidScopeFieldCount { template_id: u16 },
}

/// Errors converting a NetFlow v9 message into IPFIX.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("source record referenced template {template_id} which is unknown to this session")]
    UnknownTemplate { template_id: u16 },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Errors converting a parsed field into its target column representation.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("field ({enterprise}, {id}) could not be converted for column {column}: {reason}")]
    Conversion {
        enterprise: u32,
        id: u16,
        column: String,
        reason: String,
    },
}

/// Errors from schema verification and inserting into a remote column store.
#[derive(Debug, thiserror::Error)]
pub enum InsertError {
    #[error(
        "table \"{table}\" does not exist on {endpoint}; expected schema: {schema_hint}"
    )]
    TableNotFound {
        table: String,
        endpoint: SocketAddr,
        schema_hint: String,
    },

    #[error(
        "schema mismatch on table \"{table}\" at {endpoint}: expected {expected} columns, found {found}; {schema_hint}"
    )]
    SchemaMismatch {
        table: String,
        endpoint: SocketAddr,
        expected: usize,
        found: usize,
        schema_hint: String,
    },

    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: SocketAddr, reason: String },

    #[error("insert of {rows} rows into \"{table}\" at {endpoint} failed: {reason}")]
    Insert {
        table: String,
        endpoint: SocketAddr,
        rows: usize,
        reason: String,
    },

    #[error("all endpoints exhausted without a successful insert after {stop_timeout_secs}s")]
    EndpointsExhausted { stop_timeout_secs: u64 },
}

/// Errors validating a [`crate::config::Config`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one insert endpoint is required")]
    NoEndpoints,

    #[error("at least one column is required")]
    NoColumns,

    #[error("inserter_threads must be at least 1")]
    NoInserterThreads,

    #[error("blocks must be at least 1")]
    NoBlocks,

    #[error("block_insert_threshold must be at least 1")]
    InvalidBlockThreshold,
}

/// Top-level error surfaced by the [`crate::pipeline::Pipeline`] coordinator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("SCTP transport is not supported")]
    SctpUnsupported,

    #[error("inserter worker {worker_id} failed fatally: {source}")]
    WorkerFailed {
        worker_id: usize,
        #[source]
        source: InsertError,
    },
}
