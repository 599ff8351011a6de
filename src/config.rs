//! Static configuration for a collector pipeline instance.
//!
//! `Config` is assembled by the embedding binary (XML parsing, CLI, env vars
//! — all out of scope here, see spec §1 Non-goals) and handed to
//! [`crate::pipeline::Pipeline::new`]. This module only validates the result.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::DataType;

/// Remote column-store endpoint the [`crate::insert::InserterPool`] rotates
/// through on failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: SocketAddr,
}

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

/// Where a column's value is sourced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// A single IPFIX/NetFlow information element, `(enterprise, id)`.
    Element { enterprise: u32, id: u16 },
    /// An ordered list of alternative elements; the first present value
    /// wins, per the spec's `last_identical`-preferred precompute rule.
    Alias(Vec<(u32, u16)>),
    /// The observation domain ID of the message the record arrived in.
    ObservationDomainId,
}

/// One target column: where its value comes from and what it is called at
/// the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Name used when reporting schema mismatches and `CREATE TABLE` hints.
    pub name: String,
    /// Name actually sent to the remote store, if different from `name`.
    pub target_name: Option<String>,
    pub source: ColumnSource,
    /// The type this column is written to the remote store as. When the
    /// source is an [`ColumnSource::Alias`] spanning more than one
    /// underlying wire type, this should be `unify_type`'s result over
    /// every candidate's natural type (spec §4.5).
    pub target_type: DataType,
    pub nullable: bool,
    /// Set for reverse-direction biflow columns (spec §4.4).
    pub reverse: bool,
}

impl Column {
    /// The name used on the wire to the remote store.
    pub fn wire_name(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.name)
    }
}

/// Top-level pipeline configuration (spec §6.1).
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: Vec<Endpoint>,
    pub table_name: String,
    pub columns: Vec<Column>,
    pub inserter_threads: usize,
    pub blocks: usize,
    pub block_insert_threshold: usize,
    pub flush_interval: Duration,
    pub stop_timeout: Duration,
    pub nonblocking: bool,
    pub biflow_autoignore: bool,
    /// Emit two rows per biflow record — a forward-only and a reverse-only
    /// projection — instead of one wide row carrying both directions
    /// (spec §6.1).
    pub split_biflow: bool,
    pub max_template_fields: usize,
    pub max_error_sample_size: usize,
    /// How long a withdrawn or superseded template version, and the
    /// snapshot chain behind it, remains reachable before
    /// [`crate::template::TemplateStore::collect_garbage`] reclaims it
    /// (spec §4.2).
    pub template_lifetime: Duration,
}

impl Config {
    /// Validates that this configuration can drive a working pipeline.
    ///
    /// This is deliberately conservative: a malformed config should fail
    /// loudly at startup rather than panic deep inside a worker thread.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.columns.is_empty() {
            return Err(ConfigError::NoColumns);
        }
        if self.inserter_threads == 0 {
            return Err(ConfigError::NoInserterThreads);
        }
        if self.blocks == 0 {
            return Err(ConfigError::NoBlocks);
        }
        if self.block_insert_threshold == 0 {
            return Err(ConfigError::InvalidBlockThreshold);
        }
        Ok(())
    }
}
