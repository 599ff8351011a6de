//! The single producer coordinating ingest, template/record state, and
//! Block hand-off to the inserter pool (spec §4.8).
//!
//! Directly grounded on the original collector's `Plugin` class:
//! `process_ipfix_msg`/`process_session_msg`/`process_record`/
//! `extract_values` map onto [`Pipeline::on_message`],
//! [`Pipeline::on_session_event`], [`Pipeline::process_record`] and
//! [`Pipeline::extract_values`] below, including the threshold/time-based
//! flush and the once-per-tick stats print and worker-error poll.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::block::{Block, BlockPool};
use crate::config::{Column, Config};
use crate::error::{PipelineError, RecordError};
use crate::insert::InserterPool;
use crate::record::{ParsedRecord, RecordParserCache};
use crate::session::{Protocol, Session};
use crate::stats::Stats;
use crate::template::{TemplateDefinition, UpsertOutcome};
use crate::template_events::TemplateProtocol;
use crate::types::TargetValue;
use crate::variable_versions::data_number::FieldValue as WireFieldValue;

/// How often [`Pipeline::on_message`] re-checks whether it is time to sweep
/// retired template versions, matching the once-per-second cadence the
/// original applies to its stats tick (spec §4.8 step 5).
const GC_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const NFV9_VERSION: u16 = 9;

/// A session lifecycle transition, mirroring the original's
/// `IPX_MSG_SESSION_OPEN`/`IPX_MSG_SESSION_CLOSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Open,
    Close,
}

/// One already-decoded data record ready to be parsed against the
/// in-force template: its originating (session, ODID, template) plus its
/// field values in template field order.
pub struct IncomingRecord {
    pub peer_addr: SocketAddr,
    pub observation_domain_id: u32,
    pub template_id: u16,
    pub field_values: Vec<WireFieldValue>,
}

/// The pipeline coordinator. Owns every session's template state, the
/// per-(session, ODID) record parser cache, the current in-fill Block,
/// and the inserter pool it eventually hands full Blocks to.
pub struct Pipeline {
    columns: Vec<Column>,
    block_insert_threshold: usize,
    flush_interval: Duration,
    nonblocking: bool,
    biflow_autoignore: bool,
    split_biflow: bool,
    template_lifetime: Duration,

    sessions: HashMap<SocketAddr, Session>,
    parser_caches: HashMap<(SocketAddr, u32), RecordParserCache>,

    inserter: InserterPool,
    current_block: Option<Block>,
    last_insert_time: Instant,
    last_gc_time: Instant,
    stats: Stats,
}

impl Pipeline {
    /// Builds a pipeline around an already-spawned inserter pool, sharing
    /// its Block pool as the producer side of the queue pair.
    ///
    /// `config` is expected to have already passed [`Config::validate`];
    /// the caller needs a valid config to build `inserter` in the first
    /// place, so this constructor does not re-check it.
    pub fn new(config: &Config, inserter: InserterPool) -> Self {
        Self {
            columns: config.columns.clone(),
            block_insert_threshold: config.block_insert_threshold,
            flush_interval: config.flush_interval,
            nonblocking: config.nonblocking,
            biflow_autoignore: config.biflow_autoignore,
            split_biflow: config.split_biflow,
            template_lifetime: config.template_lifetime,
            sessions: HashMap::new(),
            parser_caches: HashMap::new(),
            inserter,
            current_block: None,
            last_insert_time: Instant::now(),
            last_gc_time: Instant::now(),
            stats: Stats::new(),
        }
    }

    pub fn block_pool(&self) -> &BlockPool {
        &self.inserter.block_pool
    }

    /// Registers or tears down a session (spec §4.8 step 2).
    pub fn on_session_event(
        &mut self,
        peer_addr: SocketAddr,
        protocol: Protocol,
        template_protocol: TemplateProtocol,
        event: SessionEvent,
    ) {
        match event {
            SessionEvent::Open => {
                self.sessions
                    .entry(peer_addr)
                    .or_insert_with(|| Session::new(peer_addr, protocol, template_protocol));
            }
            SessionEvent::Close => {
                self.sessions.remove(&peer_addr);
                self.parser_caches.retain(|(addr, _), _| *addr != peer_addr);
            }
        }
    }

    /// Learns or redefines a template for (session, ODID), invalidating
    /// the cached parser on a genuine redefinition (spec §4.2/§4.4).
    pub fn on_template(
        &mut self,
        peer_addr: SocketAddr,
        observation_domain_id: u32,
        template_id: u16,
        fields: Vec<crate::template::TemplateFieldDef>,
        scope_field_count: usize,
    ) -> Result<UpsertOutcome, PipelineError> {
        self.on_template_checked(
            peer_addr,
            observation_domain_id,
            template_id,
            fields,
            scope_field_count,
            scope_field_count > 0,
        )
    }

    /// Like [`Self::on_template`], but carries the wire's own claim of
    /// whether this came off an Options Template Set (spec §3 template
    /// invariants).
    pub fn on_template_checked(
        &mut self,
        peer_addr: SocketAddr,
        observation_domain_id: u32,
        template_id: u16,
        fields: Vec<crate::template::TemplateFieldDef>,
        scope_field_count: usize,
        is_options_template: bool,
    ) -> Result<UpsertOutcome, PipelineError> {
        let session = self
            .sessions
            .entry(peer_addr)
            .or_insert_with(|| Session::new(peer_addr, Protocol::Udp, TemplateProtocol::Ipfix));
        let scope = session.odid_scope(observation_domain_id);
        let outcome = scope.templates.upsert_template_checked(
            template_id,
            fields,
            scope_field_count,
            is_options_template,
        )?;
        if outcome == UpsertOutcome::Redefined {
            if let Some(cache) = self.parser_caches.get_mut(&(peer_addr, observation_domain_id)) {
                cache.invalidate(template_id);
            }
        }
        Ok(outcome)
    }

    /// Parses one complete raw message, as handed back by
    /// `decode::MessageDecoder::next_message`, and drives it through
    /// session/template/data handling in one call (spec §4.8 step 1): opens
    /// the session if this is its first message, walks the message's Sets
    /// via [`crate::ingest::parse_sets`], applies Template/Withdraw Sets
    /// immediately, decodes Data Sets against their in-force template, and
    /// finally hands the batch to [`Self::on_message`].
    pub fn on_raw_message(
        &mut self,
        peer_addr: SocketAddr,
        protocol: Protocol,
        template_protocol: TemplateProtocol,
        bytes: &[u8],
    ) -> Result<(), PipelineError> {
        self.on_session_event(peer_addr, protocol, template_protocol, SessionEvent::Open);

        let (header, body) = crate::ingest::parse_header(bytes)?;
        let sets = crate::ingest::parse_sets(body, header.version)?;

        let mut records = Vec::new();
        for set in sets {
            match set {
                crate::ingest::RawSet::Template(t) => {
                    self.on_template_checked(
                        peer_addr,
                        header.observation_domain_id,
                        t.template_id,
                        t.fields,
                        t.scope_field_count,
                        t.is_options_template,
                    )?;
                }
                crate::ingest::RawSet::Withdraw(template_id) => {
                    self.on_withdraw_template(peer_addr, header.observation_domain_id, template_id);
                }
                crate::ingest::RawSet::Data { set_id, body } => {
                    let definition = {
                        let session = self
                            .sessions
                            .get_mut(&peer_addr)
                            .expect("session opened above");
                        let scope = session.odid_scope(header.observation_domain_id);
                        scope
                            .templates
                            .observe_time(Instant::now(), scope.emitted_record_count);
                        scope.templates.lookup(set_id).map(|v| v.definition.clone())
                    };
                    let Some(definition) = definition else {
                        // No template is in force yet for this set id; the
                        // `MissingTemplate` hook already fired inside
                        // `lookup`, so just drop this Data Set.
                        continue;
                    };
                    let mut decoded = crate::ingest::decode_data_records(body, &definition.fields)?;
                    if header.version == NFV9_VERSION {
                        // The template's FIRST_SWITCHED/LAST_SWITCHED fields
                        // were already retagged onto their IPFIX element ids
                        // when the template was parsed; now turn the
                        // sysUptime-relative values those fields carry into
                        // absolute milliseconds.
                        for record in &mut decoded {
                            crate::convert::convert_v9_record_timestamps(
                                &definition.fields,
                                record,
                                header.export_time_secs,
                                header.sys_up_time_ms,
                            );
                        }
                    }
                    records.extend(decoded.into_iter().map(|field_values| IncomingRecord {
                        peer_addr,
                        observation_domain_id: header.observation_domain_id,
                        template_id: set_id,
                        field_values,
                    }));
                }
            }
        }

        self.on_message(peer_addr, protocol, records)
    }

    /// Withdraws a template for (session, ODID), invalidating the cached
    /// parser once the store actually removes it. A UDP-sourced session can
    /// never truly withdraw (spec §9 Open Question 2); that case is not an
    /// error here, just a no-op, since a withdraw Set arriving over UDP is
    /// itself unusual but not malformed.
    pub fn on_withdraw_template(
        &mut self,
        peer_addr: SocketAddr,
        observation_domain_id: u32,
        template_id: u16,
    ) {
        let Some(session) = self.sessions.get_mut(&peer_addr) else {
            return;
        };
        let scope = session.odid_scope(observation_domain_id);
        match scope.templates.withdraw(template_id) {
            Ok(()) => {
                if let Some(cache) = self
                    .parser_caches
                    .get_mut(&(peer_addr, observation_domain_id))
                {
                    cache.invalidate(template_id);
                }
            }
            Err(crate::error::TemplateError::WithdrawIgnoredOnUdp { .. }) => {}
            Err(e) => {
                warn!(template_id, error = %e, "template withdrawal failed");
            }
        }
    }

    /// Processes one decoded IPFIX/NetFlow v9 message's worth of data
    /// records. `records` must already be attributed to a single
    /// (session, protocol) pair; SCTP is rejected up front (spec §4.8 step
    /// 3, §9 Open Question 3).
    pub fn on_message(
        &mut self,
        peer_addr: SocketAddr,
        protocol: Protocol,
        records: Vec<IncomingRecord>,
    ) -> Result<(), PipelineError> {
        if protocol == Protocol::Sctp {
            return Err(PipelineError::SctpUnsupported);
        }

        let record_count = records.len() as u64;
        let mut rows_written = 0u64;
        let mut rows_dropped = 0u64;

        for record in records {
            match self.process_record(peer_addr, &record) {
                Ok((written, dropped)) => {
                    rows_written += written;
                    rows_dropped += dropped;
                }
                Err(RecordError::Conversion { column, reason, .. }) => {
                    warn!(%column, %reason, "field conversion failed, row written with null");
                    rows_written += 1;
                }
            }
        }

        self.stats.add_recs(record_count);
        self.stats.add_rows(rows_written);
        if rows_dropped > 0 {
            // Single summary line per spec §7 ("Pool exhaustion ... a single
            // log entry"), not one per dropped row.
            warn!(rows_dropped, "avail pool exhausted under nonblocking mode");
            self.stats.add_dropped(rows_dropped);
        }

        self.flush_if_due();
        self.maybe_collect_garbage();
        self.stats.tick(
            Instant::now(),
            self.block_pool().avail.len(),
            self.block_pool().filled.len(),
        );
        self.poll_worker_errors()?;
        Ok(())
    }

    /// Sweeps every session's template stores for retired versions past
    /// `template_lifetime`, at most once per [`GC_CHECK_INTERVAL`] (spec
    /// §4.2 `collect_garbage`, §4.8 step 5).
    fn maybe_collect_garbage(&mut self) {
        if self.last_gc_time.elapsed() < GC_CHECK_INTERVAL {
            return;
        }
        self.last_gc_time = Instant::now();
        let lifetime = self.template_lifetime;
        for session in self.sessions.values_mut() {
            for scope in session.odid_scopes_mut() {
                scope.templates.collect_garbage(Duration::default(), lifetime);
            }
        }
    }

    /// Parses one record against its template and appends the resulting
    /// row(s) to the current Block, obtaining a fresh Block first if
    /// needed (spec §4.8 step 3, `extract_values`/`process_record` in the
    /// original). When `split_biflow` is set and the record is a biflow
    /// record, this appends two rows (spec §6.1). Returns
    /// `(rows_written, rows_dropped)`; under `nonblocking=true` with the
    /// pool exhausted, undelivered rows are counted as dropped rather than
    /// silently discarded (spec §4.7 "Non-blocking producer mode", §8
    /// property 9).
    fn process_record(
        &mut self,
        peer_addr: SocketAddr,
        record: &IncomingRecord,
    ) -> Result<(u64, u64), RecordError> {
        let rows = self.parse_record(peer_addr, record)?;
        let mut written = 0u64;
        let mut dropped = 0u64;
        for row in rows {
            self.ensure_current_block();
            match self.current_block.as_mut() {
                Some(block) => {
                    block.push(row);
                    written += 1;
                }
                None => dropped += 1,
            }
        }
        Ok((written, dropped))
    }

    fn parse_record(
        &mut self,
        peer_addr: SocketAddr,
        record: &IncomingRecord,
    ) -> Result<Vec<ParsedRecord>, RecordError> {
        let session = self.sessions.entry(peer_addr).or_insert_with(|| {
            Session::new(peer_addr, Protocol::Udp, TemplateProtocol::Ipfix)
        });
        let scope = session.odid_scope(record.observation_domain_id);
        scope.emitted_record_count += 1;
        scope
            .templates
            .observe_time(Instant::now(), scope.emitted_record_count);

        let template_version = scope
            .templates
            .lookup(record.template_id)
            .ok_or(crate::error::TemplateError::MissingTemplate {
                template_id: record.template_id,
            })
            .map_err(|e| RecordError::Conversion {
                enterprise: 0,
                id: 0,
                column: "<template>".to_string(),
                reason: e.to_string(),
            })?;
        let definition: std::sync::Arc<TemplateDefinition> = template_version.definition.clone();
        let version = template_version.version;

        let cache = self
            .parser_caches
            .entry((peer_addr, record.observation_domain_id))
            .or_default();
        let columns = &self.columns;
        let biflow_autoignore = self.biflow_autoignore;
        let split_biflow = self.split_biflow;
        let parser = cache
            .get_or_build(
                record.template_id,
                &definition,
                version,
                columns,
                biflow_autoignore,
                split_biflow,
            )
            .map_err(|e| RecordError::Conversion {
                enterprise: 0,
                id: 0,
                column: "<template>".to_string(),
                reason: e.to_string(),
            })?;

        parser.parse_record_rows(columns, &record.field_values, record.observation_domain_id)
    }

    fn ensure_current_block(&mut self) {
        if self.current_block.is_none() {
            let block = if self.nonblocking {
                match self.block_pool().avail.try_get() {
                    Some(crate::block::QueueItem::Item(block)) => Some(block),
                    _ => None,
                }
            } else {
                match self.block_pool().avail.get() {
                    crate::block::QueueItem::Item(block) => Some(block),
                    crate::block::QueueItem::Stop => None,
                }
            };
            self.current_block = block;
        }
    }

    /// Moves the current Block to `filled` once it is non-empty and
    /// either past the row threshold or the flush interval has elapsed
    /// (spec §4.8 step 4).
    fn flush_if_due(&mut self) {
        let Some(block) = &self.current_block else {
            return;
        };
        if block.is_empty() {
            return;
        }
        let threshold_reached = block.len() >= self.block_insert_threshold;
        let timeout_reached = self.last_insert_time.elapsed() >= self.flush_interval;
        if threshold_reached || timeout_reached {
            if let Some(block) = self.current_block.take() {
                self.block_pool().filled.put(block);
                self.last_insert_time = Instant::now();
            }
        }
    }

    fn poll_worker_errors(&mut self) -> Result<(), PipelineError> {
        for (worker_id, err) in self.inserter.poll_errors() {
            error!(worker_id, error = %err, "inserter worker failed fatally");
            return Err(PipelineError::WorkerFailed { worker_id, source: err });
        }
        Ok(())
    }

    /// Drains the current Block (if non-empty) to `filled`, signals every
    /// worker to stop, and blocks until they have all joined (spec §4.8,
    /// "bounded-drain shutdown"). Rows still in flight past `stop_timeout`
    /// are abandoned by the worker itself, which reports that via
    /// `InsertError::EndpointsExhausted` on its next `poll_errors` call.
    pub fn shutdown(&mut self) {
        if let Some(block) = self.current_block.take() {
            if !block.is_empty() {
                self.block_pool().filled.put(block);
            }
        }
        self.inserter.request_stop();
        self.inserter.join_all();
    }

    /// Composes a column-ordered set of values for one record (spec
    /// §4.8's `extract_values`), delegated to here so the forward/reverse
    /// composition logic lives in one place. Kept as a thin wrapper over
    /// [`RecordParser::parse_record`] for callers that already hold a
    /// parser built via `parser_caches` (tests, primarily).
    pub fn extract_values(
        field_values: &[WireFieldValue],
        parser: &crate::record::RecordParser,
        columns: &[Column],
        observation_domain_id: u32,
    ) -> Result<Vec<TargetValue>, RecordError> {
        parser
            .parse_record(columns, field_values, observation_domain_id)
            .map(|parsed| parsed.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnSource;
    use crate::insert::test_support::MockClient;
    use crate::insert::Client;
    use crate::template::TemplateFieldDef;
    use crate::types::DataType;
    use crate::variable_versions::data_number::DataNumber;
    use std::sync::Arc;

    fn addr() -> SocketAddr {
        "10.0.0.1:2055".parse().unwrap()
    }

    fn columns() -> Vec<Column> {
        vec![Column {
            name: "src_addr".to_string(),
            target_name: None,
            source: ColumnSource::Element { enterprise: 0, id: 8 },
            target_type: DataType::UInt32,
            nullable: false,
            reverse: false,
        }]
    }

    fn test_config() -> Config {
        Config {
            endpoints: vec![crate::config::Endpoint::new("127.0.0.1:9000".parse().unwrap())],
            table_name: "flows".to_string(),
            columns: columns(),
            inserter_threads: 1,
            blocks: 2,
            block_insert_threshold: 2,
            flush_interval: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(1),
            nonblocking: false,
            biflow_autoignore: false,
            split_biflow: false,
            max_template_fields: 64,
            max_error_sample_size: 64,
            template_lifetime: Duration::from_secs(300),
        }
    }

    fn spawn_pipeline(config: &Config) -> Pipeline {
        let block_pool = BlockPool::new(config.blocks, 16);
        let schema: Vec<(String, String)> = config
            .columns
            .iter()
            .map(|c| (c.wire_name().to_string(), "UInt32".to_string()))
            .collect();
        let factory: Arc<dyn Fn() -> Box<dyn Client> + Send + Sync> =
            Arc::new(move || Box::new(MockClient::new(schema.clone())));
        let inserter = InserterPool::spawn(
            config.inserter_threads,
            block_pool,
            config.endpoints.clone(),
            config.table_name.clone(),
            config.columns.clone(),
            config.stop_timeout,
            factory,
        );
        Pipeline::new(config, inserter)
    }

    #[test]
    fn sctp_messages_are_rejected_before_touching_template_state() {
        let config = test_config();
        let mut pipeline = spawn_pipeline(&config);
        let result = pipeline.on_message(addr(), Protocol::Sctp, vec![]);
        assert!(matches!(result, Err(PipelineError::SctpUnsupported)));
        pipeline.shutdown();
    }

    #[test]
    fn missing_template_reports_a_conversion_warning_but_does_not_panic() {
        let config = test_config();
        let mut pipeline = spawn_pipeline(&config);
        let record = IncomingRecord {
            peer_addr: addr(),
            observation_domain_id: 1,
            template_id: 256,
            field_values: vec![],
        };
        // no template has been learned yet; on_message should not error
        // out of the whole batch for one bad record.
        assert!(pipeline.on_message(addr(), Protocol::Udp, vec![record]).is_ok());
        pipeline.shutdown();
    }

    #[test]
    fn flush_moves_the_block_once_the_threshold_is_reached() {
        let config = test_config();
        let mut pipeline = spawn_pipeline(&config);

        pipeline
            .on_template(
                addr(),
                1,
                256,
                vec![TemplateFieldDef {
                    element: crate::element::Element::new(0, 8),
                    length: 4,
                    variable_length: false,
                    last_identical: true,
                }],
                0,
            )
            .unwrap();

        let make_record = || IncomingRecord {
            peer_addr: addr(),
            observation_domain_id: 1,
            template_id: 256,
            field_values: vec![WireFieldValue::DataNumber(DataNumber::U32(42))],
        };

        assert!(pipeline
            .on_message(addr(), Protocol::Udp, vec![make_record(), make_record()])
            .is_ok());
        // threshold is 2 rows; the block should have been flushed and a
        // fresh (empty) current block taken (or none, if avail ran dry).
        assert!(pipeline.current_block.as_ref().map(Block::is_empty).unwrap_or(true));
        pipeline.shutdown();
    }

    /// With `split_biflow` on, a biflow record appends two rows to the
    /// current Block rather than one (spec §6.1).
    #[test]
    fn split_biflow_doubles_rows_for_a_biflow_template() {
        let mut config = test_config();
        config.split_biflow = true;
        // Keep the threshold above 2 rows so the block isn't flushed out
        // from under this test before the row count is asserted.
        config.block_insert_threshold = 10;
        config.columns = vec![
            Column {
                name: "octets".to_string(),
                target_name: None,
                source: ColumnSource::Element { enterprise: 0, id: 1 },
                target_type: DataType::UInt64,
                nullable: true,
                reverse: false,
            },
            Column {
                name: "rev_octets".to_string(),
                target_name: None,
                source: ColumnSource::Element { enterprise: 0, id: 1 },
                target_type: DataType::UInt64,
                nullable: true,
                reverse: true,
            },
        ];
        let mut pipeline = spawn_pipeline(&config);

        pipeline
            .on_template(
                addr(),
                1,
                256,
                vec![
                    TemplateFieldDef {
                        element: crate::element::Element::new(0, 1),
                        length: 8,
                        variable_length: false,
                        last_identical: true,
                    },
                    TemplateFieldDef {
                        element: crate::element::Element::new(29305, 1),
                        length: 8,
                        variable_length: false,
                        last_identical: true,
                    },
                ],
                0,
            )
            .unwrap();

        let record = IncomingRecord {
            peer_addr: addr(),
            observation_domain_id: 1,
            template_id: 256,
            field_values: vec![
                WireFieldValue::DataNumber(DataNumber::U64(10_000)),
                WireFieldValue::DataNumber(DataNumber::U64(20_000)),
            ],
        };

        assert!(pipeline.on_message(addr(), Protocol::Udp, vec![record]).is_ok());
        assert_eq!(pipeline.current_block.as_ref().map(|b| b.len()), Some(2));
        pipeline.shutdown();
    }

    /// End-to-end: a raw IPFIX message carrying a Template Set followed by
    /// a Data Set for that same template, fed straight through
    /// `on_raw_message`, should learn the template and append one row.
    #[test]
    fn on_raw_message_learns_a_template_and_produces_a_row() {
        let mut config = test_config();
        config.columns = vec![Column {
            name: "src_addr".to_string(),
            target_name: None,
            source: ColumnSource::Element { enterprise: 0, id: 8 },
            target_type: DataType::Ipv4,
            nullable: false,
            reverse: false,
        }];
        let mut pipeline = spawn_pipeline(&config);

        let mut msg = Vec::new();
        msg.extend_from_slice(&10u16.to_be_bytes()); // version
        msg.extend_from_slice(&0u16.to_be_bytes()); // length, patched below
        msg.extend_from_slice(&0u32.to_be_bytes()); // export time
        msg.extend_from_slice(&1u32.to_be_bytes()); // sequence
        msg.extend_from_slice(&7u32.to_be_bytes()); // observation domain id

        let mut template_record = Vec::new();
        template_record.extend_from_slice(&256u16.to_be_bytes()); // template id
        template_record.extend_from_slice(&1u16.to_be_bytes()); // field count
        template_record.extend_from_slice(&8u16.to_be_bytes()); // element id 8
        template_record.extend_from_slice(&4u16.to_be_bytes()); // length 4
        msg.extend_from_slice(&2u16.to_be_bytes()); // template set id
        msg.extend_from_slice(&((template_record.len() + 4) as u16).to_be_bytes());
        msg.extend_from_slice(&template_record);

        let data_record = [192u8, 0, 2, 1];
        msg.extend_from_slice(&256u16.to_be_bytes()); // data set id == template id
        msg.extend_from_slice(&((data_record.len() + 4) as u16).to_be_bytes());
        msg.extend_from_slice(&data_record);

        let total_len = msg.len() as u16;
        msg[2..4].copy_from_slice(&total_len.to_be_bytes());

        let result = pipeline.on_raw_message(addr(), Protocol::Udp, TemplateProtocol::Ipfix, &msg);
        assert!(result.is_ok(), "{result:?}");

        let session = pipeline.sessions.get(&addr()).expect("session opened");
        assert!(session.peer_addr == addr());
        assert_eq!(
            pipeline.current_block.as_ref().map(|b| b.len()),
            Some(1)
        );
        pipeline.shutdown();
    }
}
