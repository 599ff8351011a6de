//! Versioned template store for a single (Session, Observation Domain)
//! scope (spec §3 Template data model, §4.2 TemplateStore).
//!
//! Every successful upsert produces a new immutable [`TemplateVersion`];
//! a redefinition over UDP retires the previous version into a
//! predecessor chain rather than dropping it, so a [`TemplateSnapshot`]
//! captured before the redefinition keeps resolving to the version that
//! was live when it was taken, until [`TemplateStore::collect_garbage`]
//! decides enough time has passed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::element::Element;
use crate::error::TemplateError;
use crate::session::Protocol;
use crate::template_events::{TemplateEvent, TemplateHooks, TemplateProtocol};

/// Template (and data Set) ids below this are reserved (spec §3 "Template
/// id ≥ 256").
const MIN_TEMPLATE_ID: u16 = 256;

/// One field slot in a template definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFieldDef {
    pub element: Element,
    pub length: u16,
    /// `true` if the wire-declared length used the IPFIX variable-length
    /// marker (`0xFFFF`).
    pub variable_length: bool,
    /// The column this field resolves to, if any — precomputed once at
    /// parse time rather than re-scanned per record (spec §3: "the one
    /// flagged `last_identical` is preferred ... precomputed at
    /// template-parse time").
    pub last_identical: bool,
}

/// An immutable template definition: its field layout, in declaration
/// order. Scope fields (Options Template only) are the first
/// `scope_field_count` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDefinition {
    pub template_id: u16,
    pub fields: Vec<TemplateFieldDef>,
    pub scope_field_count: usize,
}

impl TemplateDefinition {
    pub fn is_options_template(&self) -> bool {
        self.scope_field_count > 0
    }
}

/// A definition plus the monotonically increasing version number assigned
/// when it was learned or redefined, and the lifetime window it was (or
/// still is) in force for (spec §3 TemplateVersion).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVersion {
    pub definition: Arc<TemplateDefinition>,
    pub version: u64,
    pub first_seen: Instant,
    pub last_refresh: Instant,
    /// `None` while live; set to the observation time it was superseded
    /// or withdrawn at.
    pub end: Option<Instant>,
    pub packet_count_stamp: u64,
}

impl TemplateVersion {
    pub fn is_live(&self) -> bool {
        self.end.is_none()
    }

    /// Whether observation time `t` falls within this version's
    /// `[first_seen, end)` window (or `[first_seen, +inf)` if still live).
    pub fn covers(&self, t: Instant) -> bool {
        t >= self.first_seen && self.end.is_none_or(|end| t < end)
    }
}

/// One template id's state: the currently live version (if any) plus a
/// newest-first chain of retired predecessors still reachable from older
/// snapshots (spec §3: "a linked chain of older versions hangs off the
/// live version for readers holding older snapshots").
struct Slot {
    current: Option<TemplateVersion>,
    history: Vec<TemplateVersion>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            current: None,
            history: Vec::new(),
        }
    }

    /// Finds the version (live or retired) covering observation time `t`.
    fn version_at(&self, t: Instant) -> Option<&TemplateVersion> {
        if let Some(current) = &self.current {
            if current.covers(t) {
                return Some(current);
            }
        }
        self.history.iter().find(|v| v.covers(t))
    }
}

/// An immutable, cheaply-cloneable view over every template currently in
/// force for a (session, ODID) scope at the time it was published (spec
/// §3 TemplateSnapshot).
#[derive(Debug, Clone, Default)]
pub struct TemplateSnapshot {
    templates: Arc<HashMap<u16, TemplateVersion>>,
}

impl TemplateSnapshot {
    pub fn get(&self, template_id: u16) -> Option<&TemplateVersion> {
        self.templates.get(&template_id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Outcome of [`TemplateStore::upsert_template`], distinguishing a first
/// sighting from a verbatim refresh from a genuine redefinition — each
/// triggers a different event and, for redefinition, invalidates any
/// cached [`crate::record::RecordParser`] built against the old version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Learned,
    /// Re-sent with an identical field layout; no downstream cache needs
    /// rebuilding.
    Refreshed,
    /// Re-sent with a different field layout under the same template ID.
    Redefined,
}

/// Versioned per-(session, ODID) template store.
pub struct TemplateStore {
    protocol: Protocol,
    slots: HashMap<u16, Slot>,
    next_version: u64,
    hooks: TemplateHooks,
    template_protocol: TemplateProtocol,
    now: Instant,
    packet_count: u64,
    dirty: bool,
    last_snapshot: Option<TemplateSnapshot>,
    last_snapshot_at: Option<Instant>,
}

impl TemplateStore {
    pub fn new(protocol: Protocol, template_protocol: TemplateProtocol) -> Self {
        Self {
            protocol,
            slots: HashMap::new(),
            next_version: 1,
            hooks: TemplateHooks::new(),
            template_protocol,
            now: Instant::now(),
            packet_count: 0,
            dirty: false,
            last_snapshot: None,
            last_snapshot_at: None,
        }
    }

    pub fn register_hook<F>(&mut self, hook: F)
    where
        F: Fn(&TemplateEvent) + Send + Sync + 'static,
    {
        self.hooks.register(hook);
    }

    /// Advances the store's notion of current time before processing a
    /// message (spec §4.2: `observe_time(t, packet_count)`).
    pub fn observe_time(&mut self, now: Instant, packet_count: u64) {
        self.now = now;
        self.packet_count = packet_count;
    }

    pub fn current_time(&self) -> Instant {
        self.now
    }

    /// Learns, refreshes, or redefines a template, honoring the
    /// protocol-specific redefinition rule (spec §4.2): TCP/TLS/SCTP
    /// reject a different redefinition over a still-live id, UDP retires
    /// the previous version into the predecessor chain and accepts.
    pub fn upsert_template(
        &mut self,
        template_id: u16,
        fields: Vec<TemplateFieldDef>,
        scope_field_count: usize,
    ) -> Result<UpsertOutcome, TemplateError> {
        self.upsert_template_checked(template_id, fields, scope_field_count, scope_field_count > 0)
    }

    /// Like [`Self::upsert_template`], but takes the wire's own claim of
    /// whether this was parsed off an Options Template Set, so a template
    /// advertised as options with zero scope fields can be told apart from
    /// an ordinary data template (spec §3: "Template id ≥ 256 ... Options
    /// template scope count ≥ 1").
    pub fn upsert_template_checked(
        &mut self,
        template_id: u16,
        fields: Vec<TemplateFieldDef>,
        scope_field_count: usize,
        is_options_template: bool,
    ) -> Result<UpsertOutcome, TemplateError> {
        if template_id < MIN_TEMPLATE_ID {
            return Err(TemplateError::InvalidTemplateId { template_id });
        }
        if fields.is_empty() {
            return Err(TemplateError::EmptyDefinition { template_id });
        }
        if is_options_template && scope_field_count == 0 {
            return Err(TemplateError::InvalidScopeFieldCount { template_id });
        }

        let fields = precompute_last_identical(fields);
        let definition = Arc::new(TemplateDefinition {
            template_id,
            fields,
            scope_field_count,
        });

        let now = self.now;
        let packet_count = self.packet_count;
        let slot = self.slots.entry(template_id).or_insert_with(Slot::empty);

        let outcome = match &slot.current {
            None => UpsertOutcome::Learned,
            Some(existing) if *existing.definition == *definition => UpsertOutcome::Refreshed,
            Some(existing) if existing.is_live() && self.protocol == Protocol::Udp => {
                UpsertOutcome::Redefined
            }
            Some(existing) if existing.is_live() => {
                return Err(TemplateError::RedefinitionRejected { template_id });
            }
            Some(_withdrawn) => UpsertOutcome::Learned,
        };

        match outcome {
            UpsertOutcome::Refreshed => {
                if let Some(current) = slot.current.as_mut() {
                    current.last_refresh = now;
                    current.packet_count_stamp = packet_count;
                }
            }
            UpsertOutcome::Learned | UpsertOutcome::Redefined => {
                if let Some(mut previous) = slot.current.take() {
                    previous.end = Some(now);
                    slot.history.insert(0, previous);
                }
                let version = self.next_version;
                self.next_version += 1;
                slot.current = Some(TemplateVersion {
                    definition,
                    version,
                    first_seen: now,
                    last_refresh: now,
                    end: None,
                    packet_count_stamp: packet_count,
                });
            }
        }

        self.dirty = true;

        let event = match outcome {
            UpsertOutcome::Learned => TemplateEvent::Learned {
                template_id,
                protocol: self.template_protocol,
            },
            UpsertOutcome::Refreshed | UpsertOutcome::Redefined => TemplateEvent::Collision {
                template_id,
                protocol: self.template_protocol,
            },
        };
        self.hooks.trigger(&event);

        Ok(outcome)
    }

    /// Withdraws (removes) a template. Per spec §9 / Open Question 2, a
    /// UDP session can never truly remove a template this way — only
    /// TCP/TLS/SCTP withdrawal is honored; the retired version is kept in
    /// the predecessor chain until [`Self::collect_garbage`] reclaims it.
    pub fn withdraw(&mut self, template_id: u16) -> Result<(), TemplateError> {
        if self.protocol == Protocol::Udp {
            return Err(TemplateError::WithdrawIgnoredOnUdp { template_id });
        }
        let now = self.now;
        if let Some(slot) = self.slots.get_mut(&template_id) {
            if let Some(mut current) = slot.current.take() {
                current.end = Some(now);
                slot.history.insert(0, current);
                self.dirty = true;
            }
        }
        Ok(())
    }

    /// Returns the live version for `template_id` at the store's current
    /// observation time, or `None` if there is none (spec §4.2 `lookup`).
    pub fn lookup(&self, template_id: u16) -> Option<&TemplateVersion> {
        let found = self
            .slots
            .get(&template_id)
            .and_then(|slot| slot.current.as_ref())
            .filter(|v| v.covers(self.now));
        if found.is_none() {
            self.hooks.trigger(&TemplateEvent::MissingTemplate {
                template_id,
                protocol: self.template_protocol,
            });
        }
        found
    }

    /// Returns whichever version (live or retired) was in force for
    /// `template_id` at observation time `t`, used by readers holding an
    /// older [`TemplateSnapshot`] (spec §3 TemplateVersion / §8 property
    /// 3).
    pub fn lookup_at(&self, template_id: u16, t: Instant) -> Option<&TemplateVersion> {
        self.slots.get(&template_id).and_then(|slot| slot.version_at(t))
    }

    /// Publishes the current live set as an immutable snapshot, reusing
    /// the previously published one if nothing has changed since (spec
    /// §4.2: "publishes a new snapshot only if the store was modified
    /// since the last publication").
    pub fn snapshot(&mut self) -> TemplateSnapshot {
        if !self.dirty {
            if let Some(snapshot) = &self.last_snapshot {
                return snapshot.clone();
            }
        }
        let templates = self
            .slots
            .iter()
            .filter_map(|(id, slot)| slot.current.clone().map(|v| (*id, v)))
            .collect();
        let snapshot = TemplateSnapshot {
            templates: Arc::new(templates),
        };
        self.last_snapshot = Some(snapshot.clone());
        self.last_snapshot_at = Some(self.now);
        self.dirty = false;
        snapshot
    }

    /// Reclaims retired template versions whose `end + lifetime < now`,
    /// and drops the cached snapshot once it is older than `now -
    /// lifetime` (nothing still reachable could resolve to it) (spec
    /// §4.2 `collect_garbage`).
    pub fn collect_garbage(&mut self, now: std::time::Duration, lifetime: std::time::Duration) {
        let cutoff = self.now.checked_sub(lifetime);
        let _ = now; // observation-time argument retained for API symmetry with spec wording
        for slot in self.slots.values_mut() {
            slot.history.retain(|v| {
                let Some(end) = v.end else { return true };
                cutoff.is_none_or(|cutoff| end >= cutoff)
            });
        }
        self.slots.retain(|_, slot| slot.current.is_some() || !slot.history.is_empty());
        if let Some(snapshot_at) = self.last_snapshot_at {
            if cutoff.is_some_and(|cutoff| snapshot_at < cutoff) {
                self.last_snapshot = None;
                self.last_snapshot_at = None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.values().filter(|s| s.current.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marks, per `(enterprise, id)`, the *last* occurrence of each element in
/// declaration order as `last_identical`, so a template with a repeated
/// field resolves a column to the field closest to the end of the
/// definition — the spec's stated preference.
fn precompute_last_identical(mut fields: Vec<TemplateFieldDef>) -> Vec<TemplateFieldDef> {
    let mut last_index: HashMap<Element, usize> = HashMap::new();
    for (idx, field) in fields.iter().enumerate() {
        last_index.insert(field.element, idx);
    }
    for (idx, field) in fields.iter_mut().enumerate() {
        field.last_identical = last_index.get(&field.element) == Some(&idx);
    }
    fields
}
