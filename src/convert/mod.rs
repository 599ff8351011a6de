//! Converts a NetFlow v9 message into its IPFIX equivalent (spec §4.3).
//!
//! Grounded in the teacher's `variable_versions::v9`/`v9_lookup` field
//! tables (V9 field-type numbers are, for the common fields, numerically
//! compatible with IPFIX information element IDs — a deliberate design
//! choice of RFC 3954/7011 — so most fields pass through unchanged) plus
//! the timestamp-rewrite, scope-remap and sequence-renumber rules spelled
//! out in spec §4.3.

use std::time::Duration;

use crate::element::Element;
use crate::template::TemplateFieldDef;
use crate::variable_versions::data_number::FieldValue as WireFieldValue;

/// Fixed IPFIX header length (version, length, export time, sequence,
/// observation domain ID).
pub const IPFIX_HEADER_LEN: usize = 16;

/// NetFlow v9 IANA field type for a flow's first-seen time, relative to
/// `SysUptime` (RFC 3954 field dictionary).
pub const V9_FIRST_SWITCHED_ID: u16 = 22;
/// NetFlow v9 IANA field type for a flow's last-seen time, relative to
/// `SysUptime`.
pub const V9_LAST_SWITCHED_ID: u16 = 21;
/// IPFIX `flowStartMilliseconds` (RFC 5102), the absolute-time equivalent
/// of `FIRST_SWITCHED`.
pub const IPFIX_FLOW_START_MS_ID: u16 = 152;
/// IPFIX `flowEndMilliseconds`, the absolute-time equivalent of
/// `LAST_SWITCHED`.
pub const IPFIX_FLOW_END_MS_ID: u16 = 153;

/// Rewrites a NetFlow v9 `FIRST_SWITCHED`/`LAST_SWITCHED` element onto its
/// IPFIX absolute-time equivalent (spec §4.3 step 2). Every other element
/// passes through unchanged, matching RFC 3954/7011's numerically
/// compatible field dictionaries for the common fields.
pub fn rewrite_v9_timestamp_element(element: Element) -> Element {
    match (element.enterprise, element.id) {
        (0, V9_FIRST_SWITCHED_ID) => Element::new(0, IPFIX_FLOW_START_MS_ID),
        (0, V9_LAST_SWITCHED_ID) => Element::new(0, IPFIX_FLOW_END_MS_ID),
        _ => element,
    }
}

fn is_rewritten_timestamp_element(element: Element) -> bool {
    matches!(
        (element.enterprise, element.id),
        (0, IPFIX_FLOW_START_MS_ID) | (0, IPFIX_FLOW_END_MS_ID)
    )
}

/// `utc_ms = unix_secs*1000 - sysuptime_ms`, applied with no clock-skew
/// correction (spec §9 Open Question 1 / DESIGN.md decision 1): the
/// exporter's own `unix_secs`/`sys_up_time_ms` pair at header time is
/// trusted as-is, and a record's relative `sysUpTime`-based timestamp is
/// converted to an absolute value by adding it to the resulting boot time.
pub fn record_timestamp_to_utc_ms(
    header_unix_secs: u32,
    header_sys_up_time_ms: u32,
    record_relative_ms: u32,
) -> i64 {
    let boot_time_ms = i64::from(header_unix_secs) * 1000 - i64::from(header_sys_up_time_ms);
    boot_time_ms + i64::from(record_relative_ms)
}

/// Rewrites a NetFlow v9 data record's already-decoded values in place,
/// turning any `FIRST_SWITCHED`/`LAST_SWITCHED` relative-millisecond field
/// (whose element was already retagged by
/// [`rewrite_v9_timestamp_element`] at template-parse time) into an
/// absolute millisecond timestamp.
///
/// `fields` and `values` are positional, in template field order, as
/// produced by [`crate::ingest::decode_data_records`].
pub fn convert_v9_record_timestamps(
    fields: &[TemplateFieldDef],
    values: &mut [WireFieldValue],
    header_unix_secs: u32,
    header_sys_up_time_ms: u32,
) {
    for (field, value) in fields.iter().zip(values.iter_mut()) {
        if !is_rewritten_timestamp_element(field.element) {
            continue;
        }
        if let WireFieldValue::Duration(relative) = value {
            let relative_ms = relative.as_millis() as u32;
            let abs_ms =
                record_timestamp_to_utc_ms(header_unix_secs, header_sys_up_time_ms, relative_ms);
            *relative = Duration::from_millis(abs_ms.max(0) as u64);
        }
    }
}

/// NetFlow v9 Options Template scope field types (RFC 3954 §6.2), mapped
/// onto the IPFIX information elements that carry the equivalent meaning.
/// IPFIX has no separate "scope field type" wire concept — scope fields
/// are ordinary information elements — so the NFv9-only type codes must be
/// translated to a real element identity during conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V9ScopeType {
    System,
    Interface,
    LineCard,
    Cache,
    Template,
}

impl V9ScopeType {
    pub fn from_wire(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::System),
            2 => Some(Self::Interface),
            3 => Some(Self::LineCard),
            4 => Some(Self::Cache),
            5 => Some(Self::Template),
            _ => None,
        }
    }

    /// The IPFIX element this scope type is remapped to, per the exact
    /// `{1=system, 2=interface, 3=line-card, 4=cache, 5=template}` →
    /// `{144, 10, 141, 231, 145}` table spec §4.3 specifies.
    pub fn to_ipfix_element(self) -> Element {
        match self {
            V9ScopeType::System => Element::new(0, 144),
            // ingressInterface.
            V9ScopeType::Interface => Element::new(0, 10),
            // lineCardId.
            V9ScopeType::LineCard => Element::new(0, 141),
            V9ScopeType::Cache => Element::new(0, 231),
            // templateId.
            V9ScopeType::Template => Element::new(0, 145),
        }
    }
}

/// Remaps a NetFlow v9 scope field type code to its IPFIX element.
/// Unknown codes are passed through as an enterprise-0 element carrying
/// the raw code, preserving round-trippability rather than dropping data.
pub fn remap_scope_field(code: u16) -> Element {
    V9ScopeType::from_wire(code)
        .map(V9ScopeType::to_ipfix_element)
        .unwrap_or(Element::new(0, code))
}

/// Fixed fields of a converted IPFIX message header, before final byte
/// serialization (owned by the caller's wire-format writer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpfixHeaderFields {
    pub export_time: u32,
    pub sequence_number: u32,
    pub observation_domain_id: u32,
}

/// One packed IPFIX message: a header plus the serialized Sets it carries.
#[derive(Debug, Clone)]
pub struct ConvertedMessage {
    pub header: IpfixHeaderFields,
    pub sets: Vec<Vec<u8>>,
}

impl ConvertedMessage {
    /// Total wire length this message would occupy once serialized.
    pub fn wire_len(&self) -> usize {
        IPFIX_HEADER_LEN + self.sets.iter().map(Vec::len).sum::<usize>()
    }
}

/// Packs a stream of already-serialized Sets (one entry per converted
/// record/Set) into as few IPFIX messages as possible, never exceeding
/// `max_len` bytes per message (spec §4.3: "message splitting at 65535
/// bytes"), and renumbers each message's sequence number by the
/// cumulative count of records emitted so far for this ODID.
///
/// `set_record_counts[i]` is how many flow records `sets[i]` contains,
/// used to advance `running_record_count` for sequence numbering.
pub fn pack_into_messages(
    sets: Vec<Vec<u8>>,
    set_record_counts: &[usize],
    export_time: u32,
    observation_domain_id: u32,
    mut running_record_count: u64,
    max_len: usize,
) -> Vec<ConvertedMessage> {
    assert_eq!(sets.len(), set_record_counts.len());

    let mut messages = Vec::new();
    let mut current_sets: Vec<Vec<u8>> = Vec::new();
    let mut current_len = IPFIX_HEADER_LEN;
    let mut sequence_at_start = running_record_count;

    for (set, &record_count) in sets.into_iter().zip(set_record_counts) {
        if current_len + set.len() > max_len && !current_sets.is_empty() {
            messages.push(ConvertedMessage {
                header: IpfixHeaderFields {
                    export_time,
                    sequence_number: sequence_at_start as u32,
                    observation_domain_id,
                },
                sets: std::mem::take(&mut current_sets),
            });
            current_len = IPFIX_HEADER_LEN;
            sequence_at_start = running_record_count;
        }
        current_len += set.len();
        current_sets.push(set);
        running_record_count += record_count as u64;
    }

    if !current_sets.is_empty() {
        messages.push(ConvertedMessage {
            header: IpfixHeaderFields {
                export_time,
                sequence_number: sequence_at_start as u32,
                observation_domain_id,
            },
            sets: current_sets,
        });
    }

    messages
}
