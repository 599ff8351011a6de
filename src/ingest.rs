//! Parses raw IPFIX/NetFlow v9 message bytes into template declarations and
//! data records (spec §2 "Data flow", §4.1, §4.3).
//!
//! The teacher's `variable_versions::ipfix`/`v9` parsers are built around a
//! generated, compile-time `IPFixField` enum (`ipfix_lookup`) naming every
//! registered IANA element as its own variant. This crate identifies a
//! field by its raw `(enterprise, id)` pair at runtime instead (see
//! `element.rs`), so Sets are walked here directly with `nom` combinators
//! the same way `data_number.rs` already parses at the field level, and
//! field values are decoded through its public
//! `FieldValue::from_field_type`/`FieldDataType` seam in place of a
//! generated lookup table. `classify_element` below is the compact,
//! hand-maintained stand-in for that table: common elements are named
//! explicitly, everything else falls back to a length-based guess.

use nom::number::complete::{be_u16, be_u32};
use nom::IResult;

use crate::convert::{rewrite_v9_timestamp_element, V9ScopeType};
use crate::element::Element;
use crate::error::DecodeError;
use crate::template::TemplateFieldDef;
use crate::variable_versions::data_number::{FieldDataType, FieldValue as WireFieldValue};

const IPFIX_VERSION: u16 = 10;
const NFV9_VERSION: u16 = 9;

const IPFIX_TEMPLATE_SET_ID: u16 = 2;
const IPFIX_OPTIONS_TEMPLATE_SET_ID: u16 = 3;
const NFV9_TEMPLATE_SET_ID: u16 = 0;
const NFV9_OPTIONS_TEMPLATE_SET_ID: u16 = 1;
const MIN_DATA_SET_ID: u16 = 256;

const ENTERPRISE_BIT: u16 = 0x8000;
const VARLEN_MARKER: u16 = 0xFFFF;
const VARLEN_LONG_PREFIX: u8 = 0xFF;

fn u16_be(i: &[u8]) -> IResult<&[u8], u16> {
    be_u16(i)
}

fn u32_be(i: &[u8]) -> IResult<&[u8], u32> {
    be_u32(i)
}

fn fmt_err(e: impl std::fmt::Debug) -> DecodeError {
    DecodeError::Format(format!("{e:?}"))
}

/// A decoded message header, normalized across IPFIX and NetFlow v9.
/// `sys_up_time_ms` is v9-only (zero for IPFIX), kept around so a caller
/// can run `convert::record_timestamp_to_utc_ms` over a record's relative
/// timestamp (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u16,
    pub export_time_secs: u32,
    pub sequence_number: u32,
    pub observation_domain_id: u32,
    pub sys_up_time_ms: u32,
}

/// Parses a message header, dispatching on the version field every IPFIX
/// and NetFlow v9 message carries in its first two bytes, and returns the
/// remaining Set bytes.
pub fn parse_header(bytes: &[u8]) -> Result<(MessageHeader, &[u8]), DecodeError> {
    let (rest, version) = u16_be(bytes).map_err(fmt_err)?;
    match version {
        IPFIX_VERSION => {
            let (rest, _length) = u16_be(rest).map_err(fmt_err)?;
            let (rest, export_time_secs) = u32_be(rest).map_err(fmt_err)?;
            let (rest, sequence_number) = u32_be(rest).map_err(fmt_err)?;
            let (rest, observation_domain_id) = u32_be(rest).map_err(fmt_err)?;
            Ok((
                MessageHeader {
                    version,
                    export_time_secs,
                    sequence_number,
                    observation_domain_id,
                    sys_up_time_ms: 0,
                },
                rest,
            ))
        }
        NFV9_VERSION => {
            let (rest, _count) = u16_be(rest).map_err(fmt_err)?;
            let (rest, sys_up_time_ms) = u32_be(rest).map_err(fmt_err)?;
            let (rest, export_time_secs) = u32_be(rest).map_err(fmt_err)?;
            let (rest, sequence_number) = u32_be(rest).map_err(fmt_err)?;
            let (rest, observation_domain_id) = u32_be(rest).map_err(fmt_err)?;
            Ok((
                MessageHeader {
                    version,
                    export_time_secs,
                    sequence_number,
                    observation_domain_id,
                    sys_up_time_ms,
                },
                rest,
            ))
        }
        other => Err(DecodeError::Format(format!(
            "unsupported message version {other}"
        ))),
    }
}

/// A template or options-template record freshly parsed off the wire, not
/// yet checked against any existing `TemplateStore` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTemplate {
    pub template_id: u16,
    pub fields: Vec<TemplateFieldDef>,
    pub scope_field_count: usize,
    /// Whether this was parsed off an Options Template Set (IPFIX set id
    /// 3 / NetFlow v9 set id 1) rather than a plain Template Set, so a
    /// malformed options template carrying zero scope fields can be told
    /// apart from an ordinary data template (spec §3).
    pub is_options_template: bool,
}

/// One Set's worth of decoded content. Data Sets are returned as their raw
/// body bytes since decoding them requires the field layout of whichever
/// template `set_id` currently resolves to — state this module does not
/// hold.
pub enum RawSet<'a> {
    Template(DecodedTemplate),
    Withdraw(u16),
    Data { set_id: u16, body: &'a [u8] },
}

/// Walks every Set in a message body, producing one [`RawSet`] per Template
/// Set record and one per Data Set. A single Template/Options-Template Set
/// may carry several back-to-back template records (spec's RFC 7011 §3.4.1
/// "multiple records").
pub fn parse_sets(mut body: &[u8], version: u16) -> Result<Vec<RawSet<'_>>, DecodeError> {
    let mut sets = Vec::new();
    while body.len() >= 4 {
        let (rest, set_id) = u16_be(body).map_err(fmt_err)?;
        let (rest, length) = u16_be(rest).map_err(fmt_err)?;
        let length = length as usize;
        if length < 4 || length > 4 + rest.len() {
            return Err(DecodeError::Format(format!(
                "set {set_id} declares length {length} outside the message"
            )));
        }
        let set_body_len = length - 4;
        let (set_body, after) = rest.split_at(set_body_len);

        match set_id {
            IPFIX_TEMPLATE_SET_ID | NFV9_TEMPLATE_SET_ID => {
                sets.extend(parse_template_set(set_body, version)?);
            }
            IPFIX_OPTIONS_TEMPLATE_SET_ID | NFV9_OPTIONS_TEMPLATE_SET_ID => {
                sets.extend(parse_options_template_set(set_body, version)?);
            }
            id if id >= MIN_DATA_SET_ID => {
                sets.push(RawSet::Data { set_id: id, body: set_body });
            }
            other => {
                // Reserved/unknown Set ID; skip it rather than fail the
                // whole message.
                let _ = other;
            }
        }
        body = after;
    }
    Ok(sets)
}

/// Marks exactly the last occurrence of each distinct element as the
/// preferred one, matching `record.rs`'s `find_field` lookup (spec §3:
/// "the one flagged `last_identical` is preferred").
fn mark_last_identical(fields: &mut [TemplateFieldDef]) {
    for i in 0..fields.len() {
        let element = fields[i].element;
        let is_last = fields[i + 1..].iter().all(|f| f.element != element);
        fields[i].last_identical = is_last;
    }
}

fn parse_template_field(i: &[u8], version: u16) -> IResult<&[u8], TemplateFieldDef> {
    let (i, raw_type) = u16_be(i)?;
    let (i, field_length) = u16_be(i)?;
    let enterprise_flag = version == IPFIX_VERSION && raw_type & ENTERPRISE_BIT != 0;
    let (i, enterprise) = if enterprise_flag {
        u32_be(i)?
    } else {
        (i, 0)
    };
    let field_type = raw_type & !ENTERPRISE_BIT;
    let variable_length = version == IPFIX_VERSION && field_length == VARLEN_MARKER;
    let mut element = Element::new(enterprise, field_type);
    if version == NFV9_VERSION {
        // FIRST_SWITCHED/LAST_SWITCHED carry sysUptime-relative milliseconds
        // on the wire; retag them onto their IPFIX absolute-timestamp
        // elements now so `convert::convert_v9_record_timestamps` can find
        // them by id once records are decoded.
        element = rewrite_v9_timestamp_element(element);
    }
    Ok((
        i,
        TemplateFieldDef {
            element,
            length: if variable_length { 0 } else { field_length },
            variable_length,
            last_identical: true,
        },
    ))
}

fn parse_template_set(mut body: &[u8], version: u16) -> Result<Vec<RawSet<'static>>, DecodeError> {
    let mut out = Vec::new();
    while body.len() >= 4 {
        let (rest, template_id) = u16_be(body).map_err(fmt_err)?;
        let (rest, field_count) = u16_be(rest).map_err(fmt_err)?;
        if field_count == 0 {
            if template_id == 0 {
                // Trailing zero padding, not a genuine withdrawal.
                break;
            }
            out.push(RawSet::Withdraw(template_id));
            body = rest;
            continue;
        }
        let mut fields = Vec::with_capacity(field_count as usize);
        let mut cursor = rest;
        for _ in 0..field_count {
            let (after, field) = parse_template_field(cursor, version).map_err(fmt_err)?;
            fields.push(field);
            cursor = after;
        }
        mark_last_identical(&mut fields);
        out.push(RawSet::Template(DecodedTemplate {
            template_id,
            fields,
            scope_field_count: 0,
            is_options_template: false,
        }));
        body = cursor;
    }
    Ok(out)
}

fn parse_options_template_set(
    mut body: &[u8],
    version: u16,
) -> Result<Vec<RawSet<'static>>, DecodeError> {
    let mut out = Vec::new();
    while body.len() >= 6 {
        if version == IPFIX_VERSION {
            let (rest, template_id) = u16_be(body).map_err(fmt_err)?;
            let (rest, field_count) = u16_be(rest).map_err(fmt_err)?;
            let (rest, scope_field_count) = u16_be(rest).map_err(fmt_err)?;
            if field_count == 0 {
                if template_id == 0 {
                    break;
                }
                out.push(RawSet::Withdraw(template_id));
                body = rest;
                continue;
            }
            let mut fields = Vec::with_capacity(field_count as usize);
            let mut cursor = rest;
            for _ in 0..field_count {
                let (after, field) = parse_template_field(cursor, version).map_err(fmt_err)?;
                fields.push(field);
                cursor = after;
            }
            out.push(RawSet::Template(DecodedTemplate {
                template_id,
                fields,
                scope_field_count: scope_field_count as usize,
                is_options_template: true,
            }));
            body = cursor;
        } else {
            // NetFlow v9 options template: scope/option section lengths
            // are in *bytes*, and scope fields carry a scope-type code
            // rather than an element id (RFC 3954 §6.2), remapped onto an
            // IPFIX element. A scope code this collector doesn't recognize
            // makes the whole options template (and the data records it
            // would describe) undecodable, so it's dropped rather than
            // silently aliased onto an enterprise-0 placeholder.
            let (rest, template_id) = u16_be(body).map_err(fmt_err)?;
            let (rest, scope_len_bytes) = u16_be(rest).map_err(fmt_err)?;
            let (rest, option_len_bytes) = u16_be(rest).map_err(fmt_err)?;
            let scope_field_count = (scope_len_bytes / 4) as usize;
            let option_field_count = (option_len_bytes / 4) as usize;

            let mut fields = Vec::with_capacity(scope_field_count + option_field_count);
            let mut cursor = rest;
            let mut all_scopes_known = true;
            for _ in 0..scope_field_count {
                let (after, scope_type) = u16_be(cursor).map_err(fmt_err)?;
                let (after, scope_length) = u16_be(after).map_err(fmt_err)?;
                match V9ScopeType::from_wire(scope_type) {
                    Some(known) => fields.push(TemplateFieldDef {
                        element: known.to_ipfix_element(),
                        length: scope_length,
                        variable_length: false,
                        last_identical: true,
                    }),
                    None => all_scopes_known = false,
                }
                cursor = after;
            }
            for _ in 0..option_field_count {
                let (after, field) = parse_template_field(cursor, version).map_err(fmt_err)?;
                fields.push(field);
                cursor = after;
            }
            if all_scopes_known {
                mark_last_identical(&mut fields);
                out.push(RawSet::Template(DecodedTemplate {
                    template_id,
                    fields,
                    scope_field_count,
                    is_options_template: true,
                }));
            }
            body = cursor;
        }
    }
    Ok(out)
}

/// Reads a variable-length field's length prefix (RFC 7011 §7): one byte
/// if under 255, else a `0xFF` marker followed by a two-byte length.
fn read_varlen_prefix(i: &[u8]) -> Result<(&[u8], usize), DecodeError> {
    let (&first, rest) = i
        .split_first()
        .ok_or_else(|| DecodeError::Format("truncated variable-length prefix".to_string()))?;
    if first != VARLEN_LONG_PREFIX {
        Ok((rest, first as usize))
    } else {
        if rest.len() < 2 {
            return Err(DecodeError::Format(
                "truncated variable-length prefix".to_string(),
            ));
        }
        let (len_bytes, rest) = rest.split_at(2);
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        Ok((rest, len))
    }
}

/// Classifies an element's wire encoding for the common elements a
/// collector actually sees; anything unrecognized falls back to a
/// length-based guess (spec §4.5, stand-in for the teacher's generated
/// `ipfix_lookup` table — see module doc comment).
pub fn classify_element(element: Element, length: u16) -> FieldDataType {
    if element.is_iana() {
        match element.id {
            4 => return FieldDataType::ProtocolType,
            8 | 12 | 15 | 18 | 225 | 226 | 227 | 228 => return FieldDataType::Ip4Addr,
            27 | 28 | 62 | 63 => return FieldDataType::Ip6Addr,
            56 | 57 | 80 | 81 => return FieldDataType::MacAddr,
            82 | 83 | 94 | 96 => return FieldDataType::String,
            95 => return FieldDataType::ApplicationId,
            150 | 151 => return FieldDataType::DurationSeconds,
            21 | 22 | 152 | 153 => return FieldDataType::DurationMillis,
            154 | 155 => return FieldDataType::DurationMicros,
            156 | 157 => return FieldDataType::DurationNanos,
            _ => {}
        }
    }
    match length {
        1 | 2 | 3 | 4 | 8 | 16 => FieldDataType::UnsignedDataNumber,
        6 => FieldDataType::MacAddr,
        _ => FieldDataType::Vec,
    }
}

/// Decodes a Data Set's records against the field layout of the template
/// it was declared under. Stops (without erroring) as soon as the
/// remaining bytes are too short to hold another full record — trailing
/// padding, not a malformed message.
pub fn decode_data_records(
    body: &[u8],
    fields: &[TemplateFieldDef],
) -> Result<Vec<Vec<WireFieldValue>>, DecodeError> {
    let mut records = Vec::new();
    if fields.is_empty() {
        return Ok(records);
    }
    let mut remaining = body;
    while !remaining.is_empty() {
        let mut values = Vec::with_capacity(fields.len());
        let mut cursor = remaining;
        let mut truncated = false;
        for field in fields {
            let (after_len, field_length) = if field.variable_length {
                match read_varlen_prefix(cursor) {
                    Ok(v) => v,
                    Err(_) => {
                        truncated = true;
                        break;
                    }
                }
            } else {
                (cursor, field.length as usize)
            };
            if after_len.len() < field_length {
                truncated = true;
                break;
            }
            let (taken, after) = after_len.split_at(field_length);
            let field_type = classify_element(field.element, field_length as u16);
            let (_, value) = WireFieldValue::from_field_type(taken, field_type, field_length as u16)
                .map_err(fmt_err)?;
            values.push(value);
            cursor = after;
        }
        if truncated {
            break;
        }
        records.push(values);
        remaining = cursor;
    }
    Ok(records)
}
