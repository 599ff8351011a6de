//! Internal scalar type unification and target-column encoding (spec §4.5
//! DataTypeModel).
//!
//! Directly grounded on the original collector's `DataType` enum: variants
//! are declared in increasing-precision order *within* each family so that
//! `DataType::max(a, b)` is a correct upcast as long as `a` and `b` share a
//! family — exactly as the original's header comment warns ("Lowest to
//! highest precision. Keep it that way!").

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use serde::Serialize;

use crate::error::RecordError;
use crate::variable_versions::data_number::{DataNumber, FieldValue as WireFieldValue};

/// Internal unified scalar type. Declaration order within a family is
/// significant — see the module doc comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DataType {
    Invalid,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Ip,
    Ipv4,
    Ipv6,
    String,
    OctetArray,
    DatetimeSecs,
    DatetimeMillis,
    DatetimeMicros,
    DatetimeNanos,
    Mac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Int,
    UInt,
    Float,
    Ip,
    String,
    OctetArray,
    Datetime,
    Mac,
    Invalid,
}

impl DataType {
    fn family(self) -> Family {
        match self {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => Family::Int,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
                Family::UInt
            }
            DataType::Float32 | DataType::Float64 => Family::Float,
            DataType::Ip | DataType::Ipv4 | DataType::Ipv6 => Family::Ip,
            DataType::String => Family::String,
            DataType::OctetArray => Family::OctetArray,
            DataType::DatetimeSecs
            | DataType::DatetimeMillis
            | DataType::DatetimeMicros
            | DataType::DatetimeNanos => Family::Datetime,
            DataType::Mac => Family::Mac,
            DataType::Invalid => Family::Invalid,
        }
    }
}

/// Unifies two types that an alias column may resolve to, per spec §4.5.
///
/// Same-family pairs upcast to the higher-precision member. A mixed
/// IPv4/IPv6 pair always resolves to `Ipv6`, stored with the
/// `::ffff:0:0/96` v4-mapped prefix (spec §9 Open Question 4). Any other
/// cross-family pair is not unifiable.
pub fn unify_type(a: DataType, b: DataType) -> Option<DataType> {
    if a == b {
        return Some(a);
    }
    match (a.family(), b.family()) {
        (Family::Ip, Family::Ip) => Some(DataType::Ipv6),
        (fam_a, fam_b) if fam_a == fam_b => Some(a.max(b)),
        _ => None,
    }
}

/// IPv4-mapped IPv6 prefix `::ffff:0:0/96`.
pub fn v4_mapped(addr: Ipv4Addr) -> Ipv6Addr {
    addr.to_ipv6_mapped()
}

/// A scalar value encoded for the target column representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TargetValue {
    Null,
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    String(String),
    Bytes(Vec<u8>),
    Mac(String),
}

/// Converts a wire-parsed field value into the representation required by
/// `target`. Datetime precision follows the original's convention: seconds
/// and milliseconds are stored unsigned, microseconds and nanoseconds
/// signed (spec §4.5).
pub fn convert(value: &WireFieldValue, target: DataType) -> Result<TargetValue, RecordError> {
    let err = |reason: &str| RecordError::Conversion {
        enterprise: 0,
        id: 0,
        column: String::new(),
        reason: reason.to_string(),
    };

    match (value, target) {
        (WireFieldValue::DataNumber(n), DataType::Int8) => {
            Ok(TargetValue::I8(number_as_i64(n)? as i8))
        }
        (WireFieldValue::DataNumber(n), DataType::Int16) => {
            Ok(TargetValue::I16(number_as_i64(n)? as i16))
        }
        (WireFieldValue::DataNumber(n), DataType::Int32) => {
            Ok(TargetValue::I32(number_as_i64(n)? as i32))
        }
        (WireFieldValue::DataNumber(n), DataType::Int64) => {
            Ok(TargetValue::I64(number_as_i64(n)?))
        }
        (WireFieldValue::DataNumber(n), DataType::UInt8) => {
            Ok(TargetValue::U8(number_as_u64(n)? as u8))
        }
        (WireFieldValue::DataNumber(n), DataType::UInt16) => {
            Ok(TargetValue::U16(number_as_u64(n)? as u16))
        }
        (WireFieldValue::DataNumber(n), DataType::UInt32) => {
            Ok(TargetValue::U32(number_as_u64(n)? as u32))
        }
        (WireFieldValue::DataNumber(n), DataType::UInt64) => {
            Ok(TargetValue::U64(number_as_u64(n)?))
        }
        (WireFieldValue::DataNumber(n), DataType::DatetimeSecs)
        | (WireFieldValue::DataNumber(n), DataType::DatetimeMillis) => {
            Ok(TargetValue::U64(number_as_u64(n)?))
        }
        (WireFieldValue::DataNumber(n), DataType::DatetimeMicros)
        | (WireFieldValue::DataNumber(n), DataType::DatetimeNanos) => {
            Ok(TargetValue::I64(number_as_i64(n)?))
        }
        (WireFieldValue::Duration(d), DataType::DatetimeSecs) => {
            Ok(TargetValue::U64(d.as_secs()))
        }
        (WireFieldValue::Duration(d), DataType::DatetimeMillis) => {
            Ok(TargetValue::U64(duration_as_millis(d)))
        }
        (WireFieldValue::Duration(d), DataType::DatetimeMicros) => {
            Ok(TargetValue::I64(d.as_micros() as i64))
        }
        (WireFieldValue::Duration(d), DataType::DatetimeNanos) => {
            Ok(TargetValue::I64(d.as_nanos() as i64))
        }
        (WireFieldValue::Float64(f), DataType::Float32) => Ok(TargetValue::F32(*f as f32)),
        (WireFieldValue::Float64(f), DataType::Float64) => Ok(TargetValue::F64(*f)),
        (WireFieldValue::Ip4Addr(ip), DataType::Ipv4) => Ok(TargetValue::Ipv4(*ip)),
        (WireFieldValue::Ip4Addr(ip), DataType::Ipv6) => Ok(TargetValue::Ipv6(v4_mapped(*ip))),
        (WireFieldValue::Ip6Addr(ip), DataType::Ipv6) => Ok(TargetValue::Ipv6(*ip)),
        (WireFieldValue::String(s), DataType::String) => Ok(TargetValue::String(s.clone())),
        (WireFieldValue::MacAddr(s), DataType::Mac) => Ok(TargetValue::Mac(s.clone())),
        (WireFieldValue::Vec(v), DataType::OctetArray) => Ok(TargetValue::Bytes(v.clone())),
        (WireFieldValue::Unknown(v), DataType::OctetArray) => Ok(TargetValue::Bytes(v.clone())),
        _ => Err(err(&format!(
            "no conversion from {value:?} to {target:?}"
        ))),
    }
}

fn number_as_u64(n: &DataNumber) -> Result<u64, RecordError> {
    let v: usize = n.clone().into();
    Ok(v as u64)
}

fn number_as_i64(n: &DataNumber) -> Result<i64, RecordError> {
    let v: usize = n.clone().into();
    Ok(v as i64)
}

fn duration_as_millis(d: &Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
