//! Low-level field value parsing shared by NetFlow v9 and IPFIX wire
//! decoding.
//!
//! The rest of the crate's template/record/conversion machinery is data
//! driven (see [`crate::element`], [`crate::template`], [`crate::record`])
//! rather than built around per-protocol generated enums; [`data_number`]
//! is the one piece of field-level parsing it still needs directly.

pub mod data_number;
