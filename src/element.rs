//! Information element identity: the `(enterprise, id)` pair that names a
//! single IPFIX/NetFlow v9 field, plus named aliases over a preference-
//! ordered list of elements (spec §3 Column, §4.4 RecordParser).
//!
//! The teacher's `ipfix_lookup`/`v9_lookup` modules encode a fixed,
//! compile-time enum per known vendor. Columns here are configuration data,
//! not code, so elements are identified by their raw `(enterprise, id)`
//! pair at runtime instead of through a generated enum.

use serde::Serialize;

/// A single information element identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Element {
    pub enterprise: u32,
    pub id: u16,
}

impl Element {
    pub const fn new(enterprise: u32, id: u16) -> Self {
        Self { enterprise, id }
    }

    /// `true` for IANA-registered elements (enterprise number 0).
    pub fn is_iana(&self) -> bool {
        self.enterprise == 0
    }
}

/// An ordered list of alternative elements resolved in preference order:
/// the first element present in a given template wins. Multiple elements
/// resolving the same column is how the spec models forward/reverse biflow
/// pairs and vendor-specific equivalents of a standard field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alias {
    pub candidates: Vec<Element>,
}

impl Alias {
    pub fn new(candidates: Vec<Element>) -> Self {
        Self { candidates }
    }

    pub fn single(element: Element) -> Self {
        Self {
            candidates: vec![element],
        }
    }
}
