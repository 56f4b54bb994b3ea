//! Row identifiers (spec.md §3 "Row Id", I5).
//!
//! Physical ids are monotone integers minted by the [`crate::RecordStore`].
//! Virtual ids are minted by operators (group, unwind, join) that produce
//! records with no single upstream row; they are a deterministic pure
//! function of their derivation inputs so that re-compiling a pipeline and
//! re-feeding the live set reproduces the same ids (P6).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A physical row id, as minted by the record store. Never reused.
pub type PhysicalId = u64;

/// A stable identifier for a row anywhere in a compiled pipeline: either a
/// physical id from the store, or a virtual id derived by an operator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowId {
    Physical(PhysicalId),
    Virtual(Arc<str>),
}

impl RowId {
    pub fn physical(id: PhysicalId) -> RowId {
        RowId::Physical(id)
    }

    /// Mints a virtual id from a stage index and an ordered list of
    /// discriminator parts (e.g. the upstream row id and a group key's
    /// canonical rendering). The format is stable across re-derivation
    /// (I5): the same stage index and parts always yield the same id.
    pub fn virtual_id(stage_index: usize, parts: &[&str]) -> RowId {
        let mut buf = String::with_capacity(8 + parts.iter().map(|p| p.len() + 1).sum::<usize>());
        buf.push('v');
        buf.push_str(&stage_index.to_string());
        for part in parts {
            buf.push('\u{1f}'); // unit separator: parts never collide across arity
            buf.push_str(part);
        }
        RowId::Virtual(Arc::from(buf.as_str()))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, RowId::Physical(_))
    }

    pub fn as_physical(&self) -> Option<PhysicalId> {
        match self {
            RowId::Physical(id) => Some(*id),
            RowId::Virtual(_) => None,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Physical(id) => write!(f, "#{id}"),
            RowId::Virtual(tag) => write!(f, "{tag}"),
        }
    }
}
