//! Deltas: the unit of incremental propagation (spec.md §3 "Delta", GLOSSARY).

use std::ops::Neg;

use serde::{Deserialize, Serialize};

use crate::row_id::RowId;

/// Whether a row is entering (+1) or leaving (−1) a stage's output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    pub fn as_i8(self) -> i8 {
        match self {
            Sign::Positive => 1,
            Sign::Negative => -1,
        }
    }

    pub fn from_i8(v: i8) -> Sign {
        if v >= 0 {
            Sign::Positive
        } else {
            Sign::Negative
        }
    }
}

impl Neg for Sign {
    type Output = Sign;

    fn neg(self) -> Sign {
        match self {
            Sign::Positive => Sign::Negative,
            Sign::Negative => Sign::Positive,
        }
    }
}

/// A single `(row id, sign)` delta, per spec.md §3.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub row_id: RowId,
    pub sign: Sign,
}

impl Delta {
    pub fn add(row_id: RowId) -> Delta {
        Delta {
            row_id,
            sign: Sign::Positive,
        }
    }

    pub fn remove(row_id: RowId) -> Delta {
        Delta {
            row_id,
            sign: Sign::Negative,
        }
    }

    pub fn with_row_id(&self, row_id: RowId) -> Delta {
        Delta {
            row_id,
            sign: self.sign,
        }
    }

    pub fn negated(&self) -> Delta {
        Delta {
            row_id: self.row_id.clone(),
            sign: -self.sign,
        }
    }

    pub fn is_add(&self) -> bool {
        self.sign == Sign::Positive
    }
}
