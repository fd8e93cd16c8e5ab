//! Best-index planning protocol
//!
//! SQLite offers a table every predicate and ORDER BY term it could push down.
//! The module answers with an [`IndexResult`]: which constraints it claims, an
//! opaque index number and string that come back verbatim in `filter`, and
//! cost estimates. [`IndexPlan::from_result`] validates that answer and assigns
//! argv slots before anything is written back to the engine.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Constraint operator as reported by SQLite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Eq,
    Gt,
    Le,
    Lt,
    Ge,
    Match,
    Like,
    Glob,
    Regexp,
    Ne,
    IsNot,
    IsNotNull,
    IsNull,
    Is,
    Limit,
    Offset,
    /// Operator code this crate does not name (e.g. overloaded functions)
    Other(u8),
}

impl Op {
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => Op::Eq,
            4 => Op::Gt,
            8 => Op::Le,
            16 => Op::Lt,
            32 => Op::Ge,
            64 => Op::Match,
            65 => Op::Like,
            66 => Op::Glob,
            67 => Op::Regexp,
            68 => Op::Ne,
            69 => Op::IsNot,
            70 => Op::IsNotNull,
            71 => Op::IsNull,
            72 => Op::Is,
            73 => Op::Limit,
            74 => Op::Offset,
            other => Op::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Op::Eq => 2,
            Op::Gt => 4,
            Op::Le => 8,
            Op::Lt => 16,
            Op::Ge => 32,
            Op::Match => 64,
            Op::Like => 65,
            Op::Glob => 66,
            Op::Regexp => 67,
            Op::Ne => 68,
            Op::IsNot => 69,
            Op::IsNotNull => 70,
            Op::IsNull => 71,
            Op::Is => 72,
            Op::Limit => 73,
            Op::Offset => 74,
            Op::Other(code) => code,
        }
    }
}

/// One predicate term offered to `best_index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConstraint {
    /// Column index; -1 is the rowid
    pub column: i32,
    pub op: Op,
    pub usable: bool,
}

/// One ORDER BY term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: i32,
    pub desc: bool,
}

/// Extra planner input beyond constraints and ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexInfo {
    /// Bitmask of columns the statement reads
    pub col_used: u64,
}

impl IndexInfo {
    /// True if column `column` may be read by the statement
    ///
    /// Bit 63 stands for every column at index 63 or above.
    pub fn column_used(&self, column: usize) -> bool {
        let bit = column.min(63);
        self.col_used & (1u64 << bit) != 0
    }
}

/// Module answer to `best_index`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexResult {
    /// One flag per offered constraint, in offer order
    pub used: Vec<bool>,
    /// Optional per-constraint omit requests; missing entries mean false
    pub omit: Vec<bool>,
    pub idx_num: i32,
    pub idx_str: String,
    /// Rows come back already sorted per the ORDER BY terms
    pub already_ordered: bool,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    /// At most one row is returned
    pub unique_scan: bool,
}

impl IndexResult {
    /// Full-scan plan that claims none of `n` constraints
    pub fn full_scan(n: usize) -> Self {
        IndexResult {
            used: vec![false; n],
            estimated_cost: 1_000_000.0,
            estimated_rows: 1_000_000,
            ..Default::default()
        }
    }
}

/// Usage assigned to one constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConstraintUsage {
    /// 1-based position in the filter arguments, 0 when unused
    pub argv_index: i32,
    pub omit: bool,
}

/// Validated plan ready to be written back to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    pub usage: Vec<ConstraintUsage>,
    pub idx_num: i32,
    pub idx_str: String,
    pub order_by_consumed: bool,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    pub unique_scan: bool,
}

impl IndexPlan {
    /// Validate a module result against the constraints it was offered
    ///
    /// Fails without producing any usage if the result does not carry exactly
    /// one flag per constraint, or claims an unusable constraint. Claimed
    /// constraints receive argv slots 1..=k in offer order. OFFSET is never
    /// omitted: the engine must apply it itself.
    pub fn from_result(constraints: &[IndexConstraint], result: IndexResult) -> Result<Self> {
        if result.used.len() != constraints.len() {
            return Err(Error::PlanMismatch {
                expected: constraints.len(),
                got: result.used.len(),
            });
        }

        if let Some(i) = constraints
            .iter()
            .zip(&result.used)
            .position(|(c, &used)| used && !c.usable)
        {
            return Err(Error::UnusableConstraint(i));
        }

        let mut next_slot = 1;
        let usage = constraints
            .iter()
            .zip(&result.used)
            .enumerate()
            .map(|(i, (constraint, &used))| {
                if !used {
                    return ConstraintUsage::default();
                }
                let argv_index = next_slot;
                next_slot += 1;
                let requested = result.omit.get(i).copied().unwrap_or(false);
                ConstraintUsage {
                    argv_index,
                    omit: requested && constraint.op != Op::Offset,
                }
            })
            .collect();

        Ok(IndexPlan {
            usage,
            idx_num: result.idx_num,
            idx_str: result.idx_str,
            order_by_consumed: result.already_ordered,
            estimated_cost: result.estimated_cost,
            estimated_rows: result.estimated_rows,
            unique_scan: result.unique_scan,
        })
    }

    /// Number of filter arguments the engine will pass for this plan
    pub fn argc(&self) -> usize {
        self.usage.iter().filter(|u| u.argv_index > 0).count()
    }
}
