//! # Physical and Logical Properties
//!
//! Properties describe characteristics of a query plan's output. They are central to
//! the Cascades framework's handling of "interesting orders" and data distributions.
//!
//! ## Logical Properties
//!
//! Logical properties are shared by all expressions in a group because they describe
//! the *what* (which columns are produced). They are derived once, when the group is
//! created.
//!
//! ## Physical Properties
//!
//! Physical properties describe *how* data is organized at runtime:
//! - **Distribution**: how rows are spread across execution nodes (one node, a copy
//!   on every node, hash partitions on some columns, round-robin).
//! - **Order**: whether each stream is sorted on some keys.
//!
//! A parent states the properties it *requires* from a child; a physical plan
//! *delivers* properties. When the delivered properties do not satisfy the required
//! ones, the optimizer inserts enforcers (see [`crate::enforcer`]).
//!
//! ## The "Any" Property Set
//!
//! `PhysicalPropertySet::any()` represents "no requirements". Used as a *delivered*
//! value, `DistributionSpec::Any` means the plan gives no guarantee about placement.

use crate::expr::{ColumnRef, SortKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical properties are derived from the logical content of a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogicalProperties {
    /// Output columns of this group, in order.
    pub output_columns: Vec<ColumnRef>,
}

/// How rows are placed across execution nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionSpec {
    /// No requirement / no guarantee.
    #[default]
    Any,
    /// All rows on one node.
    Singleton,
    /// Every row present on every node.
    Broadcast,
    /// Rows with equal values of these columns live on the same node.
    HashPartitioned(Vec<ColumnRef>),
    /// Rows spread evenly with no locality.
    RoundRobin,
}

impl DistributionSpec {
    pub fn is_any(&self) -> bool {
        matches!(self, DistributionSpec::Any)
    }

    /// Whether a plan delivering `delivered` meets this requirement.
    ///
    /// Hash partitioning needs the exact same column list: two inputs hashed on
    /// `[a, b]` and `[a]` are not co-located with each other.
    pub fn satisfied_by(&self, delivered: &DistributionSpec) -> bool {
        match self {
            DistributionSpec::Any => true,
            required => required == delivered,
        }
    }
}

impl fmt::Display for DistributionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionSpec::Any => f.write_str("ANY"),
            DistributionSpec::Singleton => f.write_str("SINGLETON"),
            DistributionSpec::Broadcast => f.write_str("BROADCAST"),
            DistributionSpec::HashPartitioned(cols) => {
                f.write_str("HASH(")?;
                for (i, c) in cols.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
            DistributionSpec::RoundRobin => f.write_str("ROUND_ROBIN"),
        }
    }
}

/// Ordering of each output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSpec {
    #[default]
    Any,
    Sorted(Vec<SortKey>),
}

impl OrderSpec {
    pub fn is_any(&self) -> bool {
        matches!(self, OrderSpec::Any)
    }

    /// The required keys must be a prefix of the delivered keys: output sorted on
    /// `a, b, c` also satisfies `ORDER BY a, b`.
    pub fn satisfied_by(&self, delivered: &OrderSpec) -> bool {
        match (self, delivered) {
            (OrderSpec::Any, _) => true,
            (OrderSpec::Sorted(_), OrderSpec::Any) => false,
            (OrderSpec::Sorted(required), OrderSpec::Sorted(provided)) => {
                required.len() <= provided.len()
                    && required.iter().zip(provided.iter()).all(|(r, p)| r == p)
            }
        }
    }
}

/// Physical properties describe how data is physically organized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalPropertySet {
    pub distribution: DistributionSpec,
    pub order: OrderSpec,
}

impl PhysicalPropertySet {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn singleton() -> Self {
        Self::with_distribution(DistributionSpec::Singleton)
    }

    pub fn with_distribution(dist: DistributionSpec) -> Self {
        Self {
            distribution: dist,
            order: OrderSpec::Any,
        }
    }

    pub fn new(distribution: DistributionSpec, order: OrderSpec) -> Self {
        Self {
            distribution,
            order,
        }
    }

    /// Check if this requirement is satisfied by the given delivered properties.
    pub fn satisfied_by(&self, delivered: &PhysicalPropertySet) -> bool {
        self.distribution.satisfied_by(&delivered.distribution)
            && self.order.satisfied_by(&delivered.order)
    }

    pub fn is_any(&self) -> bool {
        self.distribution.is_any() && self.order.is_any()
    }
}

impl fmt::Display for PhysicalPropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.distribution)?;
        if let OrderSpec::Sorted(keys) = &self.order {
            f.write_str(" ORDER(")?;
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{k}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DataType, Expr};

    fn col(name: &str) -> ColumnRef {
        ColumnRef::new(Some("t"), name, 0, DataType::Int64)
    }

    #[test]
    fn test_any_is_always_satisfied() {
        let req = PhysicalPropertySet::any();
        assert!(req.satisfied_by(&PhysicalPropertySet::singleton()));
        assert!(req.satisfied_by(&PhysicalPropertySet::any()));
    }

    #[test]
    fn test_hash_partitioning_needs_same_columns() {
        let req = DistributionSpec::HashPartitioned(vec![col("a"), col("b")]);
        assert!(req.satisfied_by(&DistributionSpec::HashPartitioned(vec![col("a"), col("b")])));
        assert!(!req.satisfied_by(&DistributionSpec::HashPartitioned(vec![col("a")])));
        assert!(!req.satisfied_by(&DistributionSpec::RoundRobin));
        assert!(!DistributionSpec::Singleton.satisfied_by(&DistributionSpec::Broadcast));
    }

    #[test]
    fn test_sort_prefix() {
        let a = SortKey::asc(Expr::column(&col("a")));
        let b = SortKey::asc(Expr::column(&col("b")));
        let req = OrderSpec::Sorted(vec![a.clone()]);
        assert!(req.satisfied_by(&OrderSpec::Sorted(vec![a.clone(), b.clone()])));
        assert!(!req.satisfied_by(&OrderSpec::Sorted(vec![b])));
        assert!(!req.satisfied_by(&OrderSpec::Any));
    }
}
