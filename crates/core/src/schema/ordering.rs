//! Sort ordering definitions for query results.

use alloc::string::String;
use alloc::vec::Vec;

/// Sort order for an ordering column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl Order {
    /// Applies this order to an ascending comparison result.
    #[inline]
    pub fn apply(self, ord: core::cmp::Ordering) -> core::cmp::Ordering {
        match self {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }
}

/// An ordered list of `(column, order)` pairs.
pub type Ordering = Vec<(String, Order)>;

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering as CmpOrdering;

    #[test]
    fn test_order_apply() {
        assert_eq!(Order::Asc.apply(CmpOrdering::Less), CmpOrdering::Less);
        assert_eq!(Order::Desc.apply(CmpOrdering::Less), CmpOrdering::Greater);
        assert_eq!(Order::Desc.apply(CmpOrdering::Equal), CmpOrdering::Equal);
        assert_eq!(Order::default(), Order::Asc);
    }
}
