use crate::value::ResultValue;
use std::cmp::Ordering;

/// Total canonical comparator used for group keys and pruning order.
///
/// Ordering rules:
/// 1. Canonical variant rank
/// 2. Variant-specific comparison for same-ranked values
///
/// Floats compare by IEEE total order, so NaN keys still land in one group.
#[must_use]
pub fn canonical_cmp(left: &ResultValue, right: &ResultValue) -> Ordering {
    let rank = canonical_rank(left).cmp(&canonical_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    canonical_cmp_same_rank(left, right)
}

const fn canonical_rank(value: &ResultValue) -> u8 {
    match value {
        ResultValue::Null => 0,
        ResultValue::Bool(_) => 1,
        ResultValue::Int(_) => 2,
        ResultValue::Float(_) => 3,
        ResultValue::Text(_) => 4,
        ResultValue::Raw(_) => 5,
        ResultValue::Vector(_) => 6,
    }
}

fn canonical_cmp_same_rank(left: &ResultValue, right: &ResultValue) -> Ordering {
    match (left, right) {
        (ResultValue::Bool(a), ResultValue::Bool(b)) => a.cmp(b),
        (ResultValue::Int(a), ResultValue::Int(b)) => a.cmp(b),
        (ResultValue::Float(a), ResultValue::Float(b)) => a.total_cmp(b),
        (ResultValue::Text(a), ResultValue::Text(b)) => a.cmp(b),
        (ResultValue::Raw(a), ResultValue::Raw(b)) => a.cmp(b),
        (ResultValue::Vector(a), ResultValue::Vector(b)) => canonical_cmp_slices(a, b),
        _ => Ordering::Equal,
    }
}

// Lexicographic, shorter prefix first.
fn canonical_cmp_slices(left: &[ResultValue], right: &[ResultValue]) -> Ordering {
    for (l, r) in left.iter().zip(right) {
        let cmp = canonical_cmp(l, r);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    left.len().cmp(&right.len())
}
