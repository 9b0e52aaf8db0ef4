//! Duplicate row removal

use crate::error::Result;
use polars::prelude::*;

/// Remove rows identical to an earlier row, keeping first occurrences in order.
pub fn drop_duplicates(df: &DataFrame) -> Result<DataFrame> {
    if df.height() < 2 {
        return Ok(df.clone());
    }
    Ok(df.unique_stable(None, UniqueKeepStrategy::First, None)?)
}

/// Number of rows `drop_duplicates` would remove
pub fn duplicate_count(df: &DataFrame) -> Result<usize> {
    Ok(df.height() - drop_duplicates(df)?.height())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_first_occurrence_in_order() {
        let df = df!(
            "a" => &[1i64, 2, 1, 3, 2],
            "b" => &["x", "y", "x", "z", "w"],
        )
        .unwrap();
        let out = drop_duplicates(&df).unwrap();
        let a: Vec<i64> = out.column("a").unwrap().i64().unwrap().into_iter().flatten().collect();
        assert_eq!(a, vec![1, 2, 3, 2]);
        assert_eq!(duplicate_count(&df).unwrap(), 1);
    }

    #[test]
    fn test_idempotent() {
        let df = df!("a" => &[Some(1.0), None, Some(1.0), None]).unwrap();
        let once = drop_duplicates(&df).unwrap();
        let twice = drop_duplicates(&once).unwrap();
        assert_eq!(once.height(), 2);
        assert!(once.equals_missing(&twice));
    }
}
