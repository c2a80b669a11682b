#![forbid(unsafe_code)]

//! Conversions between flat positional entry lists and sparse coordinate maps.
//!
//! A flat list of a `rows x cols` matrix holds `rows * cols` values. Under
//! [`EntryOrder::RowMajor`] index `k` addresses `(k / cols, k % cols)`; under
//! [`EntryOrder::ColumnMajor`] it addresses `(k % rows, k / rows)`.

use std::collections::BTreeMap;
use std::fmt;

/// Sparse coordinate map keyed by `(row, col)`.
pub type CoordinateMap<T> = BTreeMap<(usize, usize), T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryOrder {
    #[default]
    RowMajor,
    ColumnMajor,
}

impl EntryOrder {
    #[must_use]
    pub const fn from_row_major(row_major: bool) -> Self {
        if row_major {
            Self::RowMajor
        } else {
            Self::ColumnMajor
        }
    }

    #[must_use]
    pub const fn is_row_major(self) -> bool {
        matches!(self, Self::RowMajor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    FlatLengthMismatch {
        expected: usize,
        actual: usize,
    },
    CoordinateOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    SizeOverflow {
        rows: usize,
        cols: usize,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlatLengthMismatch { expected, actual } => {
                write!(
                    f,
                    "flat entry list has wrong length: expected={expected}, actual={actual}"
                )
            }
            Self::CoordinateOutOfRange {
                row,
                col,
                rows,
                cols,
            } => write!(
                f,
                "coordinate ({row}, {col}) is outside a {rows}x{cols} matrix"
            ),
            Self::SizeOverflow { rows, cols } => {
                write!(f, "{rows}x{cols} entries do not fit in addressable memory")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

/// Number of positions in a `rows x cols` flat list.
pub fn entry_count(rows: usize, cols: usize) -> Result<usize, LayoutError> {
    rows.checked_mul(cols)
        .ok_or(LayoutError::SizeOverflow { rows, cols })
}

/// Coordinate addressed by flat index `index` under `order`.
#[must_use]
pub fn position(index: usize, rows: usize, cols: usize, order: EntryOrder) -> (usize, usize) {
    match order {
        EntryOrder::RowMajor => (index / cols, index % cols),
        EntryOrder::ColumnMajor => (index % rows, index / rows),
    }
}

/// Reads a coordinate map off into a zero-filled row-major list.
///
/// Later duplicates of a coordinate overwrite earlier ones.
pub fn dict_to_list<T, I>(
    entries: I,
    rows: usize,
    cols: usize,
    zero: &T,
) -> Result<Vec<T>, LayoutError>
where
    T: Clone,
    I: IntoIterator<Item = ((usize, usize), T)>,
{
    let len = entry_count(rows, cols)?;
    let mut out = vec![zero.clone(); len];
    for ((row, col), value) in entries {
        if row >= rows || col >= cols {
            return Err(LayoutError::CoordinateOutOfRange {
                row,
                col,
                rows,
                cols,
            });
        }
        out[row * cols + col] = value;
    }
    Ok(out)
}

/// Builds a coordinate map from a flat list, dropping values equal to `zero`.
///
/// A degenerate shape (`rows == 0` or `cols == 0`) yields an empty map
/// whatever the list holds.
pub fn list_to_dict<T>(
    entries: Vec<T>,
    rows: usize,
    cols: usize,
    order: EntryOrder,
    zero: &T,
) -> Result<CoordinateMap<T>, LayoutError>
where
    T: PartialEq,
{
    let mut out = CoordinateMap::new();
    if rows == 0 || cols == 0 {
        return Ok(out);
    }

    let expected = entry_count(rows, cols)?;
    if entries.len() != expected {
        return Err(LayoutError::FlatLengthMismatch {
            expected,
            actual: entries.len(),
        });
    }

    for (index, value) in entries.into_iter().enumerate() {
        if value != *zero {
            out.insert(position(index, rows, cols, order), value);
        }
    }
    Ok(out)
}

/// Reorders a flat list given in `order` into row-major order.
pub fn to_row_major<T>(
    entries: Vec<T>,
    rows: usize,
    cols: usize,
    order: EntryOrder,
) -> Result<Vec<T>, LayoutError>
where
    T: Clone,
{
    let expected = entry_count(rows, cols)?;
    if entries.len() != expected {
        return Err(LayoutError::FlatLengthMismatch {
            expected,
            actual: entries.len(),
        });
    }
    if order.is_row_major() || rows <= 1 || cols <= 1 {
        return Ok(entries);
    }

    let mut out = Vec::with_capacity(expected);
    for k in 0..expected {
        let (row, col) = (k / cols, k % cols);
        out.push(entries[col * rows + row].clone());
    }
    Ok(out)
}

/// Swaps every coordinate, turning a column-keyed map into a row-keyed one.
#[must_use]
pub fn transpose_coordinates<T>(entries: CoordinateMap<T>) -> CoordinateMap<T> {
    entries
        .into_iter()
        .map(|((row, col), value)| ((col, row), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::{
        CoordinateMap, EntryOrder, LayoutError, dict_to_list, entry_count, list_to_dict, position,
        to_row_major, transpose_coordinates,
    };

    fn det_seed(parts: &[usize]) -> u64 {
        let mut hash = 0xcbf2_9ce4_8422_2325u64;
        for value in parts {
            for byte in value.to_le_bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
        }
        hash
    }

    fn build_property_log(
        test_id: &str,
        seed: u64,
        input_digest: u64,
        output_digest: u64,
        reason_code: &str,
    ) -> BTreeMap<String, String> {
        let mut log = BTreeMap::new();
        log.insert("suite_id".to_string(), "ms_layout_property".to_string());
        log.insert("test_id".to_string(), test_id.to_string());
        log.insert("seed".to_string(), seed.to_string());
        log.insert(
            "input_digest".to_string(),
            format!("det64:{input_digest:016x}"),
        );
        log.insert(
            "output_digest".to_string(),
            format!("det64:{output_digest:016x}"),
        );
        log.insert(
            "replay_command".to_string(),
            format!("cargo test -p ms-layout {test_id} -- --nocapture"),
        );
        log.insert("outcome".to_string(), "pass".to_string());
        log.insert("reason_code".to_string(), reason_code.to_string());
        log
    }

    fn assert_log_contract(log: &BTreeMap<String, String>) {
        for key in [
            "suite_id",
            "test_id",
            "seed",
            "input_digest",
            "output_digest",
            "replay_command",
            "outcome",
            "reason_code",
        ] {
            assert!(
                log.contains_key(key),
                "property log missing required key '{key}'"
            );
        }
    }

    #[test]
    fn dict_to_list_fills_zero_and_places_entries() {
        let mut entries = CoordinateMap::new();
        entries.insert((0, 0), 1);
        entries.insert((1, 1), 2);
        assert_eq!(
            dict_to_list(entries.clone(), 2, 2, &0),
            Ok(vec![1, 0, 0, 2])
        );
        assert_eq!(dict_to_list(entries, 2, 3, &0), Ok(vec![1, 0, 0, 0, 2, 0]));
    }

    #[test]
    fn dict_to_list_last_duplicate_wins() {
        let entries = vec![((0, 1), 5), ((0, 1), 7)];
        assert_eq!(dict_to_list(entries, 1, 2, &0), Ok(vec![0, 7]));
    }

    #[test]
    fn dict_to_list_rejects_out_of_range_coordinate() {
        let err = dict_to_list(vec![((2, 0), 1)], 2, 2, &0).expect_err("row 2 is out of range");
        assert_eq!(
            err,
            LayoutError::CoordinateOutOfRange {
                row: 2,
                col: 0,
                rows: 2,
                cols: 2
            }
        );
    }

    #[test]
    fn list_to_dict_skips_zero_values() {
        let map =
            list_to_dict(vec![1, 0, 0, 2], 2, 2, EntryOrder::RowMajor, &0).expect("length matches");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&(0, 0)), Some(&1));
        assert_eq!(map.get(&(1, 1)), Some(&2));
    }

    #[test]
    fn list_to_dict_column_major_reads_down_columns() {
        let map = list_to_dict(vec![1, 2, 3, 4], 2, 2, EntryOrder::ColumnMajor, &0)
            .expect("length matches");
        assert_eq!(map.get(&(0, 0)), Some(&1));
        assert_eq!(map.get(&(1, 0)), Some(&2));
        assert_eq!(map.get(&(0, 1)), Some(&3));
        assert_eq!(map.get(&(1, 1)), Some(&4));
    }

    #[test]
    fn list_to_dict_column_major_non_square_stays_in_range() {
        let map = list_to_dict(vec![1, 2, 3, 4, 5, 6], 2, 3, EntryOrder::ColumnMajor, &0)
            .expect("length matches");
        assert_eq!(map.get(&(1, 2)), Some(&6));
        assert_eq!(map.get(&(0, 1)), Some(&3));
        assert!(map.keys().all(|&(row, col)| row < 2 && col < 3));
    }

    #[test]
    fn list_to_dict_degenerate_shape_is_empty() {
        let map = list_to_dict(vec![1, 2, 3], 0, 3, EntryOrder::RowMajor, &0)
            .expect("degenerate shape never fails");
        assert!(map.is_empty());
        let map = list_to_dict(vec![9], 4, 0, EntryOrder::ColumnMajor, &0)
            .expect("degenerate shape never fails");
        assert!(map.is_empty());
    }

    #[test]
    fn list_to_dict_length_mismatch_fails_fast() {
        let err = list_to_dict(vec![1, 2, 3], 2, 2, EntryOrder::RowMajor, &0)
            .expect_err("three entries cannot fill 2x2");
        assert_eq!(
            err,
            LayoutError::FlatLengthMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn column_major_reorders_into_row_major() {
        assert_eq!(
            to_row_major(vec![1, 2, 3, 4], 2, 2, EntryOrder::ColumnMajor),
            Ok(vec![1, 3, 2, 4])
        );
        assert_eq!(
            to_row_major(vec![0, 4, 1, 5, 2, 6, 3, 7], 2, 4, EntryOrder::ColumnMajor),
            Ok(vec![0, 1, 2, 3, 4, 5, 6, 7])
        );
        assert_eq!(
            to_row_major(vec![1, 2, 3, 4], 2, 2, EntryOrder::RowMajor),
            Ok(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn position_matches_both_orders() {
        assert_eq!(position(5, 2, 3, EntryOrder::RowMajor), (1, 2));
        assert_eq!(position(5, 2, 3, EntryOrder::ColumnMajor), (1, 2));
        assert_eq!(position(1, 2, 3, EntryOrder::ColumnMajor), (1, 0));
    }

    #[test]
    fn entry_count_detects_overflow() {
        assert_eq!(entry_count(3, 4), Ok(12));
        assert!(matches!(
            entry_count(usize::MAX, 2),
            Err(LayoutError::SizeOverflow { .. })
        ));
    }

    #[test]
    fn transpose_swaps_coordinates() {
        let mut map = CoordinateMap::new();
        map.insert((0, 3), 'a');
        let swapped = transpose_coordinates(map);
        assert_eq!(swapped.get(&(3, 0)), Some(&'a'));
    }

    fn sparse_map_strategy() -> impl Strategy<Value = (usize, usize, CoordinateMap<i64>)> {
        (1usize..=5, 1usize..=5).prop_flat_map(|(rows, cols)| {
            let entry = ((0..rows, 0..cols), 1i64..=9);
            (
                Just(rows),
                Just(cols),
                prop::collection::btree_map(entry.0, entry.1, 0..=rows * cols),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_dict_list_round_trip((rows, cols, map) in sparse_map_strategy()) {
            let flat = dict_to_list(map.clone(), rows, cols, &0).expect("coordinates in range");
            prop_assert_eq!(flat.len(), rows * cols);
            let back = list_to_dict(flat, rows, cols, EntryOrder::RowMajor, &0)
                .expect("length matches");
            prop_assert_eq!(&back, &map);

            let seed = det_seed(&[rows, cols, map.len()]);
            let log = build_property_log(
                "prop_dict_list_round_trip",
                seed,
                seed,
                det_seed(&back.keys().map(|&(r, c)| r * cols + c).collect::<Vec<_>>()),
                "dict_list_round_trip_ok",
            );
            assert_log_contract(&log);
        }

        #[test]
        fn prop_column_major_map_is_transpose_of_row_major_square(
            side in 1usize..=5,
            values in prop::collection::vec(0i64..=3, 25),
        ) {
            let flat: Vec<i64> = values.into_iter().take(side * side).collect();
            let by_rows = list_to_dict(flat.clone(), side, side, EntryOrder::RowMajor, &0)
                .expect("length matches");
            let by_cols = list_to_dict(flat, side, side, EntryOrder::ColumnMajor, &0)
                .expect("length matches");
            prop_assert_eq!(transpose_coordinates(by_rows), by_cols);
        }
    }
}
