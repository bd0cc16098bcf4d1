// Incremental screen updates.
//
// `encode(prev, next)` describes `next` relative to `prev` using small
// sentinels so that a typical turn (a few cells change) costs a few hundred
// bytes instead of a full frame:
//
//   top level   0          every cell of `next` is empty
//               1          nothing changed (only sent for cursor-only moves)
//               [80 cols]  one entry per column, x = 0..80
//   column      0          every cell in the column is empty
//               1          column identical to `prev`
//               [21 cells] one entry per row, y = 0..21
//   cell        0          empty cell
//               1          cell identical to `prev`
//               [10 ints]  full cell payload, see `DisplayCell::to_fields`
//
// Columns test "empty" before "unchanged"; cells test "unchanged" before
// "empty". Both orders decode to the same frame; these choices keep the
// common cases (a freshly cleared column, a static wall) to a single digit.
//
// `apply` validates the whole delta before touching the frame, so a
// malformed delta leaves the receiver's copy exactly as it was. The caller
// then resynchronizes by reconnecting (client) or closing (server).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::display::{CELL_FIELDS, Column, DisplayCell, DisplayFrame, MAP_COLS, MAP_ROWS};
use crate::error::ProtocolError;

const ZERO: u64 = 0;
const UNCHANGED: u64 = 1;

/// A compact description of how to turn one frame into the next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayDelta {
    /// Every cell becomes empty.
    Cleared,
    /// Nothing changes.
    Unchanged,
    /// Exactly `MAP_COLS` entries.
    Columns(Vec<ColumnDelta>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnDelta {
    Zero,
    Unchanged,
    /// Exactly `MAP_ROWS` entries.
    Cells(Vec<CellDelta>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellDelta {
    Zero,
    Unchanged,
    Set(DisplayCell),
}

/// Describe `next` relative to `prev`. Returns `None` when the frames are
/// identical, in which case nothing needs to be sent.
pub fn encode(prev: &DisplayFrame, next: &DisplayFrame) -> Option<DisplayDelta> {
    if prev == next {
        return None;
    }

    let columns: Vec<ColumnDelta> = (0..MAP_COLS)
        .map(|x| encode_column(prev.column(x), next.column(x)))
        .collect();

    if columns.iter().all(|c| *c == ColumnDelta::Zero) {
        Some(DisplayDelta::Cleared)
    } else {
        Some(DisplayDelta::Columns(columns))
    }
}

fn encode_column(prev: &Column, next: &Column) -> ColumnDelta {
    if next.iter().all(DisplayCell::is_empty) {
        return ColumnDelta::Zero;
    }
    if prev == next {
        return ColumnDelta::Unchanged;
    }
    let cells = prev
        .iter()
        .zip(next.iter())
        .map(|(old, new)| {
            if old == new {
                CellDelta::Unchanged
            } else if new.is_empty() {
                CellDelta::Zero
            } else {
                CellDelta::Set(*new)
            }
        })
        .collect();
    ColumnDelta::Cells(cells)
}

/// Apply a delta to the receiver's copy of the previous frame.
///
/// The delta is checked in full first; on error the frame is untouched.
pub fn apply(frame: &mut DisplayFrame, delta: &DisplayDelta) -> Result<(), ProtocolError> {
    validate(delta)?;
    match delta {
        DisplayDelta::Cleared => frame.clear(),
        DisplayDelta::Unchanged => {}
        DisplayDelta::Columns(columns) => {
            for (x, column) in columns.iter().enumerate() {
                apply_column(frame.column_mut(x), column);
            }
        }
    }
    Ok(())
}

fn apply_column(target: &mut Column, delta: &ColumnDelta) {
    match delta {
        ColumnDelta::Zero => *target = [DisplayCell::EMPTY; MAP_ROWS],
        ColumnDelta::Unchanged => {}
        ColumnDelta::Cells(cells) => {
            for (slot, cell) in target.iter_mut().zip(cells) {
                match cell {
                    CellDelta::Zero => *slot = DisplayCell::EMPTY,
                    CellDelta::Unchanged => {}
                    CellDelta::Set(new) => *slot = *new,
                }
            }
        }
    }
}

fn validate(delta: &DisplayDelta) -> Result<(), ProtocolError> {
    let DisplayDelta::Columns(columns) = delta else {
        return Ok(());
    };
    if columns.len() != MAP_COLS {
        return Err(ProtocolError::BadDelta(format!(
            "{} columns, expected {MAP_COLS}",
            columns.len()
        )));
    }
    for (x, column) in columns.iter().enumerate() {
        let ColumnDelta::Cells(cells) = column else {
            continue;
        };
        if cells.len() != MAP_ROWS {
            return Err(ProtocolError::BadDelta(format!(
                "column {x} has {} rows, expected {MAP_ROWS}",
                cells.len()
            )));
        }
    }
    Ok(())
}

/// Decode a wire `dbuf` and apply it in one step.
pub fn apply_value(frame: &mut DisplayFrame, dbuf: &Value) -> Result<(), ProtocolError> {
    let delta = DisplayDelta::from_value(dbuf)?;
    apply(frame, &delta)
}

impl DisplayDelta {
    pub fn to_value(&self) -> Value {
        match self {
            DisplayDelta::Cleared => Value::from(ZERO),
            DisplayDelta::Unchanged => Value::from(UNCHANGED),
            DisplayDelta::Columns(columns) => {
                Value::Array(columns.iter().map(ColumnDelta::to_value).collect())
            }
        }
    }

    /// Parse and validate a wire `dbuf`.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Array(columns) => {
                if columns.len() != MAP_COLS {
                    return Err(ProtocolError::BadDelta(format!(
                        "{} columns, expected {MAP_COLS}",
                        columns.len()
                    )));
                }
                let columns = columns
                    .iter()
                    .enumerate()
                    .map(|(x, column)| ColumnDelta::from_value(x, column))
                    .collect::<Result<_, _>>()?;
                Ok(DisplayDelta::Columns(columns))
            }
            other => match sentinel(other, "frame")? {
                ZERO => Ok(DisplayDelta::Cleared),
                _ => Ok(DisplayDelta::Unchanged),
            },
        }
    }
}

impl ColumnDelta {
    fn to_value(&self) -> Value {
        match self {
            ColumnDelta::Zero => Value::from(ZERO),
            ColumnDelta::Unchanged => Value::from(UNCHANGED),
            ColumnDelta::Cells(cells) => Value::Array(cells.iter().map(CellDelta::to_value).collect()),
        }
    }

    fn from_value(x: usize, value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Array(cells) => {
                if cells.len() != MAP_ROWS {
                    return Err(ProtocolError::BadDelta(format!(
                        "column {x} has {} rows, expected {MAP_ROWS}",
                        cells.len()
                    )));
                }
                let cells = cells
                    .iter()
                    .map(CellDelta::from_value)
                    .collect::<Result<_, _>>()?;
                Ok(ColumnDelta::Cells(cells))
            }
            other => match sentinel(other, "column")? {
                ZERO => Ok(ColumnDelta::Zero),
                _ => Ok(ColumnDelta::Unchanged),
            },
        }
    }
}

impl CellDelta {
    fn to_value(&self) -> Value {
        match self {
            CellDelta::Zero => Value::from(ZERO),
            CellDelta::Unchanged => Value::from(UNCHANGED),
            CellDelta::Set(cell) => Value::from(cell.to_fields().to_vec()),
        }
    }

    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Array(fields) => {
                if fields.len() != CELL_FIELDS {
                    return Err(ProtocolError::BadDelta(format!(
                        "cell payload has {} fields, expected {CELL_FIELDS}",
                        fields.len()
                    )));
                }
                let fields = fields
                    .iter()
                    .map(|f| {
                        f.as_u64().ok_or_else(|| {
                            ProtocolError::BadDelta(format!("cell field {f} is not an unsigned integer"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CellDelta::Set(DisplayCell::from_fields(&fields)?))
            }
            other => match sentinel(other, "cell")? {
                ZERO => Ok(CellDelta::Zero),
                _ => Ok(CellDelta::Unchanged),
            },
        }
    }
}

/// Accept only the two sentinel integers.
fn sentinel(value: &Value, level: &str) -> Result<u64, ProtocolError> {
    match value.as_u64() {
        Some(n @ (ZERO | UNCHANGED)) => Ok(n),
        _ => Err(ProtocolError::BadDelta(format!(
            "unknown {level} sentinel {value}"
        ))),
    }
}

impl Serialize for DisplayDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DisplayDelta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DisplayDelta::from_value(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn wall() -> DisplayCell {
        DisplayCell {
            bg: 1,
            visible: true,
            ..DisplayCell::EMPTY
        }
    }

    fn filled(cell: DisplayCell) -> DisplayFrame {
        let mut frame = DisplayFrame::new();
        for x in 0..MAP_COLS {
            for y in 0..MAP_ROWS {
                frame.set(x, y, cell);
            }
        }
        frame
    }

    #[test]
    fn identical_frames_produce_no_delta() {
        let frame = filled(wall());
        assert_eq!(encode(&frame, &frame), None);
        assert_eq!(encode(&DisplayFrame::new(), &DisplayFrame::new()), None);
    }

    #[test]
    fn single_changed_cell_touches_one_column() {
        let prev = filled(wall());
        let mut next = prev.clone();
        let monster = DisplayCell {
            mon: 42,
            ..wall()
        };
        next.set(4, 3, monster);

        let wire = encode(&prev, &next).unwrap().to_value();
        let columns = wire.as_array().unwrap();
        assert_eq!(columns.len(), MAP_COLS);
        for (x, column) in columns.iter().enumerate() {
            if x == 4 {
                continue;
            }
            assert_eq!(column, &json!(1), "column {x}");
        }

        let rows = columns[4].as_array().unwrap();
        assert_eq!(rows.len(), MAP_ROWS);
        assert_eq!(rows.iter().filter(|r| **r == json!(1)).count(), 20);
        assert_eq!(rows[3], json!([0, 1, 0, 0, 0, 42, 0, 0, 0, 1]));
    }

    #[test]
    fn emptied_frame_is_the_zero_sentinel() {
        let prev = filled(wall());
        let delta = encode(&prev, &DisplayFrame::new()).unwrap();
        assert_eq!(delta, DisplayDelta::Cleared);
        assert_eq!(delta.to_value(), json!(0));

        let mut frame = prev;
        apply(&mut frame, &delta).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn empty_columns_use_the_column_zero_sentinel() {
        let prev = filled(wall());
        let mut next = DisplayFrame::new();
        next.set(10, 0, wall());
        let DisplayDelta::Columns(columns) = encode(&prev, &next).unwrap() else {
            panic!("expected per-column delta");
        };
        assert_eq!(columns[0], ColumnDelta::Zero);
        assert!(matches!(columns[10], ColumnDelta::Cells(_)));
    }

    #[test]
    fn unchanged_delta_is_a_no_op() {
        let mut frame = filled(wall());
        let before = frame.clone();
        apply_value(&mut frame, &json!(1)).unwrap();
        assert_eq!(frame, before);
    }

    #[test]
    fn malformed_deltas_leave_frame_untouched() {
        let mut good_column = vec![json!(1); MAP_ROWS];
        good_column[0] = json!([0, 1, 0, 0, 0, 0, 0, 0, 0, 1]);

        let mut short_row = vec![json!(0); MAP_COLS];
        short_row[0] = json!(vec![json!(1); MAP_ROWS - 1]);

        let mut bad_payload = vec![json!(0); MAP_COLS];
        bad_payload[1] = json!(good_column.clone());
        let mut bad_cells = good_column.clone();
        bad_cells[5] = json!([0, 1, 0]);
        bad_payload[2] = json!(bad_cells);

        let mut out_of_range = vec![json!(0); MAP_COLS];
        let mut cells = good_column;
        cells[0] = json!([0, 1, 0, 0, 0, 0, 0, 0, 7, 1]);
        out_of_range[0] = json!(cells);

        let mut bad_sentinel = vec![json!(1); MAP_COLS];
        bad_sentinel[79] = json!(2);

        for bad in [
            json!(2),
            json!("0"),
            json!(vec![json!(1); MAP_COLS - 1]),
            json!(short_row),
            json!(bad_payload),
            json!(out_of_range),
            json!(bad_sentinel),
        ] {
            let mut frame = filled(wall());
            let before = frame.clone();
            let err = apply_value(&mut frame, &bad).unwrap_err();
            assert!(matches!(err, ProtocolError::BadDelta(_)));
            assert_eq!(frame, before);
        }
    }

    #[test]
    fn apply_checks_constructed_deltas_too() {
        let mut frame = filled(wall());
        let before = frame.clone();
        let mut columns = vec![ColumnDelta::Zero; MAP_COLS];
        columns[MAP_COLS - 1] = ColumnDelta::Cells(vec![CellDelta::Zero; 3]);
        let err = apply(&mut frame, &DisplayDelta::Columns(columns)).unwrap_err();
        assert!(matches!(err, ProtocolError::BadDelta(_)));
        assert_eq!(frame, before);
    }

    #[test]
    fn serde_goes_through_the_sentinel_form() {
        let delta: DisplayDelta = serde_json::from_str("0").unwrap();
        assert_eq!(delta, DisplayDelta::Cleared);
        assert_eq!(serde_json::to_string(&DisplayDelta::Unchanged).unwrap(), "1");
        assert!(serde_json::from_str::<DisplayDelta>("[]").is_err());
    }

    fn cell() -> impl Strategy<Value = DisplayCell> {
        (
            0u32..4,
            0u16..4,
            0u16..3,
            0u16..3,
            0u16..2,
            0u16..3,
            0u32..3,
            0u32..2,
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(
                |(effect, bg, trap, obj, obj_mx, mon, monflags, branding, invis, visible)| {
                    DisplayCell {
                        effect,
                        bg,
                        trap,
                        obj,
                        obj_mx,
                        mon,
                        monflags,
                        branding,
                        invis,
                        visible,
                    }
                },
            )
    }

    fn frame() -> impl Strategy<Value = DisplayFrame> {
        prop::collection::vec((0..MAP_COLS, 0..MAP_ROWS, cell()), 0..120).prop_map(|edits| {
            let mut frame = DisplayFrame::new();
            for (x, y, cell) in edits {
                frame.set(x, y, cell);
            }
            frame
        })
    }

    proptest! {
        #[test]
        fn decode_of_encode_reproduces_next(prev in frame(), next in frame()) {
            let mut replica = prev.clone();
            if let Some(delta) = encode(&prev, &next) {
                let wire = serde_json::to_string(&delta).unwrap();
                let back: DisplayDelta = serde_json::from_str(&wire).unwrap();
                apply(&mut replica, &back).unwrap();
            }
            prop_assert_eq!(replica, next);
        }

        #[test]
        fn encoding_a_frame_against_itself_is_suppressed(f in frame()) {
            prop_assert_eq!(encode(&f, &f), None);
        }
    }
}
