// Screen-grid state shared by client and server.
//
// A `DisplayFrame` is the full 80x21 map area as the player currently sees
// it. Each side keeps its own copy: the server's is the last frame it sent,
// the client's is the last frame it reconstructed. `delta.rs` keeps the two
// copies bit-identical by shipping only the differences.
//
// Storage is column-major (`columns[x][y]`) because the delta encoding works
// column by column.

use crate::error::ProtocolError;

/// Map width in cells.
pub const MAP_COLS: usize = 80;
/// Map height in cells.
pub const MAP_ROWS: usize = 21;
/// Integers in a cell payload on the wire.
pub const CELL_FIELDS: usize = 10;

/// What is drawn at one map location. All ids are small integers into the
/// server's drawing tables (see `get_drawing_info`); zero means "nothing".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DisplayCell {
    pub effect: u32,
    pub bg: u16,
    pub trap: u16,
    pub obj: u16,
    /// Monster type for corpses, statues and figurines.
    pub obj_mx: u16,
    pub mon: u16,
    pub monflags: u32,
    pub branding: u32,
    pub invis: bool,
    pub visible: bool,
}

impl DisplayCell {
    pub const EMPTY: DisplayCell = DisplayCell {
        effect: 0,
        bg: 0,
        trap: 0,
        obj: 0,
        obj_mx: 0,
        mon: 0,
        monflags: 0,
        branding: 0,
        invis: false,
        visible: false,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Wire order: effect, bg, trap, obj, obj_mx, mon, monflags, branding,
    /// invis, visible.
    pub fn to_fields(&self) -> [u64; CELL_FIELDS] {
        [
            u64::from(self.effect),
            u64::from(self.bg),
            u64::from(self.trap),
            u64::from(self.obj),
            u64::from(self.obj_mx),
            u64::from(self.mon),
            u64::from(self.monflags),
            u64::from(self.branding),
            u64::from(self.invis),
            u64::from(self.visible),
        ]
    }

    /// Inverse of `to_fields`, rejecting values that do not fit their field.
    pub fn from_fields(fields: &[u64]) -> Result<Self, ProtocolError> {
        if fields.len() != CELL_FIELDS {
            return Err(ProtocolError::BadDelta(format!(
                "cell payload has {} fields, expected {CELL_FIELDS}",
                fields.len()
            )));
        }
        Ok(Self {
            effect: narrow(fields[0], "effect")?,
            bg: narrow(fields[1], "bg")?,
            trap: narrow(fields[2], "trap")?,
            obj: narrow(fields[3], "obj")?,
            obj_mx: narrow(fields[4], "obj_mx")?,
            mon: narrow(fields[5], "mon")?,
            monflags: narrow(fields[6], "monflags")?,
            branding: narrow(fields[7], "branding")?,
            invis: flag(fields[8], "invis")?,
            visible: flag(fields[9], "visible")?,
        })
    }
}

fn narrow<T: TryFrom<u64>>(value: u64, field: &str) -> Result<T, ProtocolError> {
    T::try_from(value)
        .map_err(|_| ProtocolError::BadDelta(format!("{field} value {value} out of range")))
}

fn flag(value: u64, field: &str) -> Result<bool, ProtocolError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ProtocolError::BadDelta(format!(
            "{field} flag must be 0 or 1, got {value}"
        ))),
    }
}

pub type Column = [DisplayCell; MAP_ROWS];

/// The full map area, column-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayFrame {
    columns: Box<[Column; MAP_COLS]>,
}

impl Default for DisplayFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayFrame {
    /// An all-empty frame, the state both sides start a session with.
    pub fn new() -> Self {
        Self {
            columns: Box::new([[DisplayCell::EMPTY; MAP_ROWS]; MAP_COLS]),
        }
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<&DisplayCell> {
        self.columns.get(x)?.get(y)
    }

    pub fn cell_mut(&mut self, x: usize, y: usize) -> Option<&mut DisplayCell> {
        self.columns.get_mut(x)?.get_mut(y)
    }

    /// Set one cell; out-of-bounds coordinates are ignored and return false.
    pub fn set(&mut self, x: usize, y: usize, cell: DisplayCell) -> bool {
        match self.cell_mut(x, y) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// Panics if `x >= MAP_COLS`; callers iterate `0..MAP_COLS`.
    pub fn column(&self, x: usize) -> &Column {
        &self.columns[x]
    }

    pub(crate) fn column_mut(&mut self, x: usize) -> &mut Column {
        &mut self.columns[x]
    }

    pub fn clear(&mut self) {
        for column in self.columns.iter_mut() {
            *column = [DisplayCell::EMPTY; MAP_ROWS];
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns
            .iter()
            .all(|column| column.iter().all(DisplayCell::is_empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_fields_roundtrip_in_wire_order() {
        let cell = DisplayCell {
            effect: 1,
            bg: 2,
            trap: 3,
            obj: 4,
            obj_mx: 5,
            mon: 6,
            monflags: 7,
            branding: 8,
            invis: true,
            visible: false,
        };
        let fields = cell.to_fields();
        assert_eq!(fields, [1, 2, 3, 4, 5, 6, 7, 8, 1, 0]);
        assert_eq!(DisplayCell::from_fields(&fields).unwrap(), cell);
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let mut fields = [0u64; CELL_FIELDS];
        fields[1] = 70_000;
        assert!(DisplayCell::from_fields(&fields).is_err());

        let mut fields = [0u64; CELL_FIELDS];
        fields[9] = 2;
        assert!(DisplayCell::from_fields(&fields).is_err());

        assert!(DisplayCell::from_fields(&[0; 9]).is_err());
    }

    #[test]
    fn out_of_bounds_access_is_none() {
        let mut frame = DisplayFrame::new();
        assert!(frame.cell(MAP_COLS, 0).is_none());
        assert!(frame.cell(0, MAP_ROWS).is_none());
        assert!(!frame.set(MAP_COLS, 0, DisplayCell::EMPTY));
        assert!(frame.is_empty());
    }

    #[test]
    fn clear_resets_every_cell() {
        let mut frame = DisplayFrame::new();
        let wall = DisplayCell {
            bg: 1,
            visible: true,
            ..DisplayCell::EMPTY
        };
        assert!(frame.set(79, 20, wall));
        assert!(!frame.is_empty());
        frame.clear();
        assert_eq!(frame, DisplayFrame::new());
    }
}
