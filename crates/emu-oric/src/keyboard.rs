//! Oric keyboard matrix.
//!
//! Eight rows selected by VIA port B bits 0-2, eight columns selected by
//! the sound chip's I/O port A (active low). The VIA sees the result on
//! PB3: high when any key in the selected row and columns is down.

use mos_via_6522::KeySense;

/// 8x8 keyboard matrix. `rows[r]` has bit `c` set while key (row=r, col=c)
/// is pressed.
#[derive(Debug, Clone, Default)]
pub struct KeyboardMatrix {
    rows: [u8; 8],
}

impl KeyboardMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a key. Out-of-range positions are ignored.
    pub fn set_key(&mut self, row: u8, col: u8, pressed: bool) {
        if row < 8 && col < 8 {
            if pressed {
                self.rows[row as usize] |= 1 << col;
            } else {
                self.rows[row as usize] &= !(1 << col);
            }
        }
    }

    /// Pressed-key bits for one row.
    #[must_use]
    pub fn row(&self, row: u8) -> u8 {
        self.rows.get(usize::from(row)).copied().unwrap_or(0)
    }

    pub fn release_all(&mut self) {
        self.rows = [0; 8];
    }

    /// View of the matrix with the given column select applied.
    #[must_use]
    pub fn scan(&self, column_select: u8) -> KeyboardScan<'_> {
        KeyboardScan {
            matrix: self,
            columns: !column_select,
        }
    }
}

/// Keyboard as seen by the VIA for one column selection.
#[derive(Debug, Clone, Copy)]
pub struct KeyboardScan<'a> {
    matrix: &'a KeyboardMatrix,
    /// Selected columns, 1 = selected.
    columns: u8,
}

impl KeySense for KeyboardScan<'_> {
    fn is_key_pressed(&self, row: u8) -> bool {
        self.matrix.row(row) & self.columns != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_keys_pressed() {
        let kbd = KeyboardMatrix::new();
        for row in 0..8 {
            assert!(!kbd.scan(0x00).is_key_pressed(row));
        }
    }

    #[test]
    fn key_seen_only_in_selected_column() {
        let mut kbd = KeyboardMatrix::new();
        kbd.set_key(4, 2, true);

        assert!(kbd.scan(!0x04).is_key_pressed(4));
        assert!(!kbd.scan(!0x08).is_key_pressed(4));
        assert!(!kbd.scan(0x00).is_key_pressed(3));
        assert!(!kbd.scan(0xFF).is_key_pressed(4), "no columns selected");
    }

    #[test]
    fn release_clears_keys() {
        let mut kbd = KeyboardMatrix::new();
        kbd.set_key(0, 0, true);
        kbd.set_key(7, 7, true);
        kbd.set_key(0, 0, false);
        assert_eq!(kbd.row(0), 0);
        assert_eq!(kbd.row(7), 0x80);

        kbd.release_all();
        assert_eq!(kbd.row(7), 0);
    }

    #[test]
    fn out_of_range_is_ignored() {
        let mut kbd = KeyboardMatrix::new();
        kbd.set_key(8, 0, true);
        kbd.set_key(0, 8, true);
        assert_eq!(kbd.row(0), 0);
        assert_eq!(kbd.row(8), 0);
    }
}
