//! Square boolean boards and their text encoding
//!
//! A board encodes row-major, one `'1'`/`'0'` per cell, rows joined by a
//! single `'\n'` with no trailing separator. The codec knows nothing about
//! game rules; grid-reveal sessions store their bomb and revealed layouts
//! with it.

use std::fmt;

/// Rejection reasons when decoding a board
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty board text")]
    Empty,

    #[error("Expected {expected} rows, found {found}")]
    RowCount { expected: usize, found: usize },

    #[error("Row {row} has {found} cells, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid cell {found:?} at ({row}, {col})")]
    InvalidCell { row: usize, col: usize, found: char },
}

/// N x N grid of booleans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: usize,
    cells: Vec<bool>,
}

impl Board {
    /// All-false board
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![false; size * size],
        }
    }

    /// Board with the given row-major cell indices set
    pub fn with_cells(size: usize, set: &[usize]) -> Self {
        let mut board = Self::new(size);
        for &idx in set {
            if let Some(cell) = board.cells.get_mut(idx) {
                *cell = true;
            }
        }
        board
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> Option<bool> {
        self.index(row, col).map(|idx| self.cells[idx])
    }

    /// Returns the previous value, or `None` when out of range.
    pub fn set(&mut self, row: usize, col: usize, value: bool) -> Option<bool> {
        let idx = self.index(row, col)?;
        Some(std::mem::replace(&mut self.cells[idx], value))
    }

    /// Number of cells set to true
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        self.cells.chunks(self.size.max(1))
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.size && col < self.size).then(|| row * self.size + col)
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.size * (self.size + 1));
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.extend(row.iter().map(|c| if *c { '1' } else { '0' }));
        }
        out
    }

    /// Decode text that must describe exactly a `size` x `size` board.
    pub fn decode(text: &str, size: usize) -> Result<Self, DecodeError> {
        if text.is_empty() {
            return Err(DecodeError::Empty);
        }

        let rows: Vec<&str> = text.split('\n').collect();
        if rows.len() != size {
            return Err(DecodeError::RowCount {
                expected: size,
                found: rows.len(),
            });
        }

        let mut cells = Vec::with_capacity(size * size);
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != size {
                return Err(DecodeError::RowLength {
                    row,
                    expected: size,
                    found,
                });
            }
            for (col, ch) in line.chars().enumerate() {
                match ch {
                    '1' => cells.push(true),
                    '0' => cells.push(false),
                    other => {
                        return Err(DecodeError::InvalidCell {
                            row,
                            col,
                            found: other,
                        })
                    }
                }
            }
        }

        Ok(Self { size, cells })
    }

    /// Decode a board whose size is implied by its row count.
    pub fn decode_square(text: &str) -> Result<Self, DecodeError> {
        if text.is_empty() {
            return Err(DecodeError::Empty);
        }
        let size = text.split('\n').count();
        Self::decode(text, size)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Serde adapter storing a [`Board`] as its text encoding.
pub mod text {
    use super::Board;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(board: &Board, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&board.encode())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Board, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Board::decode_square(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let board = Board::with_cells(3, &[0, 4, 8]);
        assert_eq!(board.encode(), "100\n010\n001");
        assert!(!board.encode().ends_with('\n'));
    }

    #[test]
    fn test_decode_matches_encode() {
        let board = Board::with_cells(4, &[1, 2, 7, 12, 15]);
        let decoded = Board::decode(&board.encode(), 4).expect("valid board");
        assert_eq!(decoded, board);
        assert_eq!(decoded.count(), 5);
    }

    #[test]
    fn test_decode_rejects_wrong_row_count() {
        assert_eq!(
            Board::decode("000\n000", 3),
            Err(DecodeError::RowCount { expected: 3, found: 2 })
        );
        // A trailing newline adds an empty row
        assert_eq!(
            Board::decode("00\n00\n", 2),
            Err(DecodeError::RowCount { expected: 2, found: 3 })
        );
    }

    #[test]
    fn test_decode_rejects_ragged_rows() {
        assert_eq!(
            Board::decode("000\n00\n000", 3),
            Err(DecodeError::RowLength { row: 1, expected: 3, found: 2 })
        );
    }

    #[test]
    fn test_decode_rejects_bad_cells() {
        assert_eq!(
            Board::decode("01\n0x", 2),
            Err(DecodeError::InvalidCell { row: 1, col: 1, found: 'x' })
        );
        assert!(matches!(
            Board::decode("01\r\n00", 2),
            Err(DecodeError::RowLength { .. })
        ));
        assert_eq!(Board::decode("", 2), Err(DecodeError::Empty));
    }

    #[test]
    fn test_get_and_set_bounds() {
        let mut board = Board::new(2);
        assert_eq!(board.set(1, 1, true), Some(false));
        assert_eq!(board.get(1, 1), Some(true));
        assert_eq!(board.get(2, 0), None);
        assert_eq!(board.set(0, 2, true), None);
        assert_eq!(board.count(), 1);
    }

    #[test]
    fn test_serde_adapter() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Holder {
            #[serde(with = "text")]
            board: Board,
        }

        let json = serde_json::to_string(&Holder { board: Board::with_cells(2, &[3]) }).unwrap();
        assert_eq!(json, r#"{"board":"00\n01"}"#);

        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.board.get(1, 1), Some(true));

        assert!(serde_json::from_str::<Holder>(r#"{"board":"00\n0"}"#).is_err());
    }
}
