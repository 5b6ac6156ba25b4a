//! Fixed grid layouts for 2-6 images
//!
//! Positions are fractional grid coordinates `(column, row)`; a cell origin
//! is `position * cell_size`, floored to whole pixels.

/// Column/row counts and per-image cell positions for one image count
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub columns: u32,
    pub rows: u32,
    pub positions: &'static [(f64, f64)],
}

const LAYOUT_2: GridLayout = GridLayout {
    columns: 2,
    rows: 1,
    positions: &[(0.0, 0.0), (1.0, 0.0)],
};

// Third image centered under the first row.
const LAYOUT_3: GridLayout = GridLayout {
    columns: 2,
    rows: 2,
    positions: &[(0.0, 0.0), (1.0, 0.0), (0.5, 1.0)],
};

const LAYOUT_4: GridLayout = GridLayout {
    columns: 2,
    rows: 2,
    positions: &[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)],
};

// Two images centered under a row of three.
const LAYOUT_5: GridLayout = GridLayout {
    columns: 3,
    rows: 2,
    positions: &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.5, 1.0), (1.5, 1.0)],
};

const LAYOUT_6: GridLayout = GridLayout {
    columns: 3,
    rows: 2,
    positions: &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 1.0), (1.0, 1.0), (2.0, 1.0)],
};

impl GridLayout {
    /// Layout for `count` images, or `None` outside 2..=6
    pub fn for_count(count: usize) -> Option<&'static GridLayout> {
        match count {
            2 => Some(&LAYOUT_2),
            3 => Some(&LAYOUT_3),
            4 => Some(&LAYOUT_4),
            5 => Some(&LAYOUT_5),
            6 => Some(&LAYOUT_6),
            _ => None,
        }
    }

    /// Canvas size for the given cell size
    pub fn canvas_size(&self, cell_width: u32, cell_height: u32) -> (u64, u64) {
        (
            cell_width as u64 * self.columns as u64,
            cell_height as u64 * self.rows as u64,
        )
    }

    /// Top-left pixel offsets of every cell for the given cell size
    pub fn cell_offsets(&self, cell_width: u32, cell_height: u32) -> Vec<(i64, i64)> {
        self.positions
            .iter()
            .map(|&(col, row)| {
                let x = (col * cell_width as f64).floor() as i64;
                let y = (row * cell_height as f64).floor() as i64;
                (x, y)
            })
            .collect()
    }
}
