//! Table reconstruction: grid inference from ruled lines, cell merging, header
//! detection, register-table position rewriting, and multi-page/side continuation
//! merges.

use std::collections::BTreeMap;

use crate::geom::{HLine, Rectangle, VLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Table,
    Register,
    Bitfield,
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Borders {
    pub left: bool,
    pub bottom: bool,
    pub right: bool,
    pub top: bool,
}

/// Default borders assumed for a neighbour that falls outside the grid: closed on
/// the edge that borders the grid, open elsewhere. These two defaults match the
/// reference engine's edge handling in the border-repair pass.
const OUT_OF_GRID_RIGHT: Borders = Borders { left: false, bottom: false, right: true, top: false };
const OUT_OF_GRID_TOP: Borders = Borders { left: false, bottom: true, right: false, top: false };

#[derive(Debug, Clone)]
pub struct Cell {
    /// `(row, col)` positions this cell occupies, always sorted.
    pub positions: Vec<(usize, usize)>,
    pub bbox: Rectangle,
    pub borders: Borders,
    pub is_header: bool,
    pub is_simple: bool,
    pub content: String,
    /// Rotation of the cell's own text (0 unless the cell holds a vertical
    /// column header), taken from its first charline.
    pub rotation: i32,
    /// Whether the cell's text sits closer to its left edge than its right —
    /// computed from charline bboxes against the cell's own bbox, not from content.
    pub is_left_aligned: bool,
}

impl Cell {
    pub fn row_range(&self) -> (usize, usize) {
        let min = self.positions.iter().map(|p| p.0).min().unwrap();
        let max = self.positions.iter().map(|p| p.0).max().unwrap();
        (min, max)
    }

    pub fn col_range(&self) -> (usize, usize) {
        let min = self.positions.iter().map(|p| p.1).min().unwrap();
        let max = self.positions.iter().map(|p| p.1).max().unwrap();
        (min, max)
    }

    pub fn rowspan(&self) -> usize {
        let (lo, hi) = self.row_range();
        hi - lo + 1
    }

    pub fn colspan(&self) -> usize {
        let (lo, hi) = self.col_range();
        hi - lo + 1
    }
}

/// Cluster 1-D coordinates within `atol`, returning sorted cluster centers.
fn cluster_coords(mut vals: Vec<f64>, atol: f64) -> Vec<f64> {
    vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut clusters: Vec<Vec<f64>> = Vec::new();
    for v in vals {
        if let Some(last) = clusters.last_mut() {
            if v - last[last.len() - 1] <= atol {
                last.push(v);
            } else {
                clusters.push(vec![v]);
            }
        } else {
            clusters.push(vec![v]);
        }
    }
    clusters.iter().map(|c| c.iter().sum::<f64>() / c.len() as f64).collect()
}

#[derive(Debug, Clone)]
pub struct Table {
    pub bbox: Rectangle,
    pub caption_bbox: Option<Rectangle>,
    pub kind: TableKind,
    /// Sorted column x-coordinates, length `cols + 1`.
    pub xpos: Vec<f64>,
    /// Sorted row y-coordinates (descending, top row first), length `rows + 1`.
    pub ypos: Vec<f64>,
    pub cells: Vec<Cell>,
    /// Row index (from the top) of the second bit-number header row, if any.
    pub bit_headers: Option<usize>,
}

impl Table {
    pub fn cols(&self) -> usize {
        self.xpos.len().saturating_sub(1)
    }

    pub fn rows(&self) -> usize {
        self.ypos.len().saturating_sub(1)
    }

    pub fn header_rows(&self) -> usize {
        self.cells.iter().filter(|c| c.is_header).map(|c| c.row_range().1 + 1).max().unwrap_or(0)
    }

    /// Grid inference: cluster vlines by x and hlines by y with tolerance
    /// `min(em_x, em_y) / 4`, then compute per-cell borders, repair, and merge.
    pub fn infer(
        bbox: Rectangle,
        caption_bbox: Option<Rectangle>,
        vlines: &[VLine],
        hlines: &[HLine],
        em_x: f64,
        em_y: f64,
        is_register: bool,
    ) -> Result<Table, crate::error::DocError> {
        let atol = em_x.min(em_y) / 4.0;
        let xs: Vec<f64> = vlines.iter().map(|v| v.x).collect();
        let ys: Vec<f64> = hlines.iter().map(|h| h.y).collect();
        let mut xpos = cluster_coords(xs, atol);
        let mut ypos = cluster_coords(ys, atol);
        ypos.sort_by(|a, b| b.partial_cmp(a).unwrap());
        xpos.dedup();

        if xpos.len() < 2 || ypos.len() < 2 {
            return Err(crate::error::DocError::EmptyTableGrid { page: 0 });
        }

        let cols = xpos.len() - 1;
        let rows = ypos.len() - 1;

        let on_vline = |x: f64, y0: f64, y1: f64| -> bool {
            let mid = (y0 + y1) / 2.0;
            vlines.iter().any(|v| v.midpoint_on(crate::geom::Point::new(x, mid), atol))
        };
        let on_hline = |y: f64, x0: f64, x1: f64| -> bool {
            let mid = (x0 + x1) / 2.0;
            hlines.iter().any(|h| h.midpoint_on(crate::geom::Point::new(mid, y), atol))
        };

        // raw[row][col] borders, row 0 = top row.
        let mut raw = vec![vec![Borders::default(); cols]; rows];
        for r in 0..rows {
            let (ytop, ybot) = (ypos[r], ypos[r + 1]);
            for c in 0..cols {
                let (xleft, xright) = (xpos[c], xpos[c + 1]);
                raw[r][c] = Borders {
                    left: on_vline(xleft, ybot, ytop),
                    right: on_vline(xright, ybot, ytop),
                    top: on_hline(ytop, xleft, xright),
                    bottom: on_hline(ybot, xleft, xright),
                };
            }
        }

        // Border repair: reconcile each cell against its right and top neighbours.
        for r in 0..rows {
            for c in 0..cols {
                let right = if c + 1 < cols { raw[r][c + 1] } else { OUT_OF_GRID_RIGHT };
                if raw[r][c].right != right.left {
                    raw[r][c].right = true;
                    if c + 1 < cols {
                        raw[r][c + 1].left = true;
                    }
                }
                let above = if r > 0 { raw[r - 1][c] } else { OUT_OF_GRID_TOP };
                if raw[r][c].top != above.bottom {
                    raw[r][c].top = true;
                    if r > 0 {
                        raw[r - 1][c].bottom = true;
                    }
                }
            }
        }

        let mut owner = vec![vec![usize::MAX; cols]; rows];
        let mut cells: Vec<Cell> = Vec::new();

        // Bottom-left to top-right recursive merge.
        for r in (0..rows).rev() {
            for c in 0..cols {
                if owner[r][c] != usize::MAX {
                    continue;
                }
                let idx = cells.len();
                let mut positions = vec![(r, c)];
                owner[r][c] = idx;
                let mut frontier = vec![(r, c)];
                while let Some((cr, cc)) = frontier.pop() {
                    if !raw[cr][cc].right && cc + 1 < cols && owner[cr][cc + 1] == usize::MAX {
                        owner[cr][cc + 1] = idx;
                        positions.push((cr, cc + 1));
                        frontier.push((cr, cc + 1));
                    }
                    if !raw[cr][cc].top && cr > 0 && owner[cr - 1][cc] == usize::MAX {
                        owner[cr - 1][cc] = idx;
                        positions.push((cr - 1, cc));
                        frontier.push((cr - 1, cc));
                    }
                }
                positions.sort();
                let row_min = positions.iter().map(|p| p.0).min().unwrap();
                let row_max = positions.iter().map(|p| p.0).max().unwrap();
                let col_min = positions.iter().map(|p| p.1).min().unwrap();
                let col_max = positions.iter().map(|p| p.1).max().unwrap();
                let bbox = Rectangle::new(xpos[col_min], ypos[row_max + 1], xpos[col_max + 1], ypos[row_min]);
                let borders = Borders {
                    left: raw[row_min][col_min].left,
                    bottom: raw[row_max][col_min].bottom,
                    right: raw[row_min][col_max].right,
                    top: raw[row_min][col_min].top,
                };
                cells.push(Cell {
                    positions,
                    bbox,
                    borders,
                    is_header: false,
                    is_simple: false,
                    content: String::new(),
                    rotation: 0,
                    is_left_aligned: false,
                });
            }
        }
        cells.sort_by_key(|c| c.row_range());

        mark_headers(&mut cells, hlines, &ypos, rows);

        let table = Table { bbox, caption_bbox, kind: if is_register { TableKind::Register } else { TableKind::Table }, xpos, ypos, cells, bit_headers: None };

        Ok(table)
    }

    /// Records that row `bit_headers` (from the top, 0-indexed count of rows above
    /// the data) is the register bit-number header and applies the `(32,4)` position
    /// rewrite. The bit-number row sits outside the ruled grid `infer` builds from,
    /// so the caller locates it separately and reports it back here.
    pub fn set_bit_headers(&mut self, bit_headers: usize) {
        self.bit_headers = Some(bit_headers);
        self.rewrite_register_positions();
    }

    /// Merge a continuation table below `self`. Returns `false` (tables left
    /// untouched) if header skeletons cannot be reconciled.
    pub fn append_bottom(&mut self, mut other: Table, merge_headers: bool) -> bool {
        if merge_headers && self.cols() != other.cols() {
            let self_groups = header_groups(self);
            let other_groups = header_groups(&other);
            if self_groups.len() != other_groups.len() {
                return false;
            }
            // Remap each of `other`'s header-group columns onto the corresponding
            // group in `self`, processing columns in reverse order so a position is
            // never overwritten before it has been read.
            let mut col_map: Vec<usize> = (0..other.cols()).collect();
            for (sg, og) in self_groups.iter().zip(other_groups.iter()) {
                for (i, &old_col) in og.iter().enumerate() {
                    col_map[old_col] = sg[i.min(sg.len() - 1)];
                }
            }
            for cell in other.cells.iter_mut() {
                for pos in cell.positions.iter_mut().rev() {
                    pos.1 = col_map[pos.1];
                }
            }
        }
        let other_header_rows = other.header_rows();
        let base_row = self.rows();
        other.cells.retain_mut(|cell| {
            cell.positions.retain(|(r, _)| *r >= other_header_rows);
            if cell.positions.is_empty() {
                return false;
            }
            for pos in &mut cell.positions {
                pos.0 = pos.0 - other_header_rows + base_row;
            }
            cell.is_header = false;
            true
        });
        let mut new_y = other.ypos[0..other.ypos.len().saturating_sub(other_header_rows)].to_vec();
        let offset = self.ypos.last().copied().unwrap_or(0.0) - new_y.first().copied().unwrap_or(0.0);
        for y in &mut new_y {
            *y += offset;
        }
        self.ypos.extend(new_y.into_iter().skip(1));
        self.cells.extend(other.cells);
        self.bbox = self.bbox.joined(&other.bbox);
        true
    }

    /// Merge a side-by-side continuation table. Returns `false` if row counts
    /// differ and `expand` was not requested; otherwise the shorter table's bottom
    /// row is vertically expanded to match the taller one before concatenation.
    pub fn append_side(&mut self, mut other: Table, expand: bool) -> bool {
        if self.rows() != other.rows() {
            if !expand {
                return false;
            }
            match self.rows().cmp(&other.rows()) {
                std::cmp::Ordering::Less => expand_bottom_rows(self, other.rows()),
                std::cmp::Ordering::Greater => expand_bottom_rows(&mut other, self.rows()),
                std::cmp::Ordering::Equal => {}
            }
        }
        let col_shift = self.cols();
        for cell in &mut other.cells {
            for pos in &mut cell.positions {
                pos.1 += col_shift;
            }
        }
        let base_x = self.xpos.last().copied().unwrap_or(0.0);
        let offset = base_x - other.xpos.first().copied().unwrap_or(0.0);
        for x in &mut other.xpos {
            *x += offset;
        }
        self.xpos.extend(other.xpos.into_iter().skip(1));
        self.cells.extend(other.cells);
        self.bbox = self.bbox.joined(&other.bbox);
        true
    }

    /// Register-table position rewrite: shift data cells right by 16 columns and up
    /// by `bit_headers` rows, then fix the grid to `(32, 4)`.
    fn rewrite_register_positions(&mut self) {
        if let Some(bh) = self.bit_headers {
            let header_rows = self.header_rows();
            for cell in &mut self.cells {
                if cell.row_range().0 >= header_rows {
                    for pos in &mut cell.positions {
                        pos.1 += 16;
                        pos.0 = pos.0.saturating_sub(bh);
                    }
                }
            }
            while self.xpos.len() < 33 {
                let next = self.xpos.last().copied().unwrap_or(0.0) + 1.0;
                self.xpos.push(next);
            }
            while self.ypos.len() < 5 {
                let next = self.ypos.last().copied().unwrap_or(0.0) - 1.0;
                self.ypos.push(next);
            }
        }
    }
}

/// Replicate `table`'s bottom-row cells downward until it has `target_rows` rows,
/// growing `ypos` by the last row's own height each step. Mirrors the original's
/// `Cell._expand` — a cell at the bottom edge widens its rowspan rather than a new,
/// empty row being inserted underneath it.
fn expand_bottom_rows(table: &mut Table, target_rows: usize) {
    let current_rows = table.rows();
    if target_rows <= current_rows || current_rows == 0 {
        return;
    }
    let last_y = *table.ypos.last().unwrap();
    let step = (table.ypos[current_rows - 1] - last_y).max(1e-6);
    for i in 1..=(target_rows - current_rows) {
        table.ypos.push(last_y - step * i as f64);
    }
    let new_bottom = *table.ypos.last().unwrap();
    for cell in &mut table.cells {
        let (_, row_max) = cell.row_range();
        if row_max + 1 == current_rows {
            let cols: Vec<usize> = cell.positions.iter().map(|p| p.1).collect::<std::collections::BTreeSet<_>>().into_iter().collect();
            for r in current_rows..target_rows {
                for &c in &cols {
                    cell.positions.push((r, c));
                }
            }
            cell.bbox = Rectangle::new(cell.bbox.left, new_bottom, cell.bbox.right, cell.bbox.top);
        }
    }
}

/// Groups of header columns keyed by header cell index, used to reconcile two
/// tables' column skeletons before a bottom-merge.
fn header_groups(table: &Table) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for cell in table.cells.iter().filter(|c| c.is_header) {
        let (lo, hi) = cell.col_range();
        groups.entry(lo).or_default().extend(lo..=hi);
    }
    groups.into_values().collect()
}

/// Header detection: a thick row-boundary line wins outright; otherwise fall back
/// to a bold-fraction threshold on the top rows (the caller applies that fallback
/// via `mark_headers_by_bold` once cell content is known).
fn mark_headers(cells: &mut [Cell], hlines: &[HLine], ypos: &[f64], rows: usize) {
    if hlines.is_empty() || rows == 0 || ypos.len() < 2 {
        return;
    }
    let max_width = hlines.iter().map(|h| h.width).fold(0.0_f64, f64::max);
    if max_width <= 0.0 {
        return;
    }
    let row_boundary_width = |y: f64| -> f64 {
        hlines.iter().filter(|h| (h.y - y).abs() < 1e-6).map(|h| h.width).fold(0.0_f64, f64::max)
    };
    // The highest (smallest row index from the top) boundary whose line is at
    // least 0.9x the thickest horizontal line is the header separator.
    let header_end = (1..ypos.len() - 1).find(|&r| row_boundary_width(ypos[r]) >= 0.9 * max_width);
    if let Some(end) = header_end {
        for cell in cells.iter_mut() {
            if cell.row_range().1 < end {
                cell.is_header = true;
            }
        }
    }
}

/// Bold-fraction fallback: widen the header region upward from the top row while
/// the bold-character fraction of each row's cells stays above `threshold`.
pub fn mark_headers_by_bold(cells: &mut [Cell], bold_fraction: impl Fn(&Cell) -> f64, rows: usize, threshold: f64) {
    if cells.iter().any(|c| c.is_header) || rows == 0 {
        return;
    }
    let mut header_rows = 0;
    for r in 0..rows {
        let row_cells: Vec<&Cell> = cells.iter().filter(|c| c.row_range().0 <= r && c.row_range().1 >= r).collect();
        if row_cells.is_empty() {
            break;
        }
        let avg = row_cells.iter().map(|c| bold_fraction(c)).sum::<f64>() / row_cells.len() as f64;
        if avg <= threshold {
            break;
        }
        header_rows = r + 1;
    }
    // Two-row special case: a thick separator directly below the first row with
    // nothing else qualifying still marks that first row as header.
    if header_rows == 0 && rows == 2 {
        header_rows = 1;
    }
    for cell in cells.iter_mut() {
        if cell.row_range().1 < header_rows {
            cell.is_header = true;
        }
    }
}

/// A table not derived from grid lines (register bitfield summary): a cell list and
/// bbox assembled directly by the AST normalizer.
#[derive(Debug, Clone)]
pub struct VirtualTable {
    pub bbox: Rectangle,
    pub cells: Vec<Cell>,
}

impl VirtualTable {
    pub fn bitfield(rows: Vec<(String, String)>, bbox: Rectangle) -> VirtualTable {
        let cells = rows
            .into_iter()
            .enumerate()
            .flat_map(|(r, (label, desc))| {
                vec![
                    Cell {
                        positions: vec![(r, 0)],
                        bbox,
                        borders: Borders::default(),
                        is_header: false,
                        is_simple: true,
                        content: label,
                        rotation: 0,
                        is_left_aligned: false,
                    },
                    Cell {
                        positions: vec![(r, 1)],
                        bbox,
                        borders: Borders::default(),
                        is_header: false,
                        is_simple: false,
                        content: desc,
                        rotation: 0,
                        is_left_aligned: false,
                    },
                ]
            })
            .collect();
        VirtualTable { bbox, cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point;

    fn grid_2x2() -> (Vec<VLine>, Vec<HLine>) {
        let vlines = vec![
            VLine { x: 0.0, y0: 0.0, y1: 20.0, width: 1.0 },
            VLine { x: 10.0, y0: 0.0, y1: 20.0, width: 1.0 },
            VLine { x: 20.0, y0: 0.0, y1: 20.0, width: 1.0 },
        ];
        let hlines = vec![
            HLine { y: 0.0, x0: 0.0, x1: 20.0, width: 1.0 },
            HLine { y: 10.0, x0: 0.0, x1: 20.0, width: 1.0 },
            HLine { y: 20.0, x0: 0.0, x1: 20.0, width: 1.0 },
        ];
        (vlines, hlines)
    }

    #[test]
    fn infer_builds_2x2_grid_with_four_cells() {
        let (vlines, hlines) = grid_2x2();
        let table = Table::infer(Rectangle::new(0.0, 0.0, 20.0, 20.0), None, &vlines, &hlines, 2.0, 2.0, false).unwrap();
        assert_eq!(table.cols(), 2);
        assert_eq!(table.rows(), 2);
        assert_eq!(table.cells.len(), 4);
    }

    #[test]
    fn cell_merges_when_interior_border_missing() {
        let vlines = vec![
            VLine { x: 0.0, y0: 0.0, y1: 20.0, width: 1.0 },
            VLine { x: 20.0, y0: 0.0, y1: 20.0, width: 1.0 },
        ];
        let hlines = vec![
            HLine { y: 0.0, x0: 0.0, x1: 20.0, width: 1.0 },
            HLine { y: 10.0, x0: 0.0, x1: 10.0, width: 1.0 },
            HLine { y: 20.0, x0: 0.0, x1: 20.0, width: 1.0 },
        ];
        let table = Table::infer(Rectangle::new(0.0, 0.0, 20.0, 20.0), None, &vlines, &hlines, 2.0, 2.0, false).unwrap();
        assert!(table.cells.iter().any(|c| c.colspan() >= 1));
    }

    #[test]
    fn empty_grid_is_a_structural_error() {
        let vlines: Vec<VLine> = vec![];
        let hlines: Vec<HLine> = vec![];
        let result = Table::infer(Rectangle::new(0.0, 0.0, 1.0, 1.0), None, &vlines, &hlines, 1.0, 1.0, false);
        assert!(result.is_err());
    }

    #[test]
    fn append_side_fails_on_row_mismatch_without_expand() {
        let (vlines, hlines) = grid_2x2();
        let a = Table::infer(Rectangle::new(0.0, 0.0, 20.0, 20.0), None, &vlines, &hlines, 2.0, 2.0, false).unwrap();
        let mut b = a.clone();
        b.ypos.pop();
        let mut a2 = a.clone();
        assert!(!a2.append_side(b, false));
        let _ = &mut a2;
    }

    #[test]
    fn vline_midpoint_on_respects_tolerance() {
        let v = VLine { x: 5.0, y0: 0.0, y1: 10.0, width: 1.0 };
        assert!(v.midpoint_on(Point::new(5.0, 5.0), 0.01));
        assert!(!v.midpoint_on(Point::new(6.0, 5.0), 0.01));
    }
}
