use log::{debug, info};
use ndarray::{Array2, ArrayView1, ArrayViewMut1};

use crate::error::SolveError;
use crate::line_solve::Cell;
use crate::puzzle::{Color, Description, Puzzle};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub enum Axis {
    // Declaration order matters: jobs sort rows before columns.
    Row,
    Column,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct CellPosition {
    pub row: usize,
    pub col: usize,
}

/// A cell position plus a color to set there (or rule out).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct CellState {
    pub row: usize,
    pub col: usize,
    pub color: Color,
}

impl CellState {
    pub fn new(row: usize, col: usize, color: Color) -> CellState {
        CellState { row, col, color }
    }

    pub fn from_position(pos: CellPosition, color: Color) -> CellState {
        CellState {
            row: pos.row,
            col: pos.col,
            color,
        }
    }

    pub fn position(&self) -> CellPosition {
        CellPosition {
            row: self.row,
            col: self.col,
        }
    }
}

pub type Snapshot = Array2<Cell>;

pub type LineCallback = Box<dyn FnMut(usize)>;
pub type RoundCallback = Box<dyn FnMut()>;
pub type SolutionCallback = Box<dyn FnMut(&Snapshot)>;

/// The mutable solving state: the grid of candidate sets, plus observer
/// hooks and the solutions accumulated by search.
///
/// Observers are plain callables owning no reference back to the board;
/// they get indexes (or a finished grid) and fire synchronously.
pub struct Board {
    pub puzzle: Puzzle,
    cells: Array2<Cell>,
    full_candidates: u32,

    pub on_row_update: Option<LineCallback>,
    pub on_column_update: Option<LineCallback>,
    pub on_round_complete: Option<RoundCallback>,
    pub on_solution_found: Option<SolutionCallback>,

    pub solutions: Vec<Snapshot>,
    finished: bool,
}

impl Board {
    pub fn new(puzzle: Puzzle) -> Board {
        let init = Cell::new(&puzzle);
        let cells = Array2::from_elem((puzzle.height(), puzzle.width()), init);
        Board {
            puzzle,
            cells,
            full_candidates: init.candidate_count(),
            on_row_update: None,
            on_column_update: None,
            on_round_complete: None,
            on_solution_found: None,
            solutions: vec![],
            finished: false,
        }
    }

    pub fn width(&self) -> usize {
        self.puzzle.width()
    }

    pub fn height(&self) -> usize {
        self.puzzle.height()
    }

    pub fn cell(&self, pos: CellPosition) -> Cell {
        self.cells[[pos.row, pos.col]]
    }

    pub fn is_cell_solved(&self, pos: CellPosition) -> bool {
        self.cell(pos).is_solved()
    }

    pub fn lane(&self, axis: Axis, index: usize) -> ArrayView1<'_, Cell> {
        match axis {
            Axis::Row => self.cells.row(index),
            Axis::Column => self.cells.column(index),
        }
    }

    pub fn lane_mut(&mut self, axis: Axis, index: usize) -> ArrayViewMut1<'_, Cell> {
        match axis {
            Axis::Row => self.cells.row_mut(index),
            Axis::Column => self.cells.column_mut(index),
        }
    }

    pub fn description(&self, axis: Axis, index: usize) -> &Description {
        match axis {
            Axis::Row => &self.puzzle.rows[index],
            Axis::Column => &self.puzzle.cols[index],
        }
    }

    pub fn lane_count(&self, axis: Axis) -> usize {
        match axis {
            Axis::Row => self.height(),
            Axis::Column => self.width(),
        }
    }

    /// Commit a cell to a color. The only way cells get *solved* outside of
    /// line solving.
    pub fn set_state(&mut self, state: CellState) -> Result<(), SolveError> {
        let news = self.cells[[state.row, state.col]].learn(state.color)?;
        if news {
            self.row_updated(state.row);
            self.column_updated(state.col);
        }
        Ok(())
    }

    /// Remove a color from a cell's candidates. Emptying the cell is an
    /// error (the caller decides whether that dooms a branch or the puzzle).
    pub fn unset_state(&mut self, state: CellState) -> Result<(), SolveError> {
        let news = self.cells[[state.row, state.col]].learn_not(state.color)?;
        if news {
            self.row_updated(state.row);
            self.column_updated(state.col);
        }
        Ok(())
    }

    pub fn row_updated(&mut self, index: usize) {
        if let Some(callback) = self.on_row_update.as_mut() {
            callback(index);
        }
    }

    pub fn column_updated(&mut self, index: usize) {
        if let Some(callback) = self.on_column_update.as_mut() {
            callback(index);
        }
    }

    pub fn round_completed(&mut self) {
        if let Some(callback) = self.on_round_complete.as_mut() {
            callback();
        }
    }

    pub fn is_solved_full(&self) -> bool {
        self.cells.iter().all(Cell::is_solved)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn set_finished(&mut self) {
        self.finished = true;
    }

    /// How close a single cell is to solved: `(N - n) / (N - 1)` over the
    /// candidate counts, so a fresh cell scores 0 and a solved one scores 1.
    fn cell_rate(&self, cell: Cell) -> f64 {
        let full = self.full_candidates as f64;
        (full - cell.candidate_count() as f64) / (full - 1.0)
    }

    pub fn solution_rate(&self) -> f64 {
        let total: f64 = self.cells.iter().map(|cell| self.cell_rate(*cell)).sum();
        total / (self.width() * self.height()) as f64
    }

    pub fn lane_solution_rate(&self, axis: Axis, index: usize) -> f64 {
        let lane = self.lane(axis, index);
        let total: f64 = lane.iter().map(|cell| self.cell_rate(*cell)).sum();
        total / lane.len() as f64
    }

    pub fn unsolved_cells(&self) -> Vec<CellPosition> {
        let mut res = vec![];
        for row in 0..self.height() {
            for col in 0..self.width() {
                let pos = CellPosition { row, col };
                if !self.is_cell_solved(pos) {
                    res.push(pos);
                }
            }
        }
        res
    }

    pub fn neighbours(&self, pos: CellPosition) -> Vec<CellPosition> {
        let mut res = vec![];
        if pos.row > 0 {
            res.push(CellPosition {
                row: pos.row - 1,
                col: pos.col,
            });
        }
        if pos.row + 1 < self.height() {
            res.push(CellPosition {
                row: pos.row + 1,
                col: pos.col,
            });
        }
        if pos.col > 0 {
            res.push(CellPosition {
                row: pos.row,
                col: pos.col - 1,
            });
        }
        if pos.col + 1 < self.width() {
            res.push(CellPosition {
                row: pos.row,
                col: pos.col + 1,
            });
        }
        res
    }

    pub fn unsolved_neighbours(&self, pos: CellPosition) -> Vec<CellPosition> {
        self.neighbours(pos)
            .into_iter()
            .filter(|p| !self.is_cell_solved(*p))
            .collect()
    }

    // The cell values are `Copy`, so a snapshot is a flat clone of the grid.
    pub fn make_snapshot(&self) -> Snapshot {
        self.cells.clone()
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.cells = snapshot;
    }

    /// Run speculative work with a guaranteed restore on every exit path.
    pub fn scoped<R>(&mut self, work: impl FnOnce(&mut Board) -> R) -> R {
        let save = self.make_snapshot();
        let res = work(self);
        self.restore(save);
        res
    }

    /// Positions that differ from an older snapshot.
    pub fn changed(&self, old: &Snapshot) -> Vec<CellPosition> {
        let mut res = vec![];
        for row in 0..self.height() {
            for col in 0..self.width() {
                if self.cells[[row, col]] != old[[row, col]] {
                    res.push(CellPosition { row, col });
                }
            }
        }
        res
    }

    fn current_state_in_solutions(&mut self) -> bool {
        for i in 0..self.solutions.len() {
            if self.solutions[i] == self.cells {
                debug!("the solution is the same as the {}-th", i);
                if i > 2 {
                    // Repeats tend to cluster; keep the popular one up front.
                    let hit = self.solutions.remove(i);
                    self.solutions.insert(0, hit);
                }
                return true;
            }
        }
        false
    }

    /// Record the (fully solved) grid as a solution, unless it's already
    /// known. The caller is responsible for having verified it.
    pub fn add_solution(&mut self) {
        info!("found one of the solutions");
        if self.current_state_in_solutions() {
            info!("solution already exists");
            return;
        }

        let cells = self.make_snapshot();
        if let Some(callback) = self.on_solution_found.as_mut() {
            callback(&cells);
        }
        self.solutions.push(cells);
    }

    /// The grid as palette characters, '?' for unsolved cells.
    pub fn render(&self) -> String {
        let mut res = String::new();
        for row in 0..self.height() {
            for cell in self.cells.row(row) {
                match cell.solved_color() {
                    Some(color) => res.push(self.puzzle.palette[&color].ch),
                    None => res.push('?'),
                }
            }
            res.push('\n');
        }
        res
    }

    /// Render an arbitrary snapshot (e.g. a stored solution).
    pub fn render_snapshot(&self, snapshot: &Snapshot) -> String {
        let mut res = String::new();
        for row in snapshot.rows() {
            for cell in row {
                match cell.solved_color() {
                    Some(color) => res.push(self.puzzle.palette[&color].ch),
                    None => res.push('?'),
                }
            }
            res.push('\n');
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::{BACKGROUND, BOX};
    use std::cell::Cell as StdCell;
    use std::rc::Rc;

    fn tiny_board() -> Board {
        // 2x2, rows [1], [1], cols [1], [1] -- the ambiguous chessboard.
        Board::new(Puzzle::bw(vec![vec![1], vec![1]], vec![vec![1], vec![1]]).unwrap())
    }

    #[test]
    fn set_and_unset() {
        let mut board = tiny_board();
        let pos = CellPosition { row: 0, col: 0 };
        assert!(!board.is_cell_solved(pos));
        assert_eq!(board.solution_rate(), 0.0);

        board.set_state(CellState::new(0, 0, BOX)).unwrap();
        assert!(board.is_cell_solved(pos));
        assert_eq!(board.solution_rate(), 0.25);

        // Already committed: removing the same color now empties the cell.
        assert!(board.unset_state(CellState::new(0, 0, BOX)).is_err());
        // And setting a contradictory color fails.
        assert!(board.set_state(CellState::new(0, 0, BACKGROUND)).is_err());
    }

    #[test]
    fn snapshots_restore() {
        let mut board = tiny_board();
        let save = board.make_snapshot();
        board.set_state(CellState::new(1, 1, BOX)).unwrap();
        assert_eq!(board.changed(&save).len(), 1);

        board.restore(save);
        assert!(!board.is_cell_solved(CellPosition { row: 1, col: 1 }));
    }

    #[test]
    fn scoped_restores_on_both_paths() {
        let mut board = tiny_board();

        let res: Result<(), SolveError> = board.scoped(|b| {
            b.set_state(CellState::new(0, 0, BOX))?;
            Ok(())
        });
        assert!(res.is_ok());
        assert!(!board.is_cell_solved(CellPosition { row: 0, col: 0 }));

        let res: Result<(), SolveError> = board.scoped(|b| {
            b.set_state(CellState::new(0, 0, BOX))?;
            b.set_state(CellState::new(0, 0, BACKGROUND))?;
            Ok(())
        });
        assert!(res.is_err());
        assert!(!board.is_cell_solved(CellPosition { row: 0, col: 0 }));
    }

    #[test]
    fn callbacks_fire() {
        let mut board = tiny_board();
        let rows_touched = Rc::new(StdCell::new(0));
        let rows_touched_ = Rc::clone(&rows_touched);
        board.on_row_update = Some(Box::new(move |_idx| {
            rows_touched_.set(rows_touched_.get() + 1);
        }));

        board.set_state(CellState::new(0, 1, BOX)).unwrap();
        // A redundant set is not an update.
        board.set_state(CellState::new(0, 1, BOX)).unwrap();
        assert_eq!(rows_touched.get(), 1);
    }

    #[test]
    fn solution_dedup_and_promotion() {
        let mut board = tiny_board();

        board.set_state(CellState::new(0, 0, BOX)).unwrap();
        board.set_state(CellState::new(0, 1, BACKGROUND)).unwrap();
        board.set_state(CellState::new(1, 0, BACKGROUND)).unwrap();
        board.set_state(CellState::new(1, 1, BOX)).unwrap();
        board.add_solution();
        board.add_solution();
        assert_eq!(board.solutions.len(), 1);

        let first = board.make_snapshot();
        board.restore({
            let mut other = first.clone();
            other[[0, 0]] = Cell::from_color(BACKGROUND);
            other[[0, 1]] = Cell::from_color(BOX);
            other[[1, 0]] = Cell::from_color(BOX);
            other[[1, 1]] = Cell::from_color(BACKGROUND);
            other
        });
        board.add_solution();
        assert_eq!(board.solutions.len(), 2);
    }

    #[test]
    fn render_uses_palette_chars() {
        let mut board = tiny_board();
        board.set_state(CellState::new(0, 0, BOX)).unwrap();
        board.set_state(CellState::new(0, 1, BACKGROUND)).unwrap();
        assert_eq!(board.render(), "# \n??\n");
    }
}
