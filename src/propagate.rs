//! Fixed-point propagation: line-solve every pending row and column, and
//! whenever a cell narrows, requeue the crossing line at a higher priority.

use std::cmp::Reverse;
use std::collections::HashSet;

use colored::Colorize;
use log::debug;
use priority_queue::PriorityQueue;

use crate::board::{Axis, Board};
use crate::error::SolveError;
use crate::line_solve::{Cell, LineCaches, Method, line_matches, solve_line};

type Job = (Axis, usize);
// Smallest-first, rows before columns, then lower indexes.
type Priority = Reverse<(i32, Axis, usize)>;

#[derive(Clone, Debug)]
pub struct PropagateOptions {
    /// Row indexes to seed the queue with; `None` means all of them.
    pub rows: Option<Vec<usize>>,
    /// Column indexes to seed the queue with; `None` means all of them.
    pub columns: Option<Vec<usize>>,
    /// Re-validate already-solved lines instead of trusting them. Used by
    /// the search driver so planted conflicts surface.
    pub contradiction_mode: bool,
    /// Methods to run, each to its own fixed point before the next. Chaining
    /// a fast incomplete method before a complete one is encouraged.
    pub methods: Vec<Method>,
    /// Print every line-solving step, with changed cells highlighted.
    pub trace: bool,
}

impl Default for PropagateOptions {
    fn default() -> Self {
        PropagateOptions {
            rows: None,
            columns: None,
            contradiction_mode: false,
            methods: vec![Method::default()],
            trace: false,
        }
    }
}

impl PropagateOptions {
    pub fn restricted_to(row: usize, column: usize) -> PropagateOptions {
        PropagateOptions {
            rows: Some(vec![row]),
            columns: Some(vec![column]),
            contradiction_mode: true,
            ..PropagateOptions::default()
        }
    }
}

/// Run propagation to a fixed point. Returns the number of cells solved.
/// A line contradiction aborts the run and leaves the board partially
/// updated; callers in speculative contexts snapshot around this.
pub fn propagate(
    board: &mut Board,
    caches: &mut LineCaches,
    options: &PropagateOptions,
) -> Result<usize, SolveError> {
    let mut total_solved = 0;
    let mut rows = options.rows.clone();
    let mut columns = options.columns.clone();

    for method in &options.methods {
        let (solved, touched) = propagate_with_method(
            board,
            caches,
            *method,
            rows.as_deref(),
            columns.as_deref(),
            options,
        )?;
        total_solved += solved;

        // The next method picks up from every line this one looked at.
        rows = Some(
            touched
                .iter()
                .filter(|(axis, _)| *axis == Axis::Row)
                .map(|(_, idx)| *idx)
                .collect(),
        );
        columns = Some(
            touched
                .iter()
                .filter(|(axis, _)| *axis == Axis::Column)
                .map(|(_, idx)| *idx)
                .collect(),
        );
    }

    if !options.contradiction_mode {
        board.round_completed();
    }

    Ok(total_solved)
}

fn propagate_with_method(
    board: &mut Board,
    caches: &mut LineCaches,
    method: Method,
    rows: Option<&[usize]>,
    columns: Option<&[usize]>,
    options: &PropagateOptions,
) -> Result<(usize, HashSet<Job>), SolveError> {
    // `is_solved_full` costs a full scan; skip it when only a handful of
    // lines is queued anyway.
    let unrestricted = rows.is_none() || columns.is_none();
    if unrestricted && !options.contradiction_mode && board.is_solved_full() {
        return Ok((0, HashSet::new()));
    }

    let mut queue: PriorityQueue<Job, Priority> = PriorityQueue::new();
    let mut all_jobs = HashSet::new();

    let enqueue = |queue: &mut PriorityQueue<Job, Priority>, job: Job, priority: i32| {
        queue.push_increase(job, Reverse((priority, job.0, job.1)));
    };

    match rows {
        Some(indexes) => {
            for &index in indexes {
                enqueue(&mut queue, (Axis::Row, index), 0);
            }
        }
        None => {
            for index in 0..board.height() {
                enqueue(&mut queue, (Axis::Row, index), 0);
            }
        }
    }
    match columns {
        Some(indexes) => {
            for &index in indexes {
                enqueue(&mut queue, (Axis::Column, index), 0);
            }
        }
        None => {
            for index in 0..board.width() {
                enqueue(&mut queue, (Axis::Column, index), 0);
            }
        }
    }

    let mut lines_solved = 0_usize;
    let mut total_solved = 0_usize;

    while let Some(((axis, index), Reverse((priority, _, _)))) = queue.pop() {
        all_jobs.insert((axis, index));

        let (cells_solved, changed) = solve_lane(board, caches, axis, index, method, options)?;
        total_solved += cells_solved;
        lines_solved += 1;

        let crossing = match axis {
            Axis::Row => Axis::Column,
            Axis::Column => Axis::Row,
        };
        for cell_index in changed {
            // Fresher information sorts sooner.
            enqueue(&mut queue, (crossing, cell_index), priority - 1);
            all_jobs.insert((crossing, cell_index));
        }
    }

    debug!(
        "method {:?}: {} lines solved, {} cells fixed",
        method, lines_solved, total_solved
    );

    Ok((total_solved, all_jobs))
}

/// Solve one lane in place. Returns how many of its cells became fully
/// solved and which positions changed at all.
fn solve_lane(
    board: &mut Board,
    caches: &mut LineCaches,
    axis: Axis,
    index: usize,
    method: Method,
    options: &PropagateOptions,
) -> Result<(usize, Vec<usize>), SolveError> {
    let desc = board.description(axis, index).clone();

    {
        let lane = board.lane(axis, index);
        if lane.iter().all(Cell::is_solved) {
            // Trusted mode skips solved lines; contradiction mode re-checks
            // them against the clue, cheaply.
            if options.contradiction_mode {
                let cells: Vec<Cell> = lane.iter().copied().collect();
                if !line_matches(&desc, &cells) {
                    return Err(SolveError::Line(format!(
                        "solved {:?} {} does not match {:?}",
                        axis, index, desc
                    )));
                }
            }
            return Ok((0, vec![]));
        }
    }

    let orig_version_of_line: Option<Vec<Cell>> = if options.trace {
        Some(board.lane(axis, index).to_vec())
    } else {
        None
    };

    let mut lane = board.lane_mut(axis, index);
    let refinement = solve_line(&desc, &mut lane, method, caches)?;

    let newly_solved = refinement
        .affected_cells
        .iter()
        .filter(|idx| lane[**idx].is_solved())
        .count();
    drop(lane);

    if let Some(orig) = orig_version_of_line {
        display_step(board, axis, index, method, &orig);
    }

    if !refinement.affected_cells.is_empty() {
        match axis {
            Axis::Row => board.row_updated(index),
            Axis::Column => board.column_updated(index),
        }
    }

    Ok((newly_solved, refinement.affected_cells))
}

/// One traced line-solving step: the clue, then the lane with every cell
/// the solver changed underlined.
fn display_step(board: &Board, axis: Axis, index: usize, method: Method, orig: &[Cell]) {
    use std::fmt::Write;

    let mut clues = String::new();
    for block in board.description(axis, index) {
        write!(clues, "{} ", block.to_string(&board.puzzle)).unwrap();
    }

    let r_or_c = if axis == Axis::Row { "R" } else { "C" };
    print!("{}{: <3} {: >16} {} ", r_or_c, index + 1, clues, method.ch());

    for (orig, now) in orig.iter().zip(board.lane(axis, index)) {
        let new_ch = match now.solved_color() {
            None => "?".to_string(),
            Some(color) => board.puzzle.palette[&color].ch.to_string(),
        };

        if *orig != *now {
            print!("{}", new_ch.underline());
        } else {
            print!("{}", new_ch);
        }
    }
    println!();
}
