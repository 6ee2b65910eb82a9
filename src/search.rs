//! The search driver: probing for contradictions on top of propagation, and
//! depth-first search on top of probing.
//!
//! Probing tries each candidate color of promising unsolved cells; a
//! contradiction forces the opposite color and opens new work. When a full
//! probing sweep finds nothing, the driver picks the highest-impact
//! `(cell, color)` guesses and recurses, learning from failed branches by
//! unsetting the failed color at the parent level.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use priority_queue::PriorityQueue;

use crate::board::{Board, CellPosition, CellState, Snapshot};
use crate::error::SolveError;
use crate::line_solve::{LineCaches, Method};
use crate::propagate::{PropagateOptions, propagate};
use crate::puzzle::Color;

#[derive(Clone, Debug)]
pub struct SolveOptions {
    /// Stop after recording this many distinct solutions.
    pub max_solutions: Option<usize>,
    /// Wall-clock budget for the search phase.
    pub timeout: Option<Duration>,
    /// Ceiling on the DFS path length. Deeper recursion than the default
    /// usually indicates pathological input.
    pub max_depth: usize,
    /// Line-solving methods, chained per propagation pass.
    pub methods: Vec<Method>,
    /// Blend each probe's queue priority into its DFS score. Heuristic;
    /// kept switchable because its benefit is puzzle-dependent.
    pub adjust_rate: bool,
    /// Prefer guessing at cells with fewer remaining candidates.
    pub few_colors_first: bool,
    /// Show a CLI spinner while solving.
    pub display_progress: bool,
    /// Print each line-solving step of the initial propagation, with the
    /// cells it changed highlighted. Speculative propagations stay quiet.
    pub trace_solve: bool,
}

pub const DEFAULT_MAX_DEPTH: usize = 400;

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            max_solutions: None,
            timeout: None,
            max_depth: DEFAULT_MAX_DEPTH,
            methods: vec![Method::default()],
            adjust_rate: true,
            few_colors_first: false,
            display_progress: false,
            trace_solve: false,
        }
    }
}

pub struct Report {
    pub solutions: Vec<Snapshot>,
    pub solution_rate: f64,
    pub depth_reached: usize,
    pub contradictions_found: usize,
}

// Probe queue priorities, smallest first. Fresh information beats the
// static placement heuristic.
const PRIORITY_NEIGHBOUR_OF_CONTRADICTION: f64 = 0.0;
const PRIORITY_NEIGHBOUR_OF_CHANGE: f64 = 1.0;

// Ties break on the cell position, so probe order is reproducible.
type ProbePriority = Reverse<(OrderedFloat<f64>, CellPosition)>;
type ProbeQueue = PriorityQueue<CellPosition, ProbePriority>;

fn probe_key(pos: CellPosition, priority: f64) -> ProbePriority {
    Reverse((OrderedFloat(priority), pos))
}

/// Outcome of probing one `(cell, color)` assumption.
enum ProbeOutcome {
    /// The cell got solved (or the color unset) since the job was queued.
    Expired,
    /// The assumption contradicts; the opposite has been committed, and
    /// these jobs should be probed next.
    Contradiction(Vec<(CellPosition, f64)>),
    /// The assumption propagates fine and would solve this many cells.
    Solved(usize),
}

/// Solve the board: propagation, then probing, then depth-first search.
/// Solutions end up both in the report and on the board.
pub fn solve(board: &mut Board, options: &SolveOptions) -> Result<Report, SolveError> {
    let mut caches = LineCaches::new();
    solve_with_caches(board, &mut caches, options)
}

pub fn solve_with_caches(
    board: &mut Board,
    caches: &mut LineCaches,
    options: &SolveOptions,
) -> Result<Report, SolveError> {
    let progress = ProgressBar::new_spinner();
    if !options.display_progress {
        progress.finish_and_clear();
    }

    let mut driver = Solver {
        board,
        caches,
        options,
        progress,
        depth_reached: 0,
        contradictions_found: 0,
        start_time: None,
        explored_paths: HashSet::new(),
    };
    driver.run()?;

    let report = Report {
        solutions: driver.board.solutions.clone(),
        solution_rate: driver.board.solution_rate(),
        depth_reached: driver.depth_reached,
        contradictions_found: driver.contradictions_found,
    };
    Ok(report)
}

struct Solver<'a> {
    board: &'a mut Board,
    caches: &'a mut LineCaches,
    options: &'a SolveOptions,
    progress: ProgressBar,

    depth_reached: usize,
    contradictions_found: usize,
    start_time: Option<Instant>,
    explored_paths: HashSet<Vec<CellState>>,
}

impl<'a> Solver<'a> {
    fn run(&mut self) -> Result<(), SolveError> {
        let options = PropagateOptions {
            methods: self.options.methods.clone(),
            trace: self.options.trace_solve,
            ..PropagateOptions::default()
        };
        // Errors at the root are not speculative: the puzzle itself is bad.
        propagate(self.board, self.caches, &options).map_err(Self::fatal)?;

        if self.board.is_solved_full() {
            info!("no need to solve with contradictions");
            self.add_solution().map_err(Self::fatal)?;
            self.board.set_finished();
            return Ok(());
        }

        warn!("trying to solve using contradictions");
        let (found, candidates) = self.probe_round(true).map_err(Self::fatal)?;
        self.contradictions_found = found;
        let rate = self.board.solution_rate();
        warn!("contradictions found: {} (rate {:.4})", found, rate);

        if rate < 1.0 {
            warn!("starting depth-first search (initial rate {:.4})", rate);
            let success = self.search(&candidates, &[])?;
            if !success && self.board.solutions.is_empty() {
                return Err(SolveError::Unsolvable(
                    "every branch of the search tree is contradictory".to_string(),
                ));
            }
            warn!(
                "search completed (depth reached: {}, solutions found: {})",
                self.depth_reached,
                self.board.solutions.len()
            );
        }

        let rate = self.board.solution_rate();
        if rate < 1.0 && self.board.solutions.is_empty() {
            warn!("the puzzle is not solved full; the rate is {:.4}", rate);
        }
        self.board.set_finished();
        self.progress.finish_and_clear();
        self.caches.log_stats();
        Ok(())
    }

    /// At the root there is no branch to discard, so a contradiction means
    /// the puzzle has no solution at all.
    fn fatal(err: SolveError) -> SolveError {
        if err.is_speculative() {
            SolveError::Unsolvable(err.to_string())
        } else {
            err
        }
    }

    /// Verify the filled board (cheap match per line) and record it.
    fn add_solution(&mut self) -> Result<(), SolveError> {
        let options = PropagateOptions {
            contradiction_mode: true,
            methods: self.options.methods.clone(),
            ..PropagateOptions::default()
        };
        propagate(self.board, self.caches, &options)?;
        self.board.add_solution();
        Ok(())
    }

    /// Queue of every unsolved cell, prioritized so that cells adjacent to
    /// solved neighbours and sitting in well-progressed lines probe first.
    fn unsolved_probe_queue(&self) -> ProbeQueue {
        let mut queue = ProbeQueue::new();
        for pos in self.board.unsolved_cells() {
            queue.push(pos, probe_key(pos, self.probe_priority(pos)));
        }
        queue
    }

    fn probe_priority(&self, pos: CellPosition) -> f64 {
        let row_rate = self.board.lane_solution_rate(crate::board::Axis::Row, pos.row);
        let col_rate = self
            .board
            .lane_solution_rate(crate::board::Axis::Column, pos.col);
        let unsolved_neighbours = self.board.unsolved_neighbours(pos).len() as f64;
        4.0 - (row_rate + col_rate) + unsolved_neighbours
    }

    /// One probing pass over every unsolved cell; with `refill`, keep
    /// sweeping until a full sweep finds no contradiction.
    fn probe_round(&mut self, refill: bool) -> Result<(usize, Vec<CellState>), SolveError> {
        let mut jobs = self.unsolved_probe_queue();
        self.probe_jobs(&mut jobs, refill)
    }

    /// Work the probe queue dry. Returns the number of contradictions found
    /// and the DFS candidates ranked by impact.
    fn probe_jobs(
        &mut self,
        jobs: &mut ProbeQueue,
        refill: bool,
    ) -> Result<(usize, Vec<CellState>), SolveError> {
        let mut contradictions = 0_usize;
        let mut rates: HashMap<CellState, (usize, f64)> = HashMap::new();

        let mut processed_after_refill: HashSet<CellPosition> = HashSet::new();
        let mut processed_before_contradiction: HashSet<CellPosition> = HashSet::new();
        let mut counter = 0_usize;

        while let Some((pos, Reverse((OrderedFloat(priority), _)))) = jobs.pop() {
            counter += 1;
            self.progress.tick();
            debug!("probe #{}: {:?} (priority {:.2})", counter, pos, priority);

            let assumptions: Vec<Color> = self.board.cell(pos).candidates().collect();
            for assumption in assumptions {
                let state = CellState::from_position(pos, assumption);
                match self.probe(state)? {
                    ProbeOutcome::Expired => {}
                    ProbeOutcome::Solved(cells) => {
                        rates.insert(state, (cells, priority));
                    }
                    ProbeOutcome::Contradiction(new_jobs) => {
                        contradictions += 1;
                        if self.board.is_solved_full() {
                            self.add_solution()?;
                            return Ok((contradictions, vec![]));
                        }
                        for (job, priority) in new_jobs {
                            jobs.push_increase(job, probe_key(job, priority));
                        }
                        processed_before_contradiction = processed_after_refill.clone();
                    }
                }
                if self.solutions_capped() {
                    return Ok((contradictions, vec![]));
                }
            }

            if !refill {
                continue;
            }

            if !jobs.is_empty() {
                processed_after_refill.insert(pos);
            } else if !processed_before_contradiction.is_empty() {
                // Re-probe everything processed before the last contradiction
                // surfaced; the board has more information now.
                debug!(
                    "refilling {} jobs processed before the last contradiction",
                    processed_before_contradiction.len()
                );
                for pos in processed_before_contradiction.drain() {
                    if !self.board.is_cell_solved(pos) {
                        jobs.push_increase(pos, probe_key(pos, self.probe_priority(pos)));
                    }
                    processed_after_refill.remove(&pos);
                }
            }
        }

        Ok((contradictions, self.probes_from_rates(rates)))
    }

    /// Propagation restricted to the row and column of the changed cell, in
    /// contradiction mode, with the configured method chain.
    fn restricted_options(&self, state: CellState) -> PropagateOptions {
        PropagateOptions {
            methods: self.options.methods.clone(),
            ..PropagateOptions::restricted_to(state.row, state.col)
        }
    }

    /// Try one assumption on one cell, under a snapshot. On contradiction
    /// the opposite is committed for real and propagated.
    fn probe(&mut self, state: CellState) -> Result<ProbeOutcome, SolveError> {
        let pos = state.position();
        if self.board.is_cell_solved(pos) || !self.board.cell(pos).can_be(state.color) {
            return Ok(ProbeOutcome::Expired);
        }

        let save = self.board.make_snapshot();
        self.board.set_state(state)?;
        let mut result = propagate(self.board, self.caches, &self.restricted_options(state));
        if result.is_ok() && self.board.is_solved_full() {
            // Validation failure below means the assumption contradicts
            // after all; it joins the error path.
            if let Err(err) = self.add_solution() {
                result = Err(err);
            }
        }

        match result {
            Ok(solved_cells) => {
                self.board.restore(save);
                Ok(ProbeOutcome::Solved(solved_cells))
            }
            Err(err) if err.is_speculative() => {
                self.board.restore(save);
                info!("found contradiction at {:?}: {:?}", pos, state.color);

                // The assumption is impossible, so its negation is a fact.
                self.board
                    .unset_state(state)
                    .map_err(SolveError::into_contradiction)?;

                let before = self.board.make_snapshot();
                propagate(
                    self.board,
                    self.caches,
                    &PropagateOptions {
                        rows: Some(vec![state.row]),
                        columns: Some(vec![state.col]),
                        methods: self.options.methods.clone(),
                        ..PropagateOptions::default()
                    },
                )
                .map_err(SolveError::into_contradiction)?;

                let mut new_jobs = vec![];
                for changed in self.board.changed(&before) {
                    for neighbour in self.board.unsolved_neighbours(changed) {
                        new_jobs.push((neighbour, PRIORITY_NEIGHBOUR_OF_CHANGE));
                    }
                }
                for neighbour in self.board.unsolved_neighbours(pos) {
                    new_jobs.push((neighbour, PRIORITY_NEIGHBOUR_OF_CONTRADICTION));
                }
                Ok(ProbeOutcome::Contradiction(new_jobs))
            }
            Err(err) => Err(err),
        }
    }

    /// Rank probe results into DFS directions: most impactful first, every
    /// tie broken by position so the order is reproducible.
    fn probes_from_rates(&self, rates: HashMap<CellState, (usize, f64)>) -> Vec<CellState> {
        let mut per_cell: HashMap<CellPosition, Vec<(Color, f64)>> = HashMap::new();
        for (state, (cells_solved, priority)) in rates {
            let pos = state.position();
            if self.board.is_cell_solved(pos) {
                continue;
            }
            let mut rate = cells_solved as f64;
            if self.options.adjust_rate {
                // Low queue priority meant "near progress"; credit that.
                rate += 10.0 - priority;
            }
            per_cell.entry(pos).or_default().push((state.color, rate));
        }

        let mut ranked: Vec<(CellPosition, f64)> = per_cell
            .iter()
            .map(|(pos, colors)| {
                let best = colors
                    .iter()
                    .map(|(_, rate)| OrderedFloat(*rate))
                    .max()
                    .unwrap();
                (*pos, best.0)
            })
            .collect();
        ranked.sort_by_key(|(pos, rate)| (Reverse(OrderedFloat(*rate)), *pos));
        if self.options.few_colors_first {
            ranked.sort_by_key(|(pos, _)| per_cell[pos].len());
        }

        let mut res = vec![];
        for (pos, _) in ranked {
            let mut colors = per_cell.remove(&pos).unwrap();
            colors.sort_by_key(|(color, rate)| (Reverse(OrderedFloat(*rate)), *color));
            for (color, _) in colors {
                res.push(CellState::from_position(pos, color));
            }
        }
        res
    }

    fn set_explored(&mut self, path: &[CellState]) {
        let mut path = path.to_vec();
        path.sort();
        self.explored_paths.insert(path);
    }

    fn is_explored(&self, path: &[CellState]) -> bool {
        let mut path = path.to_vec();
        path.sort();
        self.explored_paths.contains(&path)
    }

    fn solutions_capped(&self) -> bool {
        self.options
            .max_solutions
            .is_some_and(|max| self.board.solutions.len() >= max)
    }

    fn limits_reached(&self, depth: usize) -> bool {
        if self.solutions_capped() {
            if depth == 0 {
                warn!("{} solutions is enough", self.board.solutions.len());
            }
            return true;
        }

        if let (Some(timeout), Some(start)) = (self.options.timeout, self.start_time) {
            if start.elapsed() > timeout {
                if depth == 0 {
                    warn!("searched too long: {:.2?}", start.elapsed());
                }
                return true;
            }
        }

        false
    }

    /// Recursive DFS. Returns `false` iff the given path is a dead end.
    fn search(&mut self, directions: &[CellState], path: &[CellState]) -> Result<bool, SolveError> {
        if self.is_explored(path) {
            return Ok(true);
        }

        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }

        let depth = path.len();
        if self.limits_reached(depth) {
            return Ok(true);
        }
        if depth >= self.options.max_depth {
            warn!(
                "next step at depth {} exceeds the maximum ({})",
                depth, self.options.max_depth
            );
            return Ok(true);
        }
        self.depth_reached = self.depth_reached.max(depth + 1);

        let save = self.board.make_snapshot();
        let result = self.search_mutable(directions, path);

        // The root path's deductions are real; only guessed branches roll
        // back.
        if !path.is_empty() {
            self.board.restore(save);
            self.set_explored(path);
        }

        result
    }

    fn search_mutable(
        &mut self,
        directions: &[CellState],
        path: &[CellState],
    ) -> Result<bool, SolveError> {
        let depth = path.len();
        // Set as soon as the board stops changing between unconditional
        // solves, so they aren't repeated pointlessly.
        let mut board_unchanged = false;
        let mut search_counter = 0_usize;

        let mut directions: VecDeque<CellState> = directions.iter().copied().collect();

        while let Some(state) = directions.pop_front() {
            search_counter += 1;
            self.progress.tick();

            if self.limits_reached(depth) {
                return Ok(true);
            }
            if path.contains(&state) {
                continue;
            }

            let pos = state.position();
            let cell = self.board.cell(pos);
            if !cell.can_be(state.color) {
                debug!(
                    "the color {:?} at {:?} is already expired",
                    state.color, pos
                );
                continue;
            }

            if cell.candidate_count() == 1 {
                // Not a guess anymore; solve it unconditionally.
                if board_unchanged {
                    continue;
                }
                match self.probe_round(false) {
                    Ok(_) => board_unchanged = true,
                    Err(err) if err.is_speculative() => {
                        // The whole branch is a dead end.
                        return Ok(false);
                    }
                    Err(err) => return Err(err),
                }
                if self.board.is_solved_full() {
                    self.add_solution()?;
                    return Ok(true);
                }
                continue;
            }

            let mut full_path = path.to_vec();
            full_path.push(state);
            if self.is_explored(&full_path) {
                continue;
            }

            board_unchanged = false;
            debug!(
                "trying direction ({}/{}): {:?} (depth {}, rate {:.4})",
                search_counter,
                search_counter + directions.len(),
                state,
                depth,
                self.board.solution_rate()
            );

            let guess_save = self.board.make_snapshot();
            let success = self.try_direction(state, path);
            self.board.restore(guess_save);
            self.set_explored(&full_path);
            let success = success?;

            if !success {
                // Logical learning: the child failed, so the color is wrong
                // at this level too.
                info!("unset {:?} at {:?} and solve unconditionally", state.color, pos);
                if self.board.unset_state(state).is_err() {
                    // That was the last candidate; this branch is bust.
                    return Ok(false);
                }
                match self.probe_round(false) {
                    Ok(_) => board_unchanged = true,
                    Err(err) if err.is_speculative() => return Ok(false),
                    Err(err) => return Err(err),
                }
                if self.board.is_solved_full() {
                    self.add_solution()?;
                    return Ok(true);
                }
            }

            if !success || self.board.is_solved_full() {
                // Immediately queue the cell's other colors; if all of them
                // fail, the parent is a dead end.
                for color in self.board.cell(pos).candidates() {
                    if color == state.color {
                        continue;
                    }
                    let other = CellState::from_position(pos, color);
                    if !directions.contains(&other) {
                        directions.push_front(other);
                    }
                }
            }
        }

        Ok(true)
    }

    /// Commit a guess, probe on top of it, and recurse on the best
    /// candidates the probing produced.
    fn try_direction(&mut self, state: CellState, path: &[CellState]) -> Result<bool, SolveError> {
        let depth = path.len();
        let mut full_path = path.to_vec();
        full_path.push(state);

        let mut probe_jobs = self.unsolved_probe_queue();
        match self.set_guess(state) {
            Ok(new_jobs) => {
                for (job, priority) in new_jobs {
                    probe_jobs.push_increase(job, probe_key(job, priority));
                }
            }
            Err(err) if err.is_speculative() => {
                debug!("guess {:?} failed: {}", state, err);
                return Ok(false);
            }
            Err(err) => return Err(err),
        }

        if self.limits_reached(depth) {
            return Ok(true);
        }

        match self.probe_jobs(&mut probe_jobs, false) {
            Ok((_, candidates)) => {
                let rate = self.board.solution_rate();
                info!("reached rate {:.4} on {:?}", rate, full_path);

                if self.limits_reached(depth) || self.board.is_solved_full() {
                    return Ok(true);
                }
                if candidates.is_empty() {
                    Ok(true)
                } else {
                    self.search(&candidates, &full_path)
                }
            }
            Err(err) if err.is_speculative() => {
                debug!("guess {:?} failed on probing: {}", state, err);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Set the guessed color and propagate from its cell. Returns fresh
    /// probe jobs around whatever changed.
    fn set_guess(&mut self, state: CellState) -> Result<Vec<(CellPosition, f64)>, SolveError> {
        let pos = state.position();
        if !self.board.cell(pos).can_be(state.color) {
            info!("the guess is useless: color {:?} already unset", state.color);
            return Ok(vec![]);
        }

        let before = self.board.make_snapshot();
        self.board.set_state(state)?;
        propagate(self.board, self.caches, &self.restricted_options(state))?;

        if self.board.is_solved_full() {
            self.add_solution()?;
            return Ok(vec![]);
        }

        let mut new_jobs = vec![];
        for changed in self.board.changed(&before) {
            for neighbour in self.board.unsolved_neighbours(changed) {
                new_jobs.push((neighbour, PRIORITY_NEIGHBOUR_OF_CHANGE));
            }
        }
        for neighbour in self.board.unsolved_neighbours(pos) {
            new_jobs.push((neighbour, PRIORITY_NEIGHBOUR_OF_CONTRADICTION));
        }
        Ok(new_jobs)
    }
}
