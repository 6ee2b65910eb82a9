use std::collections::HashMap;
use std::fmt::Debug;

use log::{debug, info};
use ndarray::ArrayViewMut1;

use crate::error::SolveError;
use crate::puzzle::{BACKGROUND, BOX, Block, BlockSize, Color, Description, Puzzle, has_blots};
use crate::{dynamic, machine, push};

/// A cell's candidate colors, as a bitmask over the palette. Bit `1 << c`
/// is set iff the cell can still be `Color(c)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    mask: u32,
}

impl Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(color) = self.solved_color() {
            write!(f, "[{}]", color.0)
        } else {
            write!(f, "<{:08b}>", self.mask)
        }
    }
}

impl Cell {
    /// A cell that could be any color of the puzzle's palette.
    pub fn new(puzzle: &Puzzle) -> Cell {
        let mut mask = 0;
        for color in puzzle.palette.keys() {
            mask |= 1 << color.0;
        }
        Cell { mask }
    }

    pub fn from_color(color: Color) -> Cell {
        Cell {
            mask: 1 << color.0,
        }
    }

    pub fn from_colors(colors: &[Color]) -> Cell {
        let mut res = Cell::empty();
        for c in colors {
            res.widen(*c);
        }
        res
    }

    /// No candidates at all; only meaningful as a starting point for `widen`.
    pub fn empty() -> Cell {
        Cell { mask: 0 }
    }

    pub fn raw(&self) -> u32 {
        self.mask
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn is_solved(&self) -> bool {
        self.mask.is_power_of_two()
    }

    pub fn is_solved_to(&self, color: Color) -> bool {
        self.mask == 1 << color.0
    }

    pub fn can_be(&self, color: Color) -> bool {
        self.mask & (1 << color.0) != 0
    }

    pub fn solved_color(&self) -> Option<Color> {
        if self.is_solved() {
            Some(Color(self.mask.ilog2() as u8))
        } else {
            None
        }
    }

    pub fn candidate_count(&self) -> u32 {
        self.mask.count_ones()
    }

    pub fn candidates(&self) -> impl Iterator<Item = Color> {
        let mut mask = self.mask;
        std::iter::from_fn(move || {
            if mask == 0 {
                return None;
            }
            let bit = mask.trailing_zeros();
            mask &= mask - 1;
            Some(Color(bit as u8))
        })
    }

    /// Widen the candidate set; used when building cells and when unioning
    /// solver results, never on live board cells.
    pub fn widen(&mut self, color: Color) {
        self.mask |= 1 << color.0;
    }

    pub fn union_with(&mut self, other: Cell) {
        self.mask |= other.mask;
    }

    /// Commit the cell to a single color. Returns whether that's news.
    pub fn learn(&mut self, color: Color) -> Result<bool, SolveError> {
        if !self.can_be(color) {
            return Err(SolveError::Line(format!(
                "cannot set {:?} on cell {:?}",
                color, self
            )));
        }
        let already_solved = self.is_solved();
        self.mask = 1 << color.0;
        Ok(!already_solved)
    }

    /// Narrow to the intersection with `allowed`. Returns whether anything
    /// was removed.
    pub fn learn_intersect(&mut self, allowed: Cell) -> Result<bool, SolveError> {
        if self.mask & allowed.mask == 0 {
            return Err(SolveError::Line(format!(
                "intersecting {:?} with {:?} empties the cell",
                self, allowed
            )));
        }
        let before = self.mask;
        self.mask &= allowed.mask;
        Ok(self.mask != before)
    }

    /// Remove one candidate. Removing the last one is a contradiction.
    pub fn learn_not(&mut self, color: Color) -> Result<bool, SolveError> {
        if self.is_solved_to(color) {
            return Err(SolveError::Line(format!(
                "removing {:?} empties the cell",
                color
            )));
        }
        let had_it = self.can_be(color);
        self.mask &= !(1 << color.0);
        Ok(had_it)
    }
}

pub type Line = ndarray::Array1<Cell>;

/// Which cells a line-solving pass narrowed.
#[derive(Clone, Debug, Default)]
pub struct Refinement {
    pub affected_cells: Vec<usize>,
}

/// The available line-solving algorithms.
///
/// All of them refine a line to a subset of its current candidates;
/// `Simpson` is fast but incomplete, the rest deduce everything that is
/// line-locally deducible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum, Default)]
pub enum Method {
    /// Per-cell hypothesis testing against the clue automaton. Slow; mostly
    /// useful as a readable reference.
    #[value(alias = "partial_match")]
    PartialMatch,
    /// Forward/backward pass over the clue automaton's reachable states.
    #[value(alias = "reverse_tracking", alias = "reverse_tracking_color")]
    ReverseTracking,
    /// Top-down dynamic programming with union painting.
    #[default]
    #[value(alias = "bgu_color")]
    Bgu,
    /// Lazy-painting dynamic programming (fix/paint tables).
    #[value(alias = "efficient_color")]
    Efficient,
    /// Push-left/push-right overlap; incomplete, chain a complete method
    /// after it.
    Simpson,
}

impl Method {
    pub fn all() -> &'static [Method] {
        &[
            Method::PartialMatch,
            Method::ReverseTracking,
            Method::Bgu,
            Method::Efficient,
            Method::Simpson,
        ]
    }

    /// Whether the method is guaranteed to deduce every line-locally forced
    /// cell (the refinement is tight).
    pub fn is_complete(self) -> bool {
        !matches!(self, Method::Simpson)
    }

    /// One-letter tag for trace output.
    pub fn ch(self) -> char {
        match self {
            Method::PartialMatch => 'p',
            Method::ReverseTracking => 'r',
            Method::Bgu => 'b',
            Method::Efficient => 'e',
            Method::Simpson => 's',
        }
    }
}

type CacheKey = (Description, Vec<u32>);

/// Cached line solutions for one method. `None` records that the line has
/// no completion at all, so contradictions are not rediscovered.
pub struct LineCache {
    storage: HashMap<CacheKey, Option<Vec<Cell>>>,
    max_size: usize,
    ceiling: usize,
    hits: u64,
    queries: u64,
}

const CACHE_INITIAL_CAPACITY: usize = 100_000;
const CACHE_CEILING: usize = 1_000_000;

impl LineCache {
    pub fn new() -> LineCache {
        LineCache {
            storage: HashMap::new(),
            max_size: CACHE_INITIAL_CAPACITY,
            ceiling: CACHE_CEILING,
            hits: 0,
            queries: 0,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<&Option<Vec<Cell>>> {
        self.queries += 1;
        let hit = self.storage.get(key);
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    fn save(&mut self, key: CacheKey, value: Option<Vec<Cell>>) {
        if self.storage.len() >= self.max_size {
            // Wholesale clearing is crude but keeps lookups O(1); the next
            // generation gets a larger budget, up to the ceiling.
            info!("line cache reached {} entries; clearing", self.max_size);
            self.storage.clear();
            if self.max_size < self.ceiling {
                self.max_size = (self.max_size * 2).min(self.ceiling);
            }
        }
        self.storage.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn hit_rate(&self) -> f64 {
        if self.queries == 0 {
            return 0.0;
        }
        self.hits as f64 / self.queries as f64
    }
}

impl Default for LineCache {
    fn default() -> Self {
        Self::new()
    }
}

/// One cache per algorithm. Complete solvers' results are also stored in the
/// Simpson cache (they are tight, so the cheaper solver can only benefit);
/// nothing flows the other way.
pub struct LineCaches {
    per_method: HashMap<Method, LineCache>,
}

impl LineCaches {
    pub fn new() -> LineCaches {
        LineCaches {
            per_method: Method::all()
                .iter()
                .map(|m| (*m, LineCache::new()))
                .collect(),
        }
    }

    fn cache(&mut self, method: Method) -> &mut LineCache {
        self.per_method.get_mut(&method).unwrap()
    }

    pub fn log_stats(&self) {
        for (method, cache) in &self.per_method {
            if cache.queries > 0 {
                info!(
                    "cache {:?}: {} entries, hit rate {:.2}%",
                    method,
                    cache.len(),
                    cache.hit_rate() * 100.0
                );
            }
        }
    }
}

impl Default for LineCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Solve one line in place with the given method, returning which cells
/// narrowed. The refined line is always a subset-wise refinement of the
/// input; if no completion matches the clue, a line error is returned and
/// the lane is left untouched.
pub fn solve_line(
    desc: &[Block],
    lane: &mut ArrayViewMut1<Cell>,
    method: Method,
    caches: &mut LineCaches,
) -> Result<Refinement, SolveError> {
    let method = effective_method(desc, lane, method);
    let key: CacheKey = (desc.to_vec(), lane.iter().map(Cell::raw).collect());

    if let Some(cached) = caches.cache(method).get(&key) {
        return match cached {
            Some(cells) => {
                let cells = cells.clone();
                apply_refinement(&cells, lane)
            }
            None => Err(SolveError::Line(format!(
                "no completion for clue {:?} (cached)",
                desc
            ))),
        };
    }

    let line: Vec<Cell> = lane.iter().copied().collect();
    let solved = run_method(desc, &line, method);

    match solved {
        Ok(cells) => {
            debug_assert_eq!(cells.len(), line.len());
            caches.cache(method).save(key.clone(), Some(cells.clone()));
            if method.is_complete() {
                caches.cache(Method::Simpson).save(key, Some(cells.clone()));
            }
            apply_refinement(&cells, lane)
        }
        Err(err) => {
            caches.cache(method).save(key, None);
            debug!("line {:?} has no completion for {:?}: {}", line, desc, err);
            Err(err)
        }
    }
}

/// Lines with blotted clues only make sense to the dynamic solver, and the
/// overlap solver only understands two-state lines; reroute accordingly.
fn effective_method(desc: &[Block], lane: &ArrayViewMut1<Cell>, method: Method) -> Method {
    if has_blots(desc) {
        return Method::Bgu;
    }
    if method == Method::Simpson && !is_two_state(desc, lane) {
        return Method::Bgu;
    }
    method
}

fn is_two_state(desc: &[Block], lane: &ArrayViewMut1<Cell>) -> bool {
    let bw = Cell::from_colors(&[BACKGROUND, BOX]);
    desc.iter().all(|b| b.color == BOX)
        && lane.iter().all(|cell| cell.raw() & !bw.raw() == 0)
}

fn run_method(desc: &[Block], line: &[Cell], method: Method) -> Result<Vec<Cell>, SolveError> {
    if has_blots(desc) {
        return dynamic::solve_blotted(desc, line);
    }
    match method {
        Method::PartialMatch => machine::solve_partial_match(desc, line),
        Method::ReverseTracking => machine::solve_reverse_tracking(desc, line),
        Method::Bgu => dynamic::solve_bgu(desc, line),
        Method::Efficient => dynamic::solve_efficient(desc, line),
        Method::Simpson => push::solve_push(desc, line),
    }
}

fn apply_refinement(
    cells: &[Cell],
    lane: &mut ArrayViewMut1<Cell>,
) -> Result<Refinement, SolveError> {
    let mut affected_cells = vec![];
    for (idx, new_cell) in cells.iter().enumerate() {
        if lane[idx].learn_intersect(*new_cell)? {
            affected_cells.push(idx);
        }
    }
    Ok(Refinement { affected_cells })
}

/// Whether a fully-solved line matches its description exactly. Blotted
/// blocks match any positive run of their color. Returns `false` for lines
/// with unsolved cells.
pub fn line_matches(desc: &[Block], lane: &[Cell]) -> bool {
    let mut runs: Vec<(Color, u16)> = vec![];
    let mut prev: Option<Color> = None;
    for cell in lane {
        let Some(color) = cell.solved_color() else {
            return false;
        };
        if color != BACKGROUND {
            if prev == Some(color) {
                runs.last_mut().unwrap().1 += 1;
            } else {
                runs.push((color, 1));
            }
        }
        prev = Some(color);
    }

    if runs.len() != desc.len() {
        return false;
    }
    runs.iter().zip(desc.iter()).all(|((color, len), block)| {
        *color == block.color
            && match block.size {
                BlockSize::Fixed(n) => *len == n,
                BlockSize::Blotted => *len >= 1,
            }
    })
}

#[cfg(test)]
pub(crate) mod test_lines {
    use super::*;
    use ndarray::Array1;

    /// Two-state line spec: `-` space, `#` box, anything else unknown.
    pub fn bw_line(spec: &str) -> Line {
        let both = Cell::from_colors(&[BACKGROUND, BOX]);
        Array1::from(
            spec.chars()
                .map(|ch| match ch {
                    '-' => Cell::from_color(BACKGROUND),
                    '#' => Cell::from_color(BOX),
                    _ => both,
                })
                .collect::<Vec<_>>(),
        )
    }

    pub fn bw_desc(sizes: &[u16]) -> Description {
        sizes.iter().map(|n| Block::new(*n, BOX)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_lines::*;
    use super::*;

    #[test]
    fn cell_algebra() {
        let mut cell = Cell::from_colors(&[BACKGROUND, BOX, Color(2)]);
        assert!(!cell.is_solved());
        assert_eq!(cell.candidate_count(), 3);
        assert!(cell.can_be(Color(2)));

        assert!(cell.learn_not(Color(2)).unwrap());
        assert!(!cell.learn_not(Color(2)).unwrap()); // already gone
        assert_eq!(cell.candidates().collect::<Vec<_>>(), vec![BACKGROUND, BOX]);

        assert!(cell.learn(BOX).unwrap());
        assert!(cell.is_solved_to(BOX));
        assert_eq!(cell.solved_color(), Some(BOX));

        // Committing to an excluded color is a contradiction.
        assert!(cell.learn(BACKGROUND).is_err());
        // And so is removing the last candidate.
        assert!(cell.learn_not(BOX).is_err());
    }

    #[test]
    fn cache_growth_and_negatives() {
        let mut cache = LineCache::new();
        cache.max_size = 2;
        cache.ceiling = 4;

        let key = |n: u32| (bw_desc(&[1]), vec![n]);

        cache.save(key(1), Some(vec![]));
        cache.save(key(2), None);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(2)).unwrap().is_none());

        // Overflow clears and doubles.
        cache.save(key(3), Some(vec![]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.max_size, 4);
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.hit_rate() > 0.0);
    }

    #[test]
    fn negative_cache_entries_stick() {
        let mut caches = LineCaches::new();
        let desc = bw_desc(&[4, 2]);
        let line = bw_line(" # .    ".replace('.', "-").as_str());

        for _ in 0..2 {
            let mut lane = line.clone();
            let res = solve_line(&desc, &mut lane.view_mut(), Method::Bgu, &mut caches);
            assert!(matches!(res, Err(SolveError::Line(_))));
        }
        assert!(caches.cache(Method::Bgu).hit_rate() > 0.0);
    }

    #[test]
    fn complete_results_feed_the_push_cache() {
        let mut caches = LineCaches::new();
        let desc = bw_desc(&[3]);
        let mut lane = bw_line("????");
        solve_line(&desc, &mut lane.view_mut(), Method::Bgu, &mut caches).unwrap();

        let mut lane2 = bw_line("????");
        solve_line(&desc, &mut lane2.view_mut(), Method::Simpson, &mut caches).unwrap();
        assert!(caches.cache(Method::Simpson).hit_rate() > 0.0);
        assert_eq!(lane, lane2);
    }

    #[test]
    fn matches_solved_lines() {
        let desc = bw_desc(&[2, 1]);
        assert!(line_matches(&desc, bw_line("##-#").as_slice().unwrap()));
        assert!(line_matches(&desc, bw_line("-##-#-").as_slice().unwrap()));
        assert!(!line_matches(&desc, bw_line("###-#").as_slice().unwrap()));
        assert!(!line_matches(&desc, bw_line("##-#?").as_slice().unwrap()));

        let blotted = vec![Block::blotted(BOX)];
        assert!(line_matches(&blotted, bw_line("-###-").as_slice().unwrap()));
        assert!(!line_matches(&blotted, bw_line("-----").as_slice().unwrap()));
        assert!(!line_matches(&blotted, bw_line("#-#").as_slice().unwrap()));
    }
}
