//! Dynamic-programming line solvers.
//!
//! `solve_bgu` is a top-down memoized "can the first j blocks cover this
//! prefix" recursion that paints the union of every fitting assignment as it
//! unwinds. `solve_efficient` keeps separate fixability and painting tables
//! so painting only happens for reachable subproblems. Both treat
//! black-and-white lines as the one-color special case of the colored rule:
//! a space is mandatory between same-colored neighbours only.
//!
//! Blotted clues are handled by `solve_blotted`, which enumerates concrete
//! size assignments bounded by the line's slack and unions the results.

use crate::error::SolveError;
use crate::line_solve::{Cell, line_matches};
use crate::puzzle::{BACKGROUND, Block, Description, has_blots, min_line_len};

/// Minimum 0-based end index for each clue prefix: a line position below
/// `block_sums[j]` cannot hold the first `j` blocks.
fn block_sums(desc: &[Block]) -> Vec<usize> {
    let mut res = vec![0];
    let mut need = 0_usize;
    for (j, block) in desc.iter().enumerate() {
        if j > 0 && desc[j - 1].must_be_separated_from(block) {
            need += 1;
        }
        need += block.min_len() as usize;
        res.push(need - 1);
    }
    res
}

struct BguSolver<'a> {
    desc: &'a [Block],
    line: &'a [Cell],
    block_sums: Vec<usize>,
    job_size: usize,
    memo: Vec<Option<bool>>,
    solved: Vec<Cell>,
}

pub fn solve_bgu(desc: &[Block], line: &[Cell]) -> Result<Vec<Cell>, SolveError> {
    debug_assert!(!has_blots(desc));

    if line.is_empty() {
        return if desc.is_empty() {
            Ok(vec![])
        } else {
            Err(SolveError::Line("blocks on an empty line".to_string()))
        };
    }

    let job_size = desc.len() + 1;
    let mut solver = BguSolver {
        desc,
        line,
        block_sums: block_sums(desc),
        job_size,
        memo: vec![None; job_size * line.len()],
        solved: vec![Cell::empty(); line.len()],
    };

    if solver.fits(line.len() as isize - 1, desc.len()) {
        Ok(solver.solved)
    } else {
        Err(SolveError::Line(format!(
            "no completion fits clue {:?}",
            desc
        )))
    }
}

impl<'a> BguSolver<'a> {
    /// Whether `line[..=position]` can accommodate the first `block` blocks,
    /// painting every fitting assignment into `solved` along the way.
    fn fits(&mut self, position: isize, block: usize) -> bool {
        if position < 0 {
            // Ran off the left edge; solvable iff no blocks remain.
            return block == 0;
        }
        let position = position as usize;

        if let Some(known) = self.memo[position * self.job_size + block] {
            return known;
        }
        let res = self.explore(position, block);
        self.memo[position * self.job_size + block] = Some(res);
        res
    }

    fn explore(&mut self, position: usize, block: usize) -> bool {
        // Too many blocks left for this prefix.
        if position < self.block_sums[block] {
            return false;
        }

        // `|`, not `||`: both alternatives must paint.
        self.place_blank(position, block) | self.place_block(position, block)
    }

    fn place_blank(&mut self, position: usize, block: usize) -> bool {
        if self.line[position].can_be(BACKGROUND) && self.fits(position as isize - 1, block) {
            self.solved[position].widen(BACKGROUND);
            return true;
        }
        false
    }

    fn place_block(&mut self, position: usize, block: usize) -> bool {
        // block == 0 means every block is already placed further left.
        if block == 0 {
            return false;
        }
        let current = &self.desc[block - 1];
        let color = current.color;
        let mut span = current.fixed_len() as usize;
        let trailing_space = self.trails_with_space(block);
        if trailing_space {
            span += 1;
        }

        let start = position as isize - span as isize + 1;
        if self.can_place(start, position, current, trailing_space)
            && self.fits(start - 1, block - 1)
        {
            let start = start as usize;
            let mut colored_end = position;
            if trailing_space {
                self.solved[position].widen(BACKGROUND);
            } else {
                colored_end += 1;
            }
            for i in start..colored_end {
                self.solved[i].widen(color);
            }
            return true;
        }
        false
    }

    /// The block needs a trailing space iff the next block has its color.
    fn trails_with_space(&self, block: usize) -> bool {
        block < self.desc.len() && self.desc[block].color == self.desc[block - 1].color
    }

    fn can_place(&self, start: isize, end: usize, block: &Block, trailing_space: bool) -> bool {
        if start < 0 {
            return false;
        }
        let mut colored_end = end;
        if trailing_space {
            if !self.line[end].can_be(BACKGROUND) {
                return false;
            }
        } else {
            colored_end += 1;
        }

        self.line[start as usize..colored_end]
            .iter()
            .all(|cell| cell.can_be(block.color))
    }
}

struct EfficientSolver<'a> {
    desc: &'a [Block],
    line: &'a [Cell],
    min_lengths: Vec<usize>,
    table_width: usize,
    fix_table: Vec<Option<bool>>,
    paint_table: Vec<Option<Vec<Cell>>>,
}

pub fn solve_efficient(desc: &[Block], line: &[Cell]) -> Result<Vec<Cell>, SolveError> {
    debug_assert!(!has_blots(desc));

    let table_width = desc.len() + 1;
    let table_size = table_width * (line.len() + 1);
    let mut solver = EfficientSolver {
        desc,
        line,
        min_lengths: min_lengths(desc),
        table_width,
        fix_table: vec![None; table_size],
        paint_table: vec![None; table_size],
    };

    solver.paint(line.len() as isize - 1, desc.len() as isize - 1)
}

/// The minimum 0-based index at which the first `j+1` blocks can end.
fn min_lengths(desc: &[Block]) -> Vec<usize> {
    let mut res: Vec<usize> = vec![];
    for (j, block) in desc.iter().enumerate() {
        let size = block.fixed_len() as usize;
        let end = match j {
            0 => size - 1,
            _ => {
                let gap = desc[j - 1].must_be_separated_from(block) as usize;
                res[j - 1] + gap + size
            }
        };
        res.push(end);
    }
    res
}

impl<'a> EfficientSolver<'a> {
    fn index(&self, i: isize, j: isize) -> usize {
        ((i + 1) as usize) * self.table_width + ((j + 1) as usize)
    }

    /// Whether `line[..=i]` can be covered by blocks `0..=j`.
    fn fix(&mut self, i: isize, j: isize) -> bool {
        if let Some(known) = self.fix_table[self.index(i, j)] {
            return known;
        }
        let res = self.compute_fix(i, j);
        let idx = self.index(i, j);
        self.fix_table[idx] = Some(res);
        res
    }

    fn border_fix(&self, i: isize, j: isize) -> Option<bool> {
        if j < 0 {
            if i < 0 {
                return Some(true);
            }
            // No blocks left: the whole prefix must be spaceable.
            return Some(
                self.line[..=(i as usize)]
                    .iter()
                    .all(|cell| cell.can_be(BACKGROUND)),
            );
        }
        if i < 0 {
            // Blocks left but no line left.
            return Some(false);
        }
        if (i as usize) < self.min_lengths[j as usize] {
            return Some(false);
        }
        None
    }

    fn compute_fix(&mut self, i: isize, j: isize) -> bool {
        if let Some(res) = self.border_fix(i, j) {
            return res;
        }
        self.fix_blank(i, j) || self.fix_block(i, j)
    }

    /// Sub-case: `line[i]` is a space.
    fn fix_blank(&mut self, i: isize, j: isize) -> bool {
        self.line[i as usize].can_be(BACKGROUND) && self.fix(i - 1, j)
    }

    /// Sub-case: `line[i]` is the last cell of block `j`.
    fn fix_block(&mut self, i: isize, j: isize) -> bool {
        if j < 0 {
            return false;
        }
        let block = &self.desc[j as usize];
        let preceding_space = self.precedes_with_space(j as usize);
        let span = block.fixed_len() as usize + preceding_space as usize;

        if (i as usize) + 1 < span {
            return false;
        }
        let start = i as usize + 1 - span;
        let cells = &self.line[start..=(i as usize)];
        let (head, body) = if preceding_space {
            (Some(&cells[0]), &cells[1..])
        } else {
            (None, cells)
        };
        if let Some(head) = head {
            if !head.can_be(BACKGROUND) {
                return false;
            }
        }
        if !body.iter().all(|cell| cell.can_be(block.color)) {
            return false;
        }

        self.fix(i - span as isize, j - 1)
    }

    /// A separating space belongs to block `j` iff its left neighbour has
    /// the same color.
    fn precedes_with_space(&self, j: usize) -> bool {
        j > 0 && self.desc[j - 1].color == self.desc[j].color
    }

    /// The union, over all fitting assignments of blocks `0..=j` to
    /// `line[..=i]`, of each cell's value.
    fn paint(&mut self, i: isize, j: isize) -> Result<Vec<Cell>, SolveError> {
        if i < 0 {
            return Ok(vec![]);
        }
        if let Some(cached) = &self.paint_table[self.index(i, j)] {
            return Ok(cached.clone());
        }

        let painted = if j < 0 {
            if self.line[..=(i as usize)]
                .iter()
                .all(|cell| cell.can_be(BACKGROUND))
            {
                vec![Cell::from_color(BACKGROUND); i as usize + 1]
            } else {
                return Err(SolveError::Line(
                    "leftover cells before the first block".to_string(),
                ));
            }
        } else {
            self.compute_paint(i, j)?
        };

        let idx = self.index(i, j);
        self.paint_table[idx] = Some(painted.clone());
        Ok(painted)
    }

    fn compute_paint(&mut self, i: isize, j: isize) -> Result<Vec<Cell>, SolveError> {
        let blank_fixable = self.fix_blank(i, j);
        let block_fixable = self.fix_block(i, j);

        match (blank_fixable, block_fixable) {
            (true, true) => {
                let a = self.paint_blank(i, j)?;
                let b = self.paint_block(i, j)?;
                Ok(merge(&a, &b))
            }
            (true, false) => self.paint_blank(i, j),
            (false, true) => self.paint_block(i, j),
            (false, false) => Err(SolveError::Line(format!(
                "block {} cannot be fixed at position {}",
                j, i
            ))),
        }
    }

    fn paint_blank(&mut self, i: isize, j: isize) -> Result<Vec<Cell>, SolveError> {
        let mut res = self.paint(i - 1, j)?;
        res.push(Cell::from_color(BACKGROUND));
        Ok(res)
    }

    fn paint_block(&mut self, i: isize, j: isize) -> Result<Vec<Cell>, SolveError> {
        let block = self.desc[j as usize];
        let preceding_space = self.precedes_with_space(j as usize);
        let span = block.fixed_len() as usize + preceding_space as usize;

        let mut res = self.paint(i - span as isize, j - 1)?;
        if preceding_space {
            res.push(Cell::from_color(BACKGROUND));
        }
        res.extend(std::iter::repeat_n(
            Cell::from_color(block.color),
            block.fixed_len() as usize,
        ));
        Ok(res)
    }
}

fn merge(a: &[Cell], b: &[Cell]) -> Vec<Cell> {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let mut cell = *x;
            cell.union_with(*y);
            cell
        })
        .collect()
}

/// Enumerates every way of distributing at most `max_sum` extra cells over
/// `len` blotted blocks.
struct SlackCombinations {
    extras: Vec<u16>,
    max_sum: u16,
    first_step: bool,
}

impl SlackCombinations {
    fn new(len: usize, max_sum: u16) -> SlackCombinations {
        SlackCombinations {
            extras: vec![0; len],
            max_sum,
            first_step: true,
        }
    }
}

impl Iterator for SlackCombinations {
    type Item = Vec<u16>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.first_step {
            self.first_step = false;
            return Some(self.extras.clone());
        }

        let sum: u16 = self.extras.iter().sum();
        if sum < self.max_sum {
            self.extras[0] += 1;
        } else {
            for i in 0..self.extras.len() {
                if i == self.extras.len() - 1 {
                    return None;
                }
                if self.extras[i] == 0 {
                    continue;
                }
                self.extras[i] = 0;
                self.extras[i + 1] += 1;
                break;
            }
        }

        Some(self.extras.clone())
    }
}

/// Solve a line whose clue contains blotted (unknown-size) blocks by trying
/// every concrete size combination that fits and unioning the results.
pub fn solve_blotted(desc: &[Block], line: &[Cell]) -> Result<Vec<Cell>, SolveError> {
    if !has_blots(desc) {
        return solve_bgu(desc, line);
    }

    if line.iter().all(Cell::is_solved) {
        return if line_matches(desc, line) {
            Ok(line.to_vec())
        } else {
            Err(SolveError::Line(format!(
                "solved line does not match blotted clue {:?}",
                desc
            )))
        };
    }

    let blotted_positions: Vec<usize> = desc
        .iter()
        .enumerate()
        .filter(|(_, block)| block.size.is_blotted())
        .map(|(idx, _)| idx)
        .collect();

    // Each blotted block occupies at least one cell; the leftover is the
    // budget the combinations distribute.
    let min_desc: Description = desc
        .iter()
        .map(|block| Block::new(block.min_len(), block.color))
        .collect();
    let required = min_line_len(&min_desc);
    if required > line.len() {
        return Err(SolveError::Line(format!(
            "blotted clue {:?} needs at least {} cells",
            desc, required
        )));
    }
    let slack = (line.len() - required) as u16;

    let mut united: Option<Vec<Cell>> = None;
    for combination in SlackCombinations::new(blotted_positions.len(), slack) {
        let mut current = min_desc.clone();
        for (pos, extra) in blotted_positions.iter().zip(combination) {
            current[*pos] = Block::new(current[*pos].fixed_len() + extra, current[*pos].color);
        }

        match solve_bgu(&current, line) {
            Ok(solved) => match united {
                Some(ref mut cells) => {
                    for (cell, new) in cells.iter_mut().zip(solved) {
                        cell.union_with(new);
                    }
                }
                None => united = Some(solved),
            },
            Err(_) => { /* this combination just doesn't fit */ }
        }
    }

    united.ok_or_else(|| {
        SolveError::Line(format!(
            "no size assignment of blotted clue {:?} fits",
            desc
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_solve::test_lines::{bw_desc, bw_line};
    use crate::puzzle::{BOX, Color};

    fn check(sizes: &[u16], spec: &str, expected: &str) {
        let desc = bw_desc(sizes);
        let line = bw_line(spec);
        for (name, solved) in [
            ("bgu", solve_bgu(&desc, line.as_slice().unwrap())),
            ("efficient", solve_efficient(&desc, line.as_slice().unwrap())),
        ] {
            let solved = solved.unwrap_or_else(|e| panic!("{name} on {spec:?}: {e}"));
            assert_eq!(
                solved,
                bw_line(expected).to_vec(),
                "{name}: clue {sizes:?} on {spec:?}"
            );
        }
    }

    #[test]
    fn two_state_cases() {
        check(&[], "???", "---");
        check(&[1], "?", "#");
        check(&[1], "??", "??");
        check(&[2], "???", "?#?");
        check(&[2], "-??", "-##");
        check(&[4, 2], "?#???-??", "?###?-##");
        check(&[4, 2], "?#??-???", "####-?#?");
        check(
            &[1, 1, 5],
            "---#--         -      # ",
            "---#--?????????-???####?",
        );
        check(
            &[9, 1, 1, 1],
            "???--#########-------???#-?-?",
            "-----#########-------??-#-?-?",
        );
        check(
            &[1, 1, 2, 1, 1, 3, 1],
            "#--??-?#?--#?????#????",
            "#--??-?#?--#-????#????",
        );
    }

    #[test]
    fn bad_lines_are_contradictions() {
        let desc = bw_desc(&[4, 2]);
        let line = bw_line(" # -    ");
        assert!(solve_bgu(&desc, line.as_slice().unwrap()).is_err());
        assert!(solve_efficient(&desc, line.as_slice().unwrap()).is_err());

        // Too many boxes for the clue.
        let desc = bw_desc(&[1]);
        let line = bw_line("#?#");
        assert!(solve_bgu(&desc, line.as_slice().unwrap()).is_err());
        assert!(solve_efficient(&desc, line.as_slice().unwrap()).is_err());
    }

    fn colored_line(specs: &[&[u8]]) -> Vec<Cell> {
        specs
            .iter()
            .map(|ids| Cell::from_colors(&ids.iter().map(|id| Color(*id)).collect::<Vec<_>>()))
            .collect()
    }

    #[test]
    fn colored_cases() {
        let r = Color(2);
        let b = Color(3);
        let full: &[u8] = &[0, 2, 3];

        // Two different colors in exactly two cells: both forced.
        let desc = vec![Block::new(1, r), Block::new(1, b)];
        let line = colored_line(&[full, full]);
        let solved = solve_bgu(&desc, &line).unwrap();
        assert_eq!(solved, colored_line(&[&[2], &[3]]));
        assert_eq!(solve_efficient(&desc, &line).unwrap(), solved);

        // With one spare cell nothing is forced completely.
        let line = colored_line(&[full, full, full]);
        let solved = solve_bgu(&desc, &line).unwrap();
        assert_eq!(solved, colored_line(&[&[0, 2], &[0, 2, 3], &[0, 3]]));
        assert_eq!(solve_efficient(&desc, &line).unwrap(), solved);

        // Same color twice needs the separating space.
        let desc = vec![Block::new(1, r), Block::new(1, r)];
        let line = colored_line(&[full, full, full]);
        let solved = solve_bgu(&desc, &line).unwrap();
        assert_eq!(solved, colored_line(&[&[2], &[0], &[2]]));
        assert_eq!(solve_efficient(&desc, &line).unwrap(), solved);

        // A solved foreground cell anchors the first block.
        let desc = vec![Block::new(2, r), Block::new(1, b)];
        let mut line = colored_line(&[full, full, full, full]);
        line[0] = Cell::from_color(r);
        let solved = solve_bgu(&desc, &line).unwrap();
        assert_eq!(solved, colored_line(&[&[2], &[2], &[0, 3], &[0, 3]]));
        assert_eq!(solve_efficient(&desc, &line).unwrap(), solved);
    }

    #[test]
    fn colored_contradiction() {
        let r = Color(2);
        let b = Color(3);
        // 2r + 1r + 1b needs 2+1+1+1 = 5 cells; only 4 available.
        let desc = vec![Block::new(2, r), Block::new(1, r), Block::new(1, b)];
        let line = colored_line(&[&[0, 2, 3], &[0, 2, 3], &[0, 2, 3], &[0, 2, 3]]);
        assert!(solve_bgu(&desc, &line).is_err());
        assert!(solve_efficient(&desc, &line).is_err());
    }

    #[test]
    fn slack_combinations_enumerate_everything() {
        let combos: Vec<Vec<u16>> = SlackCombinations::new(3, 2).collect();
        assert_eq!(combos.len(), 10);
        assert!(combos.contains(&vec![0, 0, 0]));
        assert!(combos.contains(&vec![2, 0, 0]));
        assert!(combos.contains(&vec![0, 1, 1]));
        assert!(combos.contains(&vec![0, 0, 2]));
        assert!(combos.iter().all(|c| c.iter().sum::<u16>() <= 2));
    }

    #[test]
    fn blotted_single_block_stays_unknown() {
        let desc = vec![Block::blotted(BOX)];
        let line = bw_line("?????");
        let solved = solve_blotted(&desc, line.as_slice().unwrap()).unwrap();
        // Completions of every length 1..=5 exist, so nothing is forced.
        assert_eq!(solved, bw_line("?????").to_vec());
    }

    #[test]
    fn blotted_learns_from_known_cells() {
        // A blot reaching the left edge: "#?" with clue [?] can extend right
        // but position 0 is already a box, so it stays one.
        let desc = vec![Block::blotted(BOX)];
        let line = bw_line("#???");
        let solved = solve_blotted(&desc, line.as_slice().unwrap()).unwrap();
        assert!(solved[0].is_solved_to(BOX));

        // A space splits the line; the blot plus a fixed block can't both fit
        // on the right of it if there's a box on the left.
        let desc = vec![Block::blotted(BOX), Block::new(2, BOX)];
        let line = bw_line("#-??");
        let solved = solve_blotted(&desc, line.as_slice().unwrap()).unwrap();
        assert_eq!(solved, bw_line("#-##").to_vec());
    }

    #[test]
    fn blotted_contradiction() {
        // Two same-colored blocks (one blotted) need at least 1+1+1 cells.
        let desc = vec![Block::blotted(BOX), Block::new(1, BOX)];
        let line = bw_line("??");
        assert!(solve_blotted(&desc, line.as_slice().unwrap()).is_err());

        // A solved line that doesn't match the blotted clue.
        let line = bw_line("##");
        assert!(solve_blotted(&desc, line.as_slice().unwrap()).is_err());
    }

    #[test]
    fn blotted_solved_line_matches() {
        let desc = vec![Block::blotted(BOX)];
        let line = bw_line("-###-");
        let solved = solve_blotted(&desc, line.as_slice().unwrap()).unwrap();
        assert_eq!(solved, line.to_vec());
    }
}
