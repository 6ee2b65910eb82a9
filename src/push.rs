//! Push-left / push-right overlap solver (Simpson's algorithm,
//! <http://www.lancaster.ac.uk/~simpsons/nonogram/ls-fast>).
//!
//! Finds the extremal placements of every block; cells covered by a block in
//! both placements are boxes, cells covered in neither are spaces. Fast but
//! incomplete: the engine chains a complete solver after it. Two-state lines
//! only; the dispatcher reroutes colored lines.

use crate::error::SolveError;
use crate::line_solve::Cell;
use crate::puzzle::{BACKGROUND, BOX, Block};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tri {
    Unknown,
    Space,
    Box,
}

fn to_tri(cell: &Cell) -> Tri {
    if cell.is_solved_to(BACKGROUND) {
        Tri::Space
    } else if cell.is_solved_to(BOX) {
        Tri::Box
    } else {
        Tri::Unknown
    }
}

/// Leftmost consistent start position of every block, with all the
/// back-shuffling the reference algorithm prescribes when a placement would
/// cover or uncover a solid cell.
fn push_left(line: &[Tri], clue: &[usize]) -> Result<Vec<usize>, SolveError> {
    let line_size = line.len();
    let clue_size = clue.len();
    let mut res = vec![0_usize; clue_size];
    // Offset within each block of the leftmost solid cell it covers (-1: none).
    let mut solid = vec![-1_isize; clue_size];

    let no_room = |which: usize| {
        SolveError::Line(format!("no room left: cannot fit block {}", which))
    };

    let mut block = 0;
    while block < clue_size {
        let block_size = clue[block];

        // Find the next cell that isn't a known space.
        let mut pos = res[block];
        while pos + block_size < line_size && line[pos] == Tri::Space {
            pos += 1;
        }
        res[block] = pos;

        if pos + block_size > line_size || line[pos] == Tri::Space {
            return Err(no_room(block));
        }

        // Assume this position doesn't cover a solid until seen otherwise.
        solid[block] = -1;

        // Check the block fits before the next space, watching for solids.
        let mut i = 0;
        while i < block_size {
            match line[pos + i] {
                Tri::Space => break,
                Tri::Box if solid[block] < 0 => solid[block] = i as isize,
                _ => {}
            }
            i += 1;
        }

        if i < block_size {
            // Hit a space mid-block.
            if solid[block] >= 0 {
                // A solid would be uncovered by moving; back up to an
                // earlier block that can take it over.
                back_up(&mut res, &solid, clue, &mut block)?;
                continue;
            }
            // Just move past the space and retry.
            res[block] += i;
            continue;
        }

        // The block's end may touch an existing solid; shuffle right so it
        // overlaps that solid without emitting one on the left.
        let mut pos = res[block];
        if pos + block_size < line_size {
            if line[pos + block_size] == Tri::Box && solid[block] < 0 {
                solid[block] = block_size as isize;
            }
            while pos + block_size < line_size {
                if line[pos] == Tri::Box || line[pos + block_size] != Tri::Box {
                    break;
                }
                pos += 1;
                solid[block] -= 1;
            }
        }
        res[block] = pos;

        // Still a solid immediately after the block: some earlier block has
        // to move instead.
        if pos + block_size < line_size && line[pos + block_size] == Tri::Box {
            back_up(&mut res, &solid, clue, &mut block)?;
            continue;
        }

        // This block is in place; on to the next.
        let mut pos = res[block] + 1 + block_size;
        if block + 1 < clue_size {
            block += 1;
            res[block] = pos;
        } else {
            // No blocks left; any remaining solid must be reeled in.
            while pos < line_size && line[pos] != Tri::Box {
                pos += 1;
            }
            if pos < line_size {
                if solid[block] >= 0
                    && (pos + 1 - block_size) as isize > res[block] as isize + solid[block]
                {
                    // Covering the trailing solid would uncover this
                    // block's own; back up instead.
                    back_up(&mut res, &solid, clue, &mut block)?;
                    continue;
                }
                res[block] = pos + 1 - block_size;
                continue;
            }
            block += 1;
        }
    }

    Ok(res)
}

/// Find an earlier block that can be moved to cover the solid currently
/// covered by `block + 1`'s placement without uncovering its own, and plant
/// it just overlapping that solid.
fn back_up(
    res: &mut [usize],
    solid: &[isize],
    clue: &[usize],
    block: &mut usize,
) -> Result<(), SolveError> {
    loop {
        if *block == 0 {
            return Err(SolveError::Line(
                "all previous blocks cover solids".to_string(),
            ));
        }
        *block -= 1;
        let next_start = res[*block + 1] as isize + solid[*block + 1];
        if solid[*block] < 0
            || next_start - clue[*block] as isize + 1 <= res[*block] as isize + solid[*block]
        {
            res[*block] =
                (res[*block + 1] as isize + solid[*block + 1] - clue[*block] as isize + 1) as usize;
            return Ok(());
        }
    }
}

fn push_right(line: &[Tri], clue: &[usize]) -> Result<Vec<usize>, SolveError> {
    let line_rev: Vec<Tri> = line.iter().rev().copied().collect();
    let clue_rev: Vec<usize> = clue.iter().rev().copied().collect();

    let mut res = push_left(&line_rev, &clue_rev)?;
    res.reverse();
    Ok(res)
}

/// Refine a two-state line from the overlap of its extremal placements.
pub fn solve_push(desc: &[Block], line: &[Cell]) -> Result<Vec<Cell>, SolveError> {
    debug_assert!(desc.iter().all(|block| block.color == BOX));

    let line_size = line.len();
    let clue: Vec<usize> = desc.iter().map(|b| b.fixed_len() as usize).collect();
    let tri: Vec<Tri> = line.iter().map(to_tri).collect();

    let space = Cell::from_color(BACKGROUND);
    let box_ = Cell::from_color(BOX);

    if clue.is_empty() {
        // Everything must be a space; conflicts surface when the result is
        // intersected with the input.
        return Ok(vec![space; line_size]);
    }

    let left = push_left(&tri, &clue)?;
    // Rightmost placements, converted back to start positions in the
    // original orientation.
    let right: Vec<usize> = push_right(&tri, &clue)?
        .iter()
        .zip(clue.iter())
        .map(|(rev_start, size)| line_size - rev_start - size)
        .collect();

    let mut work: Vec<Cell> = line.to_vec();
    let fill = |cells: &mut Vec<Cell>, from: usize, to: usize, value: Cell| {
        for cell in cells.iter_mut().take(to.min(line_size)).skip(from) {
            *cell = value;
        }
    };

    let mut reach = 0;
    for i in 0..clue.len() {
        // Cells no block can touch are spaces...
        fill(&mut work, reach, left[i], space);
        // ...and the left/right overlap of this block is solid.
        fill(&mut work, right[i], left[i] + clue[i], box_);
        reach = right[i] + clue[i];
    }
    fill(&mut work, reach, line_size, space);

    Ok(work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_solve::test_lines::{bw_desc, bw_line};

    fn tri_line(spec: &str) -> Vec<Tri> {
        bw_line(spec).iter().map(to_tri).collect()
    }

    fn push(sizes: &[u16], spec: &str) -> String {
        let desc = bw_desc(sizes);
        let solved = solve_push(&desc, bw_line(spec).as_slice().unwrap()).unwrap();
        solved
            .iter()
            .map(|cell| match cell.solved_color() {
                Some(c) if c == BACKGROUND => '-',
                Some(_) => '#',
                None => '?',
            })
            .collect()
    }

    #[test]
    fn left_positions() {
        assert_eq!(push_left(&tri_line("????"), &[3]).unwrap(), vec![0]);
        assert_eq!(push_left(&tri_line("-???"), &[2]).unwrap(), vec![1]);
        assert_eq!(push_left(&tri_line("??-??"), &[2, 1]).unwrap(), vec![0, 3]);
        // The block has to slide right to cover the solid.
        assert_eq!(push_left(&tri_line("??#?"), &[2]).unwrap(), vec![1]);
        // And sliding must not strand the solid it already covers.
        assert_eq!(push_left(&tri_line("?#?#?"), &[3]).unwrap(), vec![1]);
    }

    #[test]
    fn overlap_deductions() {
        assert_eq!(push(&[3], "?????"), "??#??");
        assert_eq!(push(&[4], "??????"), "??##??");
        assert_eq!(push(&[2], "-#??"), "-##-");
        assert_eq!(push(&[1, 1], "?-?"), "#-#");
        assert_eq!(push(&[2, 2], "?????"), "##-##");
        assert_eq!(push(&[6], "##??#?"), "######");
    }

    #[test]
    fn spaces_outside_reach() {
        assert_eq!(push(&[2], "?????#"), "----##");
        assert_eq!(push(&[1], "??#?"), "--#-");
    }

    #[test]
    fn empty_clue() {
        assert_eq!(push(&[], "???"), "---");
    }

    #[test]
    fn contradictions() {
        assert!(solve_push(&bw_desc(&[4, 2]), bw_line(" # -    ").as_slice().unwrap()).is_err());
        assert!(solve_push(&bw_desc(&[5]), bw_line("????").as_slice().unwrap()).is_err());
        assert!(solve_push(&bw_desc(&[1]), bw_line("#?#").as_slice().unwrap()).is_err());
    }

    #[test]
    fn incomplete_but_sound() {
        // Push-left/right alone doesn't see everything; whatever it does
        // deduce must agree with the complete solver.
        let desc = bw_desc(&[1, 3]);
        let line = bw_line("??????#?");
        let pushed = solve_push(&desc, line.as_slice().unwrap()).unwrap();
        let complete = crate::dynamic::solve_bgu(&desc, line.as_slice().unwrap()).unwrap();
        for (i, (p, c)) in pushed.iter().zip(complete.iter()).enumerate() {
            if p.is_solved() {
                assert_eq!(p, c, "cell {}", i);
            }
        }
    }
}
