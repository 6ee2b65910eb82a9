use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SolveError;

#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug, PartialOrd, Ord)]
pub struct Color(pub u8);

/// The space color; always id 0, so its candidate bit is the lowest one.
pub static BACKGROUND: Color = Color(0);

/// In two-state puzzles, the single foreground color.
pub static BOX: Color = Color(1);

// Note that `rgb` is not necessarily unique, but `ch` and `name` ought to be.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct ColorInfo {
    pub ch: char,
    pub name: String,
    pub rgb: (u8, u8, u8),
    pub color: Color,
}

impl ColorInfo {
    pub fn default_bg() -> ColorInfo {
        ColorInfo {
            ch: ' ',
            name: "white".to_string(),
            rgb: (255, 255, 255),
            color: BACKGROUND,
        }
    }

    pub fn default_fg(color: Color) -> ColorInfo {
        ColorInfo {
            ch: '#',
            name: "black".to_string(),
            rgb: (0, 0, 0),
            color,
        }
    }
}

pub type Palette = HashMap<Color, ColorInfo>;

pub fn bw_palette() -> Palette {
    let mut palette = Palette::new();
    palette.insert(BACKGROUND, ColorInfo::default_bg());
    palette.insert(BOX, ColorInfo::default_fg(BOX));
    palette
}

/// Build a palette from `name -> (rgb, symbol)` declarations, the form the
/// file formats use. Color ids are assigned in declaration order, starting
/// after the background.
pub fn palette_from_colors(
    colors: &[(String, (u8, u8, u8), char)],
) -> Result<Palette, SolveError> {
    let mut palette = Palette::new();
    palette.insert(BACKGROUND, ColorInfo::default_bg());

    let mut next_id: u8 = 1;
    for (name, rgb, ch) in colors {
        if name == "white" {
            // Redefining the background just changes its looks.
            let bg = palette.get_mut(&BACKGROUND).unwrap();
            bg.rgb = *rgb;
            bg.ch = *ch;
            continue;
        }
        if next_id >= 32 {
            return Err(SolveError::InvalidDescription(
                "more than 31 foreground colors".to_string(),
            ));
        }
        let color = Color(next_id);
        next_id += 1;
        palette.insert(
            color,
            ColorInfo {
                ch: *ch,
                name: name.clone(),
                rgb: *rgb,
                color,
            },
        );
    }
    Ok(palette)
}

/// A block's length: either known, or "blotted" (present, size unknown).
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub enum BlockSize {
    Fixed(u16),
    Blotted,
}

impl BlockSize {
    /// The fewest cells the block can occupy.
    pub fn min_len(self) -> u16 {
        match self {
            BlockSize::Fixed(n) => n,
            BlockSize::Blotted => 1,
        }
    }

    pub fn is_blotted(self) -> bool {
        self == BlockSize::Blotted
    }
}

impl Debug for BlockSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockSize::Fixed(n) => write!(f, "{}", n),
            BlockSize::Blotted => write!(f, "?"),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Block {
    pub size: BlockSize,
    pub color: Color,
}

impl Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]{:?}", self.color.0, self.size)
    }
}

impl Block {
    pub fn new(size: u16, color: Color) -> Block {
        Block {
            size: BlockSize::Fixed(size),
            color,
        }
    }

    pub fn blotted(color: Color) -> Block {
        Block {
            size: BlockSize::Blotted,
            color,
        }
    }

    pub fn min_len(&self) -> u16 {
        self.size.min_len()
    }

    /// Consecutive blocks of the same color need a space between them;
    /// blocks of different colors can touch.
    pub fn must_be_separated_from(&self, next: &Block) -> bool {
        self.color == next.color
    }

    /// The size with a concrete value, for code that has already substituted
    /// away blotted sizes.
    pub fn fixed_len(&self) -> u16 {
        match self.size {
            BlockSize::Fixed(n) => n,
            BlockSize::Blotted => panic!("blotted block where a fixed size is required"),
        }
    }

    pub fn to_string(&self, puzzle: &Puzzle) -> String {
        format!("{}{:?}", puzzle.palette[&self.color].ch, self.size)
    }
}

pub type Description = Vec<Block>;

/// Whether any block in the description has an unknown size.
pub fn has_blots(desc: &[Block]) -> bool {
    desc.iter().any(|b| b.size.is_blotted())
}

/// The fewest cells a description can occupy: block minimums plus a space
/// between each same-colored adjacent pair.
pub fn min_line_len(desc: &[Block]) -> usize {
    let mut need = 0_usize;
    let mut prev: Option<&Block> = None;
    for block in desc {
        if let Some(prev) = prev {
            if prev.must_be_separated_from(block) {
                need += 1;
            }
        }
        need += block.min_len() as usize;
        prev = Some(block);
    }
    need
}

static CLUE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+|\?)([^\d\s])?$").unwrap());

/// Parse one whitespace-separated description like `"2 8"` or `"3r 1b ?r"`.
/// A bare size means black; `?` is a blotted block.
pub fn parse_description(
    text: &str,
    by_char: &HashMap<char, Color>,
) -> Result<Description, SolveError> {
    let mut res = vec![];
    for token in text.split_whitespace() {
        let caps = CLUE_TOKEN
            .captures(token)
            .ok_or_else(|| SolveError::InvalidDescription(format!("bad clue token '{}'", token)))?;

        let color = match caps.get(2) {
            None => BOX,
            Some(ch) => {
                let ch = ch.as_str().chars().next().unwrap();
                *by_char.get(&ch).ok_or_else(|| {
                    SolveError::InvalidDescription(format!("unknown color char '{}'", ch))
                })?
            }
        };
        if color == BACKGROUND {
            return Err(SolveError::InvalidDescription(format!(
                "block '{}' cannot have the background color",
                token
            )));
        }

        let size = caps.get(1).unwrap().as_str();
        let block = if size == "?" {
            Block::blotted(color)
        } else {
            let size: u16 = size.parse().map_err(|_| {
                SolveError::InvalidDescription(format!("bad block size in '{}'", token))
            })?;
            if size == 0 {
                // "0" is a conventional way of writing an empty line.
                continue;
            }
            Block::new(size, color)
        };
        res.push(block);
    }
    Ok(res)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Puzzle {
    pub palette: Palette,
    pub rows: Vec<Description>,
    pub cols: Vec<Description>,
}

impl Puzzle {
    /// Build and validate a puzzle from already-normalized descriptions.
    pub fn new(
        cols: Vec<Description>,
        rows: Vec<Description>,
        palette: Palette,
    ) -> Result<Puzzle, SolveError> {
        let puzzle = Puzzle {
            palette,
            rows,
            cols,
        };
        puzzle.validate()?;
        Ok(puzzle)
    }

    /// Build a puzzle from textual descriptions like `["1 2", "3"]`.
    pub fn parse(cols: &[&str], rows: &[&str], palette: Palette) -> Result<Puzzle, SolveError> {
        let by_char: HashMap<char, Color> =
            palette.values().map(|info| (info.ch, info.color)).collect();

        let cols = cols
            .iter()
            .map(|text| parse_description(text, &by_char))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = rows
            .iter()
            .map(|text| parse_description(text, &by_char))
            .collect::<Result<Vec<_>, _>>()?;

        Puzzle::new(cols, rows, palette)
    }

    /// Black-and-white convenience constructor from plain sizes.
    pub fn bw(cols: Vec<Vec<u16>>, rows: Vec<Vec<u16>>) -> Result<Puzzle, SolveError> {
        let to_blocks = |lines: Vec<Vec<u16>>| -> Vec<Description> {
            lines
                .into_iter()
                .map(|line| {
                    line.into_iter()
                        .filter(|n| *n > 0)
                        .map(|n| Block::new(n, BOX))
                        .collect()
                })
                .collect()
        };
        Puzzle::new(to_blocks(cols), to_blocks(rows), bw_palette())
    }

    pub fn width(&self) -> usize {
        self.cols.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    fn validate(&self) -> Result<(), SolveError> {
        if self.rows.is_empty() || self.cols.is_empty() {
            return Err(SolveError::InvalidDescription(
                "the board must have at least one row and one column".to_string(),
            ));
        }

        Self::validate_fit(&self.rows, self.width(), "row")?;
        Self::validate_fit(&self.cols, self.height(), "column")?;

        for desc in self.rows.iter().chain(self.cols.iter()) {
            for block in desc {
                if !self.palette.contains_key(&block.color) {
                    return Err(SolveError::InvalidDescription(format!(
                        "block {:?} uses a color missing from the palette",
                        block
                    )));
                }
            }
        }

        // With blotted blocks the totals are unknowable, so only check the
        // per-color box counts when every size is concrete.
        let any_blots = self
            .rows
            .iter()
            .chain(self.cols.iter())
            .any(|desc| has_blots(desc));
        if !any_blots {
            let row_boxes = Self::boxes_per_color(&self.rows);
            let col_boxes = Self::boxes_per_color(&self.cols);
            if row_boxes != col_boxes {
                return Err(SolveError::InvalidDescription(format!(
                    "box counts differ between rows ({:?}) and columns ({:?})",
                    row_boxes, col_boxes
                )));
            }
        }

        Ok(())
    }

    fn validate_fit(descs: &[Description], dimension: usize, kind: &str) -> Result<(), SolveError> {
        for (idx, desc) in descs.iter().enumerate() {
            let need = min_line_len(desc);
            if need > dimension {
                return Err(SolveError::InvalidDescription(format!(
                    "cannot allocate {} {} ({:?}, needs {} cells) in {} cells",
                    kind,
                    idx + 1,
                    desc,
                    need,
                    dimension
                )));
            }
        }
        Ok(())
    }

    fn boxes_per_color(descs: &[Description]) -> HashMap<Color, usize> {
        let mut res = HashMap::new();
        for desc in descs {
            for block in desc {
                *res.entry(block.color).or_insert(0) += block.fixed_len() as usize;
            }
        }
        res.retain(|_, count: &mut usize| *count > 0);
        res
    }

    /// Derive clues from a fully-colored grid (`grid[row][col]`). Used by
    /// tests to build puzzles whose solution is known in advance.
    pub fn from_grid(grid: &[Vec<Color>], palette: Palette) -> Result<Puzzle, SolveError> {
        let height = grid.len();
        let width = grid.first().map(|r| r.len()).unwrap_or(0);

        let run_lengths = |cells: &mut dyn Iterator<Item = Color>| -> Description {
            let mut clues = vec![];
            let mut prev_color: Option<Color> = None;
            let mut run: u16 = 0;
            for color in cells.chain(std::iter::once(BACKGROUND)) {
                if prev_color == Some(color) {
                    run += 1;
                    continue;
                }
                match prev_color {
                    Some(color) if color != BACKGROUND => clues.push(Block::new(run, color)),
                    _ => {}
                }
                prev_color = Some(color);
                run = 1;
            }
            clues
        };

        let rows = (0..height)
            .map(|y| run_lengths(&mut grid[y].iter().copied()))
            .collect();
        let cols = (0..width)
            .map(|x| run_lengths(&mut (0..height).map(|y| grid[y][x])))
            .collect();

        Puzzle::new(cols, rows, palette)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_colored_tokens() {
        let mut palette = bw_palette();
        palette.insert(
            Color(2),
            ColorInfo {
                ch: 'r',
                name: "red".to_string(),
                rgb: (255, 0, 0),
                color: Color(2),
            },
        );
        let by_char: HashMap<char, Color> =
            palette.values().map(|info| (info.ch, info.color)).collect();

        let desc = parse_description("2 8", &by_char).unwrap();
        assert_eq!(desc, vec![Block::new(2, BOX), Block::new(8, BOX)]);

        let desc = parse_description("3r 1r ?r", &by_char).unwrap();
        assert_eq!(
            desc,
            vec![
                Block::new(3, Color(2)),
                Block::new(1, Color(2)),
                Block::blotted(Color(2))
            ]
        );

        assert_eq!(parse_description("0", &by_char).unwrap(), vec![]);
        assert!(parse_description("x3", &by_char).is_err());
        assert!(parse_description("3z", &by_char).is_err());
    }

    #[test]
    fn fit_validation() {
        // "1 1 1" needs 5 cells, but the board is only 4 wide.
        let err =
            Puzzle::bw(vec![vec![1], vec![1], vec![1], vec![2]], vec![vec![1, 1, 1]]).unwrap_err();
        assert!(matches!(err, SolveError::InvalidDescription(_)));
    }

    #[test]
    fn box_count_validation() {
        let err = Puzzle::bw(vec![vec![1], vec![2]], vec![vec![1], vec![1]]).unwrap_err();
        assert!(matches!(err, SolveError::InvalidDescription(_)));

        assert!(Puzzle::bw(vec![vec![1], vec![1]], vec![vec![2], vec![]]).is_ok());
    }

    #[test]
    fn separation_only_within_a_color() {
        let r = Color(1);
        let b = Color(2);
        assert!(Block::new(1, r).must_be_separated_from(&Block::new(2, r)));
        assert!(!Block::new(1, r).must_be_separated_from(&Block::new(2, b)));
    }

    #[test]
    fn clues_from_grid() {
        let w = BACKGROUND;
        let b = BOX;
        let puzzle =
            Puzzle::from_grid(&[vec![b, b, w], vec![w, b, b], vec![w, b, w]], bw_palette())
                .unwrap();

        assert_eq!(puzzle.rows[0], vec![Block::new(2, b)]);
        assert_eq!(puzzle.rows[1], vec![Block::new(2, b)]);
        assert_eq!(puzzle.cols[1], vec![Block::new(3, b)]);
        assert_eq!(puzzle.cols[2], vec![Block::new(1, b)]);
    }
}
