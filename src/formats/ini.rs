//! INI-style board files.
//!
//! ```ini
//! [clues]
//! columns =
//!     1, '1 2', 3   ; one description per comma-separated item
//! rows =
//!     2
//!     '1 1'
//!
//! [colors]
//! r = (255,0,0) %
//! ```
//!
//! Lines starting with `#` or `;` are comments, as are trailing `#`/`;`
//! chunks preceded by whitespace. Values continue over indented lines.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Context, bail};
use regex::Regex;

use crate::puzzle::{Color, Palette, Puzzle, bw_palette, palette_from_colors, parse_description};

static COLOR_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\((?<rgb>[^)]+)\)\s+(?<ch>\S)$").unwrap());

/// Strip full-line and `space-then-#`/`space-then-;` inline comments.
fn strip_comment(line: &str) -> &str {
    for (idx, ch) in line.char_indices() {
        if ch != '#' && ch != ';' {
            continue;
        }
        if idx == 0 || line[..idx].ends_with(char::is_whitespace) {
            return &line[..idx];
        }
    }
    line
}

#[derive(Default)]
struct Section {
    // Key order matters for color ids, so no map here.
    entries: Vec<(String, Vec<String>)>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&Vec<String>> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, lines)| lines)
    }
}

fn parse_sections(content: &str) -> anyhow::Result<HashMap<String, Section>> {
    let mut sections: HashMap<String, Section> = HashMap::new();
    let mut current_section: Option<String> = None;

    for raw_line in content.lines() {
        let line = strip_comment(raw_line);
        if line.trim().is_empty() {
            continue;
        }

        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            let name = trimmed[1..trimmed.len() - 1].trim().to_lowercase();
            sections.entry(name.clone()).or_default();
            current_section = Some(name);
            continue;
        }

        let Some(section_name) = &current_section else {
            bail!("content before the first section: '{}'", trimmed);
        };
        let section = sections.get_mut(section_name).unwrap();

        let continuation = line.starts_with(char::is_whitespace);
        if continuation && !section.entries.is_empty() {
            let (_, lines) = section.entries.last_mut().unwrap();
            lines.push(trimmed.to_string());
        } else if let Some((key, value)) = trimmed.split_once('=') {
            let mut lines = vec![];
            if !value.trim().is_empty() {
                lines.push(value.trim().to_string());
            }
            section
                .entries
                .push((key.trim().to_lowercase(), lines));
        } else {
            bail!("cannot parse line '{}'", trimmed);
        }
    }

    Ok(sections)
}

/// One description per comma-separated item; quotes let an item hold
/// several space-separated blocks.
fn split_descriptions(lines: &[String]) -> Vec<String> {
    let mut res = vec![];
    for line in lines {
        for item in line.trim_matches(',').split(',') {
            let item = item.trim().trim_matches('\'').trim_matches('"').trim();
            if !item.is_empty() {
                res.push(item.to_string());
            }
        }
    }
    res
}

fn parse_rgb(spec: &str) -> anyhow::Result<(u8, u8, u8)> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    if parts.len() == 3 {
        let mut rgb = [0_u8; 3];
        for (slot, part) in rgb.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .with_context(|| format!("bad rgb component '{}'", part))?;
        }
        return Ok((rgb[0], rgb[1], rgb[2]));
    }

    let spec = spec.trim();
    if spec.len() == 6 && spec.chars().all(|c| c.is_ascii_hexdigit()) {
        let component = |i: usize| u8::from_str_radix(&spec[i..i + 2], 16).unwrap();
        return Ok((component(0), component(2), component(4)));
    }

    bail!("cannot parse color value '{}'", spec)
}

fn parse_palette(colors: Option<&Section>) -> anyhow::Result<Palette> {
    let Some(colors) = colors else {
        return Ok(bw_palette());
    };

    let mut defs = vec![];
    for (name, lines) in &colors.entries {
        let value = lines.join(" ");
        let caps = COLOR_DEF
            .captures(value.trim())
            .with_context(|| format!("bad color definition '{} = {}'", name, value))?;
        let rgb = parse_rgb(&caps["rgb"])?;
        let ch = caps["ch"].chars().next().unwrap();
        defs.push((name.clone(), rgb, ch));
    }

    Ok(palette_from_colors(&defs)?)
}

pub fn parse(content: &str) -> anyhow::Result<Puzzle> {
    let sections = parse_sections(content)?;

    let clues = sections
        .get("clues")
        .context("missing the [clues] section")?;
    let columns = clues.get("columns").context("missing 'columns' clues")?;
    let rows = clues.get("rows").context("missing 'rows' clues")?;

    let palette = parse_palette(sections.get("colors"))?;
    // Clue tokens may refer to a color by its display symbol or, for
    // single-letter color names, by the name itself.
    let mut by_char: HashMap<char, Color> =
        palette.values().map(|info| (info.ch, info.color)).collect();
    for info in palette.values() {
        let mut name_chars = info.name.chars();
        if let (Some(ch), None) = (name_chars.next(), name_chars.next()) {
            by_char.entry(ch).or_insert(info.color);
        }
    }

    let columns = split_descriptions(columns)
        .iter()
        .map(|text| parse_description(text, &by_char))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = split_descriptions(rows)
        .iter()
        .map(|text| parse_description(text, &by_char))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Puzzle::new(columns, rows, palette)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn black_and_white_board() {
        let puzzle = parse(indoc! {"
            # a 3x2 example
            [clues]
            columns = 2, 1, 1
            rows =
                2      ; a trailing comment
                '1 1'
        "})
        .unwrap();

        assert_eq!(puzzle.width(), 3);
        assert_eq!(puzzle.height(), 2);
        assert_eq!(puzzle.rows[1].len(), 2);
    }

    #[test]
    fn colored_board() {
        let puzzle = parse(indoc! {"
            [clues]
            columns = 1r, 0, 1r
            rows =
                '1r 1r'
                0

            [colors]
            r = (255,0,0) %
        "})
        .unwrap();

        assert_eq!(puzzle.palette.len(), 2);
        let red = puzzle.rows[0][0].color;
        assert_eq!(puzzle.palette[&red].name, "r");
        assert_eq!(puzzle.palette[&red].rgb, (255, 0, 0));
    }

    #[test]
    fn comments_and_blank_lines() {
        let puzzle = parse(indoc! {"
            ; full-line comment
            [clues]
            columns =
                1  # commented
                # a full-line comment between values
                1
            rows = 2, 0
        "})
        .unwrap();
        assert_eq!(puzzle.width(), 2);
        assert_eq!(puzzle.height(), 2);
    }

    #[test]
    fn missing_sections_fail() {
        assert!(parse("[clues]\nrows = 1\n").is_err());
        assert!(parse("rows = 1\n").is_err());
    }
}
