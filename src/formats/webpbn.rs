//! PBN XML puzzles (<https://webpbn.com>): `<color>` declarations plus
//! `<clues type="columns">` / `<clues type="rows">` of `<line>`/`<count>`
//! elements. Mono-color puzzles may omit the color attributes entirely.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Context, bail};
use regex::Regex;

use crate::puzzle::{BACKGROUND, Block, Color, ColorInfo, Description, Palette, Puzzle};

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})$").unwrap()
});

fn element_children<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    tag: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    node.children()
        .filter(|child| child.is_element() && child.tag_name().name() == tag)
        .collect()
}

fn parse_color_node(
    node: roxmltree::Node,
    next_id: &mut u8,
    palette: &mut Palette,
    named: &mut HashMap<String, Color>,
) -> anyhow::Result<()> {
    let name = node
        .attribute("name")
        .context("<color> without a name attribute")?;

    let rgb = match node.text() {
        Some(text) => {
            let caps = HEX_COLOR
                .captures(text.trim())
                .with_context(|| format!("expected 6 hex digits for color '{}'", name))?;
            let mut rgb = [0_u8; 3];
            for (slot, idx) in rgb.iter_mut().zip(1..) {
                *slot = u8::from_str_radix(caps.get(idx).unwrap().as_str(), 16).unwrap();
            }
            (rgb[0], rgb[1], rgb[2])
        }
        None => (0, 0, 0),
    };

    let ch = node
        .attribute("char")
        .and_then(|s| s.chars().next())
        .unwrap_or('#');

    if name == "white" {
        // The background color is predeclared; this only restyles it.
        let bg = palette.get_mut(&BACKGROUND).unwrap();
        bg.rgb = rgb;
        bg.ch = ch;
        named.insert(name.to_string(), BACKGROUND);
        return Ok(());
    }

    if *next_id >= 32 {
        bail!("more than 31 foreground colors");
    }
    let color = Color(*next_id);
    *next_id += 1;
    palette.insert(
        color,
        ColorInfo {
            ch,
            name: name.to_string(),
            rgb,
            color,
        },
    );
    named.insert(name.to_string(), color);
    Ok(())
}

fn parse_clue_lines(
    clues_node: roxmltree::Node,
    named: &HashMap<String, Color>,
    default_color: &str,
) -> anyhow::Result<Vec<Description>> {
    let mut lanes = vec![];
    for line in element_children(clues_node, "line") {
        let mut desc: Description = vec![];
        for count in element_children(line, "count") {
            let size: u16 = count
                .text()
                .context("<count> without text")?
                .trim()
                .parse()
                .context("<count> is not a number")?;

            let color_name = count.attribute("color").unwrap_or(default_color);
            let color = *named
                .get(color_name)
                .with_context(|| format!("undeclared color '{}'", color_name))?;
            if size > 0 {
                desc.push(Block::new(size, color));
            }
        }
        lanes.push(desc);
    }
    Ok(lanes)
}

pub fn parse(xml: &str) -> anyhow::Result<Puzzle> {
    let doc = roxmltree::Document::parse(xml).context("malformed XML")?;
    let root = doc.root_element();

    let puzzle_node = if root.tag_name().name() == "puzzle" {
        root
    } else {
        *element_children(root, "puzzle")
            .first()
            .context("no <puzzle> element")?
    };

    let default_color = puzzle_node.attribute("defaultcolor").unwrap_or("black");

    let mut palette = Palette::new();
    palette.insert(BACKGROUND, ColorInfo::default_bg());
    let mut named = HashMap::from([("white".to_string(), BACKGROUND)]);
    let mut next_id: u8 = 1;

    for color_node in element_children(puzzle_node, "color") {
        parse_color_node(color_node, &mut next_id, &mut palette, &mut named)?;
    }

    // Mono-color files routinely leave the palette implicit.
    if !named.contains_key(default_color) {
        if default_color == "black" {
            let black = Color(next_id);
            next_id += 1;
            palette.insert(black, ColorInfo::default_fg(black));
            named.insert("black".to_string(), black);
        } else {
            bail!("default color '{}' is not declared", default_color);
        }
    }

    let mut columns = None;
    let mut rows = None;
    for clues_node in element_children(puzzle_node, "clues") {
        let lanes = parse_clue_lines(clues_node, &named, default_color)?;
        match clues_node.attribute("type") {
            Some("columns") => columns = Some(lanes),
            Some("rows") => rows = Some(lanes),
            other => bail!("unexpected clues type {:?}", other),
        }
    }

    let columns = columns.context("no column clues")?;
    let rows = rows.context("no row clues")?;

    Ok(Puzzle::new(columns, rows, palette)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn mono_color_without_attributes() {
        let puzzle = parse(indoc! {r#"
            <?xml version="1.0"?>
            <puzzleset>
            <puzzle type="grid" defaultcolor="black">
            <clues type="columns">
            <line><count>2</count></line>
            <line><count>1</count></line>
            </clues>
            <clues type="rows">
            <line><count>2</count></line>
            <line><count>1</count></line>
            </clues>
            </puzzle>
            </puzzleset>
        "#})
        .unwrap();

        assert_eq!(puzzle.width(), 2);
        assert_eq!(puzzle.height(), 2);
        assert_eq!(puzzle.palette.len(), 2);
    }

    #[test]
    fn colored_clues() {
        let puzzle = parse(indoc! {r#"
            <puzzleset>
            <puzzle type="grid" defaultcolor="black">
            <color name="white" char=".">FFFFFF</color>
            <color name="black" char="X">000000</color>
            <color name="green" char="%">00B000</color>
            <clues type="columns">
            <line><count color="green">1</count></line>
            <line><count color="black">1</count></line>
            </clues>
            <clues type="rows">
            <line><count color="green">1</count><count color="black">1</count></line>
            </clues>
            </puzzle>
            </puzzleset>
        "#})
        .unwrap();

        assert_eq!(puzzle.palette.len(), 3);
        let green = puzzle.rows[0][0].color;
        assert_eq!(puzzle.palette[&green].name, "green");
        assert_eq!(puzzle.palette[&green].rgb, (0, 0xB0, 0));
        assert_eq!(puzzle.palette[&green].ch, '%');
    }

    #[test]
    fn undeclared_color_fails() {
        let res = parse(indoc! {r#"
            <puzzle defaultcolor="black">
            <clues type="columns"><line><count color="pink">1</count></line></clues>
            <clues type="rows"><line><count color="pink">1</count></line></clues>
            </puzzle>
        "#});
        assert!(res.is_err());
    }
}
