//! HTML emitter: walks the normalized tree and serializes it, writing each output
//! file via a temp-path-then-rename so a reader never observes a half-written file.

use std::path::{Path, PathBuf};

use crate::ast::{ListKind, Node, NodeIndex, NodeKind};
use crate::charline::CharStyle;
use crate::error::{DocError, Result};
use crate::table::{Table, TableKind};

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' | '\r' => out.push_str("<br>"),
            _ => out.push(ch),
        }
    }
    out
}

const STYLE_TAGS: [(fn(CharStyle) -> bool, &str); 5] = [
    (|s: CharStyle| s.bold, "b"),
    (|s: CharStyle| s.italic, "i"),
    (|s: CharStyle| s.underline, "u"),
    (|s: CharStyle| s.superscript, "sup"),
    (|s: CharStyle| s.subscript, "sub"),
];

fn active_tags(style: CharStyle) -> Vec<&'static str> {
    STYLE_TAGS.iter().filter(|(pred, _)| pred(style)).map(|(_, tag)| *tag).collect()
}

/// Emit nested `<b>/<i>/<u>/<sup>/<sub>` tags for a sequence of character-style
/// runs, opening and closing only the tags that change between adjacent runs so a
/// style that survives across runs stays open rather than re-emitted.
fn render_styled_runs(runs: &[(CharStyle, String)], out: &mut String) {
    let mut open: Vec<&'static str> = Vec::new();
    for (style, text) in runs {
        let desired = active_tags(*style);
        let common = open.iter().zip(desired.iter()).take_while(|(a, b)| a == b).count();
        while open.len() > common {
            out.push_str(&format!("</{}>", open.pop().unwrap()));
        }
        for &tag in &desired[common..] {
            out.push_str(&format!("<{tag}>"));
            open.push(tag);
        }
        out.push_str(&escape_html(text));
    }
    while let Some(tag) = open.pop() {
        out.push_str(&format!("</{tag}>"));
    }
}

/// Render a line's content: the styled-run path when style information survived
/// line assembly, falling back to plain escaped text when it didn't (e.g. a line
/// built directly in a test, with no styled runs attached).
fn render_line(content: &str, runs: &[(CharStyle, String)], out: &mut String) {
    if runs.is_empty() {
        out.push_str(&escape_html(content));
    } else {
        render_styled_runs(runs, out);
    }
}

/// Concatenate the plain text of every `line` descendant of `node`, in document order.
fn collect_text(nodes: &[Node], node: NodeIndex, out: &mut String) {
    if let NodeKind::Line { content, .. } = &nodes[node].kind {
        if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
        out.push_str(content);
    }
    for &c in &nodes[node].children {
        collect_text(nodes, c, out);
    }
}

fn text_of(nodes: &[Node], node: NodeIndex) -> String {
    let mut s = String::new();
    collect_text(nodes, node, &mut s);
    s.trim().to_string()
}

fn owner_grid(table: &Table) -> Vec<Vec<Option<usize>>> {
    let rows = table.rows().max(table.cells.iter().map(|c| c.row_range().1 + 1).max().unwrap_or(0));
    let cols = table.cols().max(table.cells.iter().map(|c| c.col_range().1 + 1).max().unwrap_or(0));
    let mut grid = vec![vec![None; cols.max(1)]; rows.max(1)];
    for (idx, cell) in table.cells.iter().enumerate() {
        for &(r, c) in &cell.positions {
            if r < grid.len() && c < grid[0].len() {
                grid[r][c] = Some(idx);
            }
        }
    }
    grid
}

fn render_table_grid(table: &Table, id_attr: &str, caption_html: Option<&str>) -> String {
    let grid = owner_grid(table);
    let header_end = table.header_rows();
    let class = match table.kind {
        TableKind::Register => " class=\"rt\"",
        TableKind::Bitfield => " class=\"bt\"",
        _ => "",
    };
    let mut out = String::new();
    out.push_str(&format!("<table{id_attr}{class}>\n"));
    if let Some(cap) = caption_html {
        out.push_str(&format!("<caption>{cap}</caption>\n"));
    }
    for (r, row) in grid.iter().enumerate() {
        out.push_str("<tr>");
        for (c, owner) in row.iter().enumerate() {
            let Some(idx) = owner else { continue };
            let cell = &table.cells[*idx];
            if cell.row_range().0 != r || cell.col_range().0 != c {
                continue;
            }
            let tag = if cell.is_header { "th" } else { "td" };
            let mut classes: Vec<&str> = Vec::new();
            if cell.rotation == 0 && !matches!(table.kind, TableKind::Register) && cell.is_left_aligned {
                classes.push("tl");
            }
            if cell.is_header && cell.row_range().1 + 1 == header_end {
                classes.insert(0, "thb");
            }
            let class_attr = if classes.is_empty() { String::new() } else { format!(" class=\"{}\"", classes.join(" ")) };
            let rowspan = cell.rowspan();
            let colspan = cell.colspan();
            let rowspan_attr = if rowspan > 1 { format!(" rowspan=\"{rowspan}\"") } else { String::new() };
            let colspan_attr = if colspan > 1 { format!(" colspan=\"{colspan}\"") } else { String::new() };
            let inner = if cell.rotation != 0 {
                format!("<span class=\"tv\">{}</span>", escape_html(&cell.content))
            } else {
                escape_html(&cell.content)
            };
            out.push_str(&format!("<{tag}{class_attr}{rowspan_attr}{colspan_attr}>{inner}</{tag}>"));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    out
}

/// Render one block-level node (and its subtree) into `out`. `pending_id` carries an
/// id requested by a preceding `page` node onto the next opened block tag.
fn render_block(nodes: &[Node], idx: NodeIndex, out: &mut String, pending_id: &mut Option<String>) {
    match &nodes[idx].kind {
        NodeKind::Document | NodeKind::Area => {
            for &c in &nodes[idx].children {
                render_block(nodes, c, out, pending_id);
            }
        }
        NodeKind::Chapter { .. } => {
            for &c in &nodes[idx].children {
                render_block(nodes, c, out, pending_id);
            }
        }
        NodeKind::Page { number } => {
            *pending_id = Some(format!("page{number}"));
        }
        NodeKind::Section { level, marker } => {
            let level = (*level).clamp(2, 4);
            let id = take_id(pending_id).unwrap_or_else(|| format!("section{marker}"));
            out.push_str(&format!("<h{level} id=\"{id}\">{}</h{level}>\n", escape_html(&heading_text(nodes, idx))));
        }
        NodeKind::Para => {
            let id_attr = id_attr(pending_id);
            out.push_str(&format!("<p{id_attr}>"));
            for &c in &nodes[idx].children {
                render_inline(nodes, c, out);
            }
            out.push_str("</p>\n");
        }
        NodeKind::Text => {
            out.push_str(&escape_html(&text_of(nodes, idx)));
        }
        NodeKind::Line { content, runs, .. } => {
            render_line(content, runs, out);
        }
        NodeKind::Note { .. } => {
            let id_attr = id_attr(pending_id);
            out.push_str(&format!("<div class=\"nt\"{id_attr}>\n"));
            for &c in &nodes[idx].children {
                render_block(nodes, c, out, pending_id);
            }
            out.push_str("</div>\n");
        }
        NodeKind::List { kind } => {
            let tag = match kind {
                ListKind::Bullet | ListKind::Square => "ul",
                ListKind::Alpha | ListKind::Numeric => "ol",
            };
            let id_attr = id_attr(pending_id);
            out.push_str(&format!("<{tag}{id_attr}>\n"));
            for &c in &nodes[idx].children {
                render_block(nodes, c, out, pending_id);
            }
            out.push_str(&format!("</{tag}>\n"));
        }
        NodeKind::Element { value } => {
            let value_attr = match value {
                Some(v) => format!(" value=\"{v}\""),
                None => String::new(),
            };
            out.push_str(&format!("<li{value_attr}>"));
            for &c in &nodes[idx].children {
                render_block(nodes, c, out, &mut None);
            }
            out.push_str("</li>\n");
        }
        NodeKind::Caption { .. } => {
            // A caption left in place because normalize_captions found no matching
            // graphic: render as a plain paragraph rather than drop the text.
            out.push_str(&format!("<p>{}</p>\n", escape_html(&text_of(nodes, idx))));
        }
        NodeKind::Figure { width_frac } => {
            let id_attr = match (pending_id.take(), figure_number(nodes, idx)) {
                (Some(_), Some(n)) | (None, Some(n)) => format!(" id=\"figure{n}\""),
                (Some(p), None) => format!(" id=\"{p}\""),
                (None, None) => String::new(),
            };
            out.push_str(&format!(
                "<table{id_attr} style=\"width: {:.1}%\">\n",
                (*width_frac * 100.0).clamp(0.0, 100.0)
            ));
            if let Some(cap) = caption_of(nodes, idx) {
                out.push_str(&format!("<caption>{}</caption>\n", escape_html(&cap)));
            }
            out.push_str("<tr><td>(omitted)</td></tr>\n</table>\n");
        }
        NodeKind::Table { grid, .. } => {
            let id_attr_combined = match (pending_id.take(), figure_number(nodes, idx)) {
                (Some(_), Some(n)) | (None, Some(n)) => format!(" id=\"table{n}\""),
                (Some(p), None) => format!(" id=\"{p}\""),
                (None, None) => String::new(),
            };
            let caption_html = caption_of(nodes, idx).map(|c| escape_html(&c));
            match grid {
                Some(g) => out.push_str(&render_table_grid(g, &id_attr_combined, caption_html.as_deref())),
                None => {
                    out.push_str(&format!("<table{id_attr_combined}>\n"));
                    if let Some(cap) = &caption_html {
                        out.push_str(&format!("<caption>{cap}</caption>\n"));
                    }
                    out.push_str("<tr><td>(table grid unavailable)</td></tr>\n</table>\n");
                }
            }
        }
        NodeKind::Bit { .. } => {
            // Folded into a table by normalize_registers; a leftover bit (no
            // neighbours to merge with) still needs to produce something visible.
            out.push_str(&format!("<p>{}</p>\n", escape_html(&text_of(nodes, idx))));
        }
    }
}

/// Inline rendering inside a `<p>`: a `line`'s character-style runs become nested
/// `sup`/`sub`/`i`/`b`/`u` tags; anything else just recurses (a heading's `text`
/// wrapper has already been flattened to plain text by `text_of`, so only `para`
/// children reach here with style to preserve).
fn render_inline(nodes: &[Node], idx: NodeIndex, out: &mut String) {
    match &nodes[idx].kind {
        NodeKind::Text => out.push_str(&escape_html(&text_of(nodes, idx))),
        NodeKind::Line { content, runs, .. } => render_line(content, runs, out),
        _ => {
            for &c in &nodes[idx].children {
                render_inline(nodes, c, out);
            }
        }
    }
}

fn heading_text(nodes: &[Node], idx: NodeIndex) -> String {
    text_of(nodes, idx)
}

fn caption_of(nodes: &[Node], parent: NodeIndex) -> Option<String> {
    nodes[parent]
        .children
        .iter()
        .find(|&&c| matches!(nodes[c].kind, NodeKind::Caption { .. }))
        .map(|&c| text_of(nodes, c))
}

fn figure_number(nodes: &[Node], parent: NodeIndex) -> Option<u32> {
    nodes[parent].children.iter().find_map(|&c| match &nodes[c].kind {
        NodeKind::Caption { number, .. } => Some(*number),
        _ => None,
    })
}

fn take_id(pending: &mut Option<String>) -> Option<String> {
    pending.take()
}

fn id_attr(pending: &mut Option<String>) -> String {
    match pending.take() {
        Some(id) => format!(" id=\"{id}\""),
        None => String::new(),
    }
}

fn wrap_html(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><link rel=\"stylesheet\" href=\"../style.css\"></head>\n<body>\n{body}</body>\n</html>\n"
    )
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| DocError::Io { message: format!("creating {}: {e}", dir.display()) })?;
    let tmp_name = format!(".{}.tmp", path.file_name().and_then(|f| f.to_str()).unwrap_or("out.html"));
    let tmp = dir.join(tmp_name);
    std::fs::write(&tmp, content).map_err(|e| DocError::Io { message: format!("writing {}: {e}", tmp.display()) })?;
    std::fs::rename(&tmp, path).map_err(|e| DocError::Io { message: format!("renaming into {}: {e}", path.display()) })?;
    Ok(())
}

/// Render the whole document (every top-level child, ignoring any chapter split)
/// to a single HTML file at `path`.
pub fn write_document(nodes: &[Node], path: &Path) -> Result<()> {
    let root = 0;
    let mut body = String::new();
    let mut pending_id = None;
    for &c in &nodes[root].children {
        render_block(nodes, c, &mut body, &mut pending_id);
    }
    write_atomic(path, &wrap_html(&body))
}

/// Render one HTML file per top-level `chapter` node into `dir`, named by each
/// chapter's sanitized `filename`. Falls back to a single `document.html` when the
/// tree has no chapter split (normalize_chapters was not run).
pub fn write_chapters(nodes: &[Node], dir: &Path) -> Result<Vec<PathBuf>> {
    let root = 0;
    let chapters: Vec<NodeIndex> =
        nodes[root].children.iter().copied().filter(|&c| matches!(nodes[c].kind, NodeKind::Chapter { .. })).collect();

    if chapters.is_empty() {
        let path = dir.join("document.html");
        write_document(nodes, &path)?;
        return Ok(vec![path]);
    }

    let mut written = Vec::new();
    for c in chapters {
        let filename = match &nodes[c].kind {
            NodeKind::Chapter { filename, .. } => filename.clone(),
            _ => unreachable!(),
        };
        let mut body = String::new();
        let mut pending_id = None;
        for &child in &nodes[c].children {
            render_block(nodes, child, &mut body, &mut pending_id);
        }
        let path = dir.join(format!("{filename}.html"));
        write_atomic(&path, &wrap_html(&body))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Tree;
    use crate::geom::Rectangle;
    use crate::table::{Cell, TableKind};

    #[test]
    fn escape_html_converts_newlines_to_br() {
        assert_eq!(escape_html("a\nb"), "a<br>b");
        assert_eq!(escape_html("<tag>&"), "&lt;tag&gt;&amp;");
    }

    #[test]
    fn single_paragraph_round_trips_to_p_tag() {
        let mut tree = Tree::new();
        let root = tree.root();
        let para = tree.push(root, NodeKind::Para, 0.0);
        let text = tree.push(para, NodeKind::Text, 0.0);
        tree.push(text, NodeKind::Line { xpos: 0.0, start: 0, content: "Hello World.".into(), runs: vec![] }, 0.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.html");
        write_document(&tree.nodes, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<p>Hello World.</p>"));
        assert!(content.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn register_table_carries_rt_class() {
        let bbox = Rectangle::new(0.0, 0.0, 10.0, 10.0);
        let table = Table {
            bbox,
            caption_bbox: None,
            kind: TableKind::Register,
            xpos: vec![0.0, 1.0],
            ypos: vec![1.0, 0.0],
            cells: vec![Cell {
                positions: vec![(0, 0)],
                bbox,
                borders: Default::default(),
                is_header: false,
                is_simple: false,
                content: "BAR".into(),
                rotation: 0,
                is_left_aligned: false,
            }],
            bit_headers: None,
        };
        let html = render_table_grid(&table, "", None);
        assert!(html.contains("class=\"rt\""));
        assert!(html.contains("BAR"));
    }
}
