//! Per-page AST construction: classifies each `CharLine`/graphic unit produced by
//! the classifier into a tagged tree node, in the priority order the reference
//! engine uses (note-termination, list-escape, heading, note, caption, list item,
//! register bit header, paragraph break, plain continuation).

use std::sync::LazyLock;

use regex::Regex;

use crate::charline::{CharLine, CharStyle};
use crate::classifier::{Caption, Classified, LineSize, PageTemplate, Spacing};
use crate::geom::Rectangle;
use crate::page::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Square,
    Alpha,
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Note,
    Caution,
    Warning,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Chapter { title: String, filename: String },
    Section { level: u8, marker: String },
    Para,
    Text,
    Line { xpos: f64, start: usize, content: String, runs: Vec<(CharStyle, String)> },
    Note { kind: NoteKind, font: String },
    Caption { kind: &'static str, number: u32 },
    List { kind: ListKind },
    Element { value: Option<u32> },
    Table { width_frac: f64, is_register: bool, grid: Option<Box<crate::table::Table>> },
    Figure { width_frac: f64 },
    Bit { page: usize, left: String, middle: String, right: String },
    Page { number: usize },
    Area,
}

/// Index into the arena `Vec<Node>` owned by one page/document tree.
pub type NodeIndex = usize;

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub xpos: f64,
    pub children: Vec<NodeIndex>,
    pub parent: Option<NodeIndex>,
}

/// An arena-backed tree: nodes reference each other by index, never by pointer, so
/// there is no possibility of a reference cycle.
#[derive(Debug, Clone)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Tree { nodes: vec![Node { kind: NodeKind::Document, xpos: 0.0, children: Vec::new(), parent: None }] }
    }

    pub fn root(&self) -> NodeIndex {
        0
    }

    pub fn push(&mut self, parent: NodeIndex, kind: NodeKind, xpos: f64) -> NodeIndex {
        let idx = self.nodes.len();
        self.nodes.push(Node { kind, xpos, children: Vec::new(), parent: Some(parent) });
        self.nodes[parent].children.push(idx);
        idx
    }

    pub fn ancestors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        std::iter::successors(Some(node), move |&n| self.nodes[n].parent)
    }

    fn is_heading(&self, node: NodeIndex) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Section { .. })
    }

    /// Walk up from `node` to the nearest heading ancestor, or the root.
    pub fn nearest_heading_or_root(&self, node: NodeIndex) -> NodeIndex {
        self.ancestors(node).find(|&n| self.is_heading(n) || n == self.root()).unwrap_or(self.root())
    }
}

static HEADING_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ *(\d+(?:\.\d+){0,2})\.? ?").unwrap());
static NOTE_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ *([Nn]ote|[Cc]aution|[Ww]arning):? ?\d?").unwrap());
static CAPTION_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ *([Tt]able|[Ff]igure) ?(\d+)\.? ?").unwrap());
static LIST_BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ *([•–]) ..").unwrap());
static LIST_NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ *(\d+)\. ..").unwrap());
static LIST_ALPHA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ *([a-z])\) ?..").unwrap());
static REGISTER_BIT_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ *([Bb]ytes? *.+? *)?B[uio]ts? *\d+").unwrap());

/// Builder state threaded through one page's `objects_in_area` walk.
pub struct Builder {
    pub tree: Tree,
    pub page_index: usize,
    pub spacing: Spacing,
    insertion: NodeIndex,
    ypos: Option<f64>,
    open_note: Option<NodeIndex>,
    open_list_xpos: Option<f64>,
    open_heading_level: Option<u8>,
}

impl Builder {
    pub fn new(page_index: usize, spacing: Spacing) -> Self {
        let tree = Tree::new();
        let root = tree.root();
        Builder {
            tree,
            page_index,
            spacing,
            insertion: root,
            ypos: None,
            open_note: None,
            open_list_xpos: None,
            open_heading_level: None,
        }
    }

    fn unindent(&mut self, xpos: f64, newlines: i64) {
        let em = self.spacing.x_em;
        loop {
            let cur = self.insertion;
            if cur == self.tree.root() {
                break;
            }
            if xpos - self.tree.nodes[cur].xpos < -em {
                self.insertion = self.tree.nodes[cur].parent.unwrap_or(self.tree.root());
            } else {
                break;
            }
        }
        if newlines >= 2 {
            if matches!(self.tree.nodes[self.insertion].kind, NodeKind::Para) {
                self.insertion = self.tree.nodes[self.insertion].parent.unwrap_or(self.tree.root());
            }
        }
    }

    fn open_para(&mut self, xpos: f64) {
        self.insertion = self.tree.push(self.insertion, NodeKind::Para, xpos);
    }

    /// Append one `table`/`figure` unit from the classifier, rewinding the
    /// insertion point to the nearest heading first. For tables, infers the cell
    /// grid from the classifier's vline/hline sets and fills each cell's text from
    /// `page`.
    pub fn append_graphic(&mut self, classified: &Classified, area_width: f64, page: &crate::page::Page) {
        self.insertion = self.tree.nearest_heading_or_root(self.insertion);
        let bbox = match classified {
            Classified::Figure { bbox, .. } => *bbox,
            Classified::Table { bbox, .. } => *bbox,
        };
        let width_frac = bbox.width() / area_width;
        let caption: Option<&Caption> = match classified {
            Classified::Figure { caption, .. } => caption.as_ref(),
            Classified::Table { caption, .. } => caption.as_ref(),
        };
        let node_kind = match classified {
            Classified::Figure { .. } => NodeKind::Figure { width_frac },
            Classified::Table { vlines, hlines, is_register, bbox, .. } => {
                let em = self.spacing.x_em.max(1.0);
                let grid = crate::table::Table::infer(*bbox, None, vlines, hlines, em, em, *is_register)
                    .map(|mut t| {
                        for cell in &mut t.cells {
                            cell.content = page.text_in_area(&cell.bbox);
                            let chars = page.chars_in_area(&cell.bbox);
                            let lines = crate::charline::charlines_in_area(&chars, page.height, self.spacing.sc);
                            cell.rotation = lines.first().map(|l| l.rotation).unwrap_or(0);
                            cell.is_left_aligned = lines.iter().any(|l| {
                                let lb = l.bbox();
                                (lb.left - cell.bbox.left + self.spacing.x_em) < (cell.bbox.right - lb.right)
                            });
                        }
                        if *is_register {
                            // The bit-number row (e.g. "31..16") sits in the one-em
                            // band the register promotion folded into `bbox` above
                            // the ruled grid; it carries no rule lines of its own, so
                            // `Table::infer` never saw it. One extra header row for
                            // `rewrite_register_positions` to shift data up past.
                            let band = crate::geom::Rectangle::new(t.bbox.left, t.bbox.top, t.bbox.right, t.bbox.top + em);
                            if !crate::classifier::bit_number_columns(page, &band, em).is_empty() {
                                t.set_bit_headers(1);
                            }
                        }
                        Box::new(t)
                    })
                    .inspect_err(|e| tracing::warn!(page = self.page_index, error = %e, "table grid inference failed"))
                    .ok();
                NodeKind::Table { width_frac, is_register: *is_register, grid }
            }
        };
        let graphic = self.tree.push(self.insertion, node_kind, self.tree.nodes[self.insertion].xpos);
        if let Some(cap) = caption {
            self.tree.push(graphic, NodeKind::Caption { kind: cap.kind, number: cap.number }, self.tree.nodes[graphic].xpos);
        }
        self.ypos = Some(bbox.bottom);
    }

    /// Classify and append one `CharLine`, in priority order.
    pub fn append_line(&mut self, line: &CharLine<'_>, template: &dyn PageTemplate, page: &Page) {
        let xpos = line.chars.first().map(|c| c.origin.x).unwrap_or(0.0);
        let text = line.text();
        let origin = line.origin;
        let newlines = self
            .ypos
            .map(|ypos| ((ypos - origin) / (self.spacing.lh * line.height.max(1.0))).round() as i64)
            .unwrap_or(0);
        self.ypos = Some(origin);

        // 1. End-of-note.
        if let Some(note_node) = self.open_note {
            if self.tree.ancestors(self.insertion).any(|n| n == note_node) {
                let is_plain_note = matches!(self.tree.nodes[note_node].kind, NodeKind::Note { kind: NoteKind::Note, .. });
                let terminate = if is_plain_note {
                    !line.chars.iter().any(|c| c.is_italic())
                } else {
                    newlines >= 2
                };
                if terminate {
                    self.open_note = None;
                    self.insertion = self.tree.nodes[note_node].parent.unwrap_or(self.tree.root());
                }
            }
        }

        // 2. Escape from a list.
        if let Some(list_xpos) = self.open_list_xpos {
            if xpos - list_xpos >= 2.0 * self.spacing.x_em {
                self.open_list_xpos = None;
            }
        }

        let line_size = template.line_size(line.height);
        let bold_first = line.chars.iter().find(|c| !c.is_whitespace()).map(|c| c.is_bold()).unwrap_or(false);

        // 3. Heading.
        if line_size == LineSize::H1
            || (matches!(line_size, LineSize::H2 | LineSize::H3 | LineSize::H4)
                && bold_first
                && xpos <= self.spacing.x_content + 2.0 * self.spacing.x_em)
        {
            let level = match line_size {
                LineSize::H1 => 1u8,
                LineSize::H2 => 2,
                LineSize::H3 => 3,
                _ => 4,
            }
            .clamp(2, 4);
            let (marker, content_start) = match HEADING_MARKER.captures(&text) {
                Some(caps) => (caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(), caps.get(0).unwrap().end()),
                None => (String::new(), 0),
            };
            let continuing = self.open_heading_level == Some(level) && newlines <= 2;
            if !continuing {
                self.insertion = self.tree.nearest_heading_or_root(self.insertion);
                self.insertion = self.tree.push(self.insertion, NodeKind::Section { level, marker }, xpos);
                self.open_heading_level = Some(level);
                self.open_para(xpos);
            }
            self.push_line(line, xpos, content_start, &text, page);
            return;
        }

        // 4. Note.
        if let Some(caps) = NOTE_START.captures(&text) {
            let kind_str = caps.get(1).unwrap().as_str().to_lowercase();
            let kind = match kind_str.as_str() {
                "note" => NoteKind::Note,
                "caution" => NoteKind::Caution,
                _ => NoteKind::Warning,
            };
            self.open_note = None;
            self.unindent(xpos, newlines);
            let font = line.chars.first().map(|c| c.font.clone()).unwrap_or_default();
            let note = self.tree.push(self.insertion, NodeKind::Note { kind, font }, xpos);
            self.open_note = Some(note);
            self.insertion = note;
            self.open_para(xpos);
            self.push_line(line, xpos, caps.get(0).unwrap().end(), &text, page);
            return;
        }

        // 5. Caption.
        if bold_first {
            if let Some(caps) = CAPTION_START.captures(&text) {
                let kind = if caps[1].eq_ignore_ascii_case("table") { "table" } else { "figure" };
                let number: u32 = caps[2].parse().unwrap_or(0);
                self.insertion = self.tree.nearest_heading_or_root(self.insertion);
                self.insertion = self.tree.push(self.insertion, NodeKind::Caption { kind, number }, xpos);
                self.open_para(xpos);
                self.push_line(line, xpos, caps.get(0).unwrap().end(), &text, page);
                return;
            }
        }

        // 6. List item.
        if let Some(caps) = LIST_BULLET.captures(&text) {
            let kind = if &caps[1] == "•" { ListKind::Bullet } else { ListKind::Square };
            self.start_list_item(line, xpos, newlines, kind, None, caps.get(1).unwrap().end(), &text, page);
            return;
        }
        if let Some(caps) = LIST_NUMERIC.captures(&text) {
            let value: u32 = caps[1].parse().unwrap_or(0);
            self.start_list_item(line, xpos, newlines, ListKind::Numeric, Some(value), caps.get(0).unwrap().end(), &text, page);
            return;
        }
        if let Some(caps) = LIST_ALPHA.captures(&text) {
            self.start_list_item(line, xpos, newlines, ListKind::Alpha, None, caps.get(0).unwrap().end(), &text, page);
            return;
        }

        // 7. Register bit header.
        if let Some(caps) = REGISTER_BIT_HEADER.captures(&text) {
            let content_start = line
                .chars
                .iter()
                .position(|c| c.is_bold())
                .unwrap_or_else(|| caps.get(0).unwrap().end());
            self.insertion = self.tree.nearest_heading_or_root(self.insertion);
            self.insertion = self.tree.push(
                self.insertion,
                NodeKind::Bit { page: self.page_index, left: String::new(), middle: String::new(), right: String::new() },
                xpos,
            );
            self.open_para(xpos);
            self.push_line(line, xpos, content_start, &text, page);
            return;
        }

        // 8. Paragraph break.
        if newlines >= 2 || !matches!(self.tree.nodes[self.insertion].kind, NodeKind::Para) {
            self.unindent(xpos, newlines);
            self.open_para(xpos);
        } else {
            self.unindent(xpos, newlines);
        }
        self.push_line(line, xpos, 0, &text, page);
    }

    #[allow(clippy::too_many_arguments)]
    fn start_list_item(
        &mut self,
        line: &CharLine<'_>,
        xpos: f64,
        newlines: i64,
        kind: ListKind,
        value: Option<u32>,
        content_start: usize,
        text: &str,
        page: &Page,
    ) {
        self.unindent(xpos, newlines);
        self.open_list_xpos = Some(xpos);
        let list = self.tree.push(self.insertion, NodeKind::List { kind }, xpos);
        self.insertion = self.tree.push(list, NodeKind::Element { value }, xpos);
        self.push_line(line, xpos, content_start, text, page);
    }

    fn push_line(&mut self, line: &CharLine<'_>, xpos: f64, start: usize, text: &str, page: &Page) {
        let content = text.chars().skip(start).collect::<String>();
        let runs = skip_runs(line.styled_runs(page), start);
        self.tree.push(self.insertion, NodeKind::Line { xpos, start, content, runs }, xpos);
    }
}

/// Drop the first `start` characters across a run list, trimming whatever run
/// that boundary falls inside — mirrors the `text.chars().skip(start)` done for
/// `content` so `runs` covers exactly the same characters.
fn skip_runs(runs: Vec<(CharStyle, String)>, start: usize) -> Vec<(CharStyle, String)> {
    let mut remaining = start;
    let mut out = Vec::new();
    for (style, text) in runs {
        if remaining == 0 {
            out.push((style, text));
            continue;
        }
        let len = text.chars().count();
        if remaining >= len {
            remaining -= len;
            continue;
        }
        out.push((style, text.chars().skip(remaining).collect()));
        remaining = 0;
    }
    out
}

/// Page-local sub-area root: `content_ast` returns one AST per content sub-area,
/// the first leaf of the first carrying a synthetic `page{number}` node.
pub fn content_ast(
    page: &Page,
    template: &dyn PageTemplate,
    areas: &[Rectangle],
    page_number: usize,
) -> Vec<Tree> {
    let spacing = template.spacing(page);
    let mut out = Vec::new();
    for (i, area) in areas.iter().enumerate() {
        let mut builder = Builder::new(page.index, spacing);
        if i == 0 {
            let root = builder.tree.root();
            builder.tree.push(root, NodeKind::Page { number: page_number }, 0.0);
        }
        let classified = template.graphics_in_area(page, area);
        let chars = page.chars_in_area(area);
        let graphic_bboxes: Vec<Rectangle> = classified
            .iter()
            .map(|c| match c {
                Classified::Figure { bbox, .. } => *bbox,
                Classified::Table { bbox, .. } => *bbox,
            })
            .collect();
        let outside: Vec<&crate::page::Character> =
            chars.into_iter().filter(|c| !graphic_bboxes.iter().any(|b| b.contains_point(c.origin))).collect();
        let lines = crate::charline::charlines_in_area(&outside, page.height, spacing.sc);

        // Interleave graphics and lines by descending y, matching reading order.
        let mut gi = 0;
        let mut li = 0;
        while gi < classified.len() || li < lines.len() {
            let g_y = classified.get(gi).map(|c| match c {
                Classified::Figure { bbox, .. } => bbox.top,
                Classified::Table { bbox, .. } => bbox.top,
            });
            let l_y = lines.get(li).map(|l| l.top);
            match (g_y, l_y) {
                (Some(gy), Some(ly)) if gy >= ly => {
                    builder.append_graphic(&classified[gi], area.width(), page);
                    gi += 1;
                }
                (Some(_), None) => {
                    builder.append_graphic(&classified[gi], area.width(), page);
                    gi += 1;
                }
                (_, Some(_)) => {
                    builder.append_line(&lines[li], template, page);
                    li += 1;
                }
                _ => break,
            }
        }
        out.push(builder.tree);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classified;
    use crate::geom::{HLine, Point, VLine};
    use crate::primitive::fixture::{FixtureDocument, FixturePage};
    use crate::primitive::{GlyphPrim, RenderMode};

    fn digit_glyph(ch: char, x: f64, y: f64) -> GlyphPrim {
        GlyphPrim {
            unicode: ch as u32,
            origin: Point::new(x, y),
            loose_bbox: Some(Rectangle::new(x, y - 2.0, x + 6.0, y + 8.0)),
            tight_bbox: Some(Rectangle::new(x, y - 1.0, x + 5.0, y + 7.0)),
            rotation: 0,
            render_mode: RenderMode::Fill,
            font_name: "Helvetica".into(),
            font_flags: 0,
            size: 10.0,
            weight: 400,
            fill_rgba: 0x000000ff,
            stroke_rgba: 0,
        }
    }

    fn test_spacing(x_em: f64) -> Spacing {
        Spacing { x_em, y_em: x_em, x_left: 0.0, x_right: 0.0, x_content: 0.0, y_tline: 0.0, lh: 0.9, sc: 0.3, th: 0.3 }
    }

    /// A register table whose one-em band above the ruled grid holds an
    /// all-digit bit-number row gets `bit_headers` set, so
    /// `Table::rewrite_register_positions` actually runs on it.
    #[test]
    fn register_table_with_bit_number_row_sets_bit_headers() {
        let em = 2.0;
        let fixture_page =
            FixturePage { width: 600.0, height: 800.0, rotation: 0, glyphs: vec![digit_glyph('3', 5.0, 11.0)], ..Default::default() };
        let doc = FixtureDocument { pages: vec![fixture_page], ..Default::default() };
        let document = crate::page::Document::load(&doc);
        let page: &Page = document.page(0);

        let bbox = Rectangle::new(0.0, 0.0, 20.0, 10.0);
        let vlines = vec![VLine { x: 0.0, y0: 0.0, y1: 10.0, width: 1.0 }, VLine { x: 20.0, y0: 0.0, y1: 10.0, width: 1.0 }];
        let hlines = vec![HLine { y: 0.0, x0: 0.0, x1: 20.0, width: 1.0 }, HLine { y: 10.0, x0: 0.0, x1: 20.0, width: 1.0 }];
        let classified = Classified::Table { bbox, caption: None, vlines, hlines, is_register: true };

        let mut builder = Builder::new(0, test_spacing(em));
        builder.append_graphic(&classified, 20.0, page);

        let table_idx = builder.tree.nodes.len() - 1;
        match &builder.tree.nodes[table_idx].kind {
            NodeKind::Table { grid: Some(t), is_register: true, .. } => {
                assert_eq!(t.bit_headers, Some(1));
            }
            other => panic!("expected a register table node, got {other:?}"),
        }
    }

    /// A plain (non-register) table, or a register table with no digit band
    /// above it, never gets `bit_headers` set.
    #[test]
    fn non_register_table_leaves_bit_headers_unset() {
        let fixture_page = FixturePage { width: 600.0, height: 800.0, rotation: 0, ..Default::default() };
        let doc = FixtureDocument { pages: vec![fixture_page], ..Default::default() };
        let document = crate::page::Document::load(&doc);
        let page: &Page = document.page(0);

        let bbox = Rectangle::new(0.0, 0.0, 20.0, 10.0);
        let vlines = vec![VLine { x: 0.0, y0: 0.0, y1: 10.0, width: 1.0 }, VLine { x: 20.0, y0: 0.0, y1: 10.0, width: 1.0 }];
        let hlines = vec![HLine { y: 0.0, x0: 0.0, x1: 20.0, width: 1.0 }, HLine { y: 10.0, x0: 0.0, x1: 20.0, width: 1.0 }];
        let classified = Classified::Table { bbox, caption: None, vlines, hlines, is_register: false };

        let mut builder = Builder::new(0, test_spacing(2.0));
        builder.append_graphic(&classified, 20.0, page);

        let table_idx = builder.tree.nodes.len() - 1;
        match &builder.tree.nodes[table_idx].kind {
            NodeKind::Table { grid: Some(t), is_register: false, .. } => {
                assert_eq!(t.bit_headers, None);
            }
            other => panic!("expected a plain table node, got {other:?}"),
        }
    }

    #[test]
    fn append_line_falls_through_to_paragraph_for_plain_text() {
        let spacing = test_spacing(2.0);
        let mut builder = Builder::new(0, spacing);
        let fixture_page = FixturePage { width: 600.0, height: 800.0, rotation: 0, ..Default::default() };
        let doc = FixtureDocument { pages: vec![fixture_page], ..Default::default() };
        let document = crate::page::Document::load(&doc);
        let page = document.page(0);
        let chars: Vec<crate::page::Character> = vec![
            crate::page::Character {
                unicode: 'H' as u32,
                origin: Point::new(0.0, 100.0),
                bbox: Rectangle::new(0.0, 99.0, 6.0, 108.0),
                tbbox: Rectangle::new(0.0, 99.0, 5.0, 107.0),
                rotation: 0,
                render_mode: RenderMode::Fill,
                font: "Helvetica".into(),
                font_flags: 0,
                size: 10.0,
                weight: 400,
                fill: 0x000000ff,
                stroke: 0,
            },
            crate::page::Character {
                unicode: 'i' as u32,
                origin: Point::new(6.0, 100.0),
                bbox: Rectangle::new(6.0, 99.0, 12.0, 108.0),
                tbbox: Rectangle::new(6.0, 99.0, 11.0, 107.0),
                rotation: 0,
                render_mode: RenderMode::Fill,
                font: "Helvetica".into(),
                font_flags: 0,
                size: 10.0,
                weight: 400,
                fill: 0x000000ff,
                stroke: 0,
            },
        ];
        let refs: Vec<&crate::page::Character> = chars.iter().collect();
        let lines = crate::charline::charlines_in_area(&refs, 800.0, crate::charline::DEFAULT_MERGE_RTOL);
        assert_eq!(lines.len(), 1);

        let template = crate::classifier::BlackWhiteTemplate;
        builder.append_line(&lines[0], &template, page);

        let root = builder.tree.root();
        let para = builder.tree.nodes[root].children[0];
        assert!(matches!(builder.tree.nodes[para].kind, NodeKind::Para));
        let line_idx = builder.tree.nodes[para].children[0];
        assert!(matches!(&builder.tree.nodes[line_idx].kind, NodeKind::Line { content, .. } if content == "Hi"));
    }
}
