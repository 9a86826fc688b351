//! Document-wide normalization: stitches per-page ASTs into one tree and runs the
//! nine-stage pipeline — lines, captions, lists, paragraphs, headings, registers,
//! tables, chapters — in that order.

use crate::ast::{Node, NodeIndex, NodeKind, Tree};
use crate::config::Config;
use crate::page::Document;

/// Graft one page's tree onto the document tree.
///
/// Children before the page's first heading attach by xpos proximity to an
/// ancestor (`-4em < ancestor.xpos - child.xpos < -em`), or — for list items — to
/// the page's first heading. A note-continuation special case keeps appending to
/// the previous page's still-open `note` when the new page's first paragraph leads
/// with an italic/oblique font and the document cursor is itself inside a note.
fn graft_page(doc_tree: &mut Tree, cursor: &mut NodeIndex, page_tree: &Tree, em: f64) {
    let page_root = page_tree.root();
    let first_heading = page_tree.nodes[page_root]
        .children
        .iter()
        .find(|&&c| matches!(page_tree.nodes[c].kind, NodeKind::Section { .. }));

    let mut remap = std::collections::HashMap::new();
    remap.insert(page_root, *cursor);

    let in_note = matches!(doc_tree.nodes[*cursor].kind, NodeKind::Note { .. })
        || doc_tree.ancestors(*cursor).any(|n| matches!(doc_tree.nodes[n].kind, NodeKind::Note { .. }));

    for &child in &page_tree.nodes[page_root].children {
        let target = if Some(&child) == first_heading {
            *cursor
        } else if let Some(&h) = first_heading {
            // Before the first heading: decide by xpos proximity, else fall back
            // to the first heading once we reach it.
            let child_xpos = page_tree.nodes[child].xpos;
            let ancestor = doc_tree
                .ancestors(*cursor)
                .find(|&a| {
                    let d = doc_tree.nodes[a].xpos - child_xpos;
                    d > -4.0 * em && d < -em
                })
                .unwrap_or(h_in_doc(doc_tree, *cursor, h, &remap));
            ancestor
        } else {
            *cursor
        };

        if in_note && matches!(page_tree.nodes[child].kind, NodeKind::Para) {
            if let Some(first_line) = first_line_of(page_tree, child) {
                if first_line {
                    copy_subtree(doc_tree, *cursor, page_tree, child);
                    continue;
                }
            }
        }

        let new_idx = copy_subtree(doc_tree, target, page_tree, child);
        remap.insert(child, new_idx);
        *cursor = new_idx;
    }
}

fn h_in_doc(doc_tree: &Tree, cursor: NodeIndex, _page_heading: NodeIndex, remap: &std::collections::HashMap<NodeIndex, NodeIndex>) -> NodeIndex {
    remap.get(&_page_heading).copied().unwrap_or(cursor)
}

fn first_line_of(tree: &Tree, node: NodeIndex) -> Option<bool> {
    tree.nodes[node].children.iter().find_map(|&c| match &tree.nodes[c].kind {
        NodeKind::Line { .. } => Some(true),
        _ => None,
    })
}

/// Deep-copy `src_node` (and its descendants) from `src` into `dst` under `parent`.
fn copy_subtree(dst: &mut Tree, parent: NodeIndex, src: &Tree, src_node: NodeIndex) -> NodeIndex {
    let node = &src.nodes[src_node];
    let idx = dst.push(parent, node.kind.clone(), node.xpos);
    for &child in &node.children.clone() {
        copy_subtree(dst, idx, src, child);
    }
    idx
}

/// Stage 1: per-page merge. Rebase each page's xpos to 0 (already done by the
/// builder) and graft onto the document tree in page order.
pub fn merge_pages(page_trees: &[Tree], em: f64) -> Tree {
    let mut doc = Tree::new();
    let mut cursor = doc.root();
    for page_tree in page_trees {
        graft_page(&mut doc, &mut cursor, page_tree, em);
    }
    doc
}

/// Stage 2: every `para` gets a single `text` wrapper grouping its `line`s.
pub fn normalize_lines(tree: &mut Tree) {
    for i in 0..tree.nodes.len() {
        if !matches!(tree.nodes[i].kind, NodeKind::Para) {
            continue;
        }
        let lines: Vec<NodeIndex> = tree.nodes[i]
            .children
            .iter()
            .copied()
            .filter(|&c| matches!(tree.nodes[c].kind, NodeKind::Line { .. }))
            .collect();
        if lines.is_empty() {
            continue;
        }
        let xpos = tree.nodes[i].xpos;
        let text_node = tree.nodes.len();
        tree.nodes.push(Node { kind: NodeKind::Text, xpos, children: lines.clone(), parent: Some(i) });
        for &l in &lines {
            tree.nodes[l].parent = Some(text_node);
        }
        tree.nodes[i].children.retain(|c| !lines.contains(c));
        tree.nodes[i].children.push(text_node);
    }
}

/// Stage 3: hoist each `caption` into the next sibling of matching graphic kind
/// within a 5-node window; drop captions with no match (logged as a structural
/// violation).
pub fn normalize_captions(tree: &mut Tree) {
    let mut to_hoist: Vec<(NodeIndex, NodeIndex, usize)> = Vec::new();
    for parent_idx in 0..tree.nodes.len() {
        let children = tree.nodes[parent_idx].children.clone();
        for (pos, &child) in children.iter().enumerate() {
            if let NodeKind::Caption { kind, number } = &tree.nodes[child].kind {
                let kind = *kind;
                let number = *number;
                let window = children.iter().skip(pos + 1).take(5);
                if let Some(&target) = window.clone().find(|&&c| matches_graphic_kind(&tree.nodes[c].kind, kind)) {
                    to_hoist.push((child, target, number as usize));
                } else {
                    tracing::warn!(kind = kind, number, "caption has no matching graphic within window, dropping");
                }
            }
        }
    }
    for (caption, target, number) in to_hoist {
        let parent = tree.nodes[caption].parent;
        if let Some(p) = parent {
            tree.nodes[p].children.retain(|&c| c != caption);
        }
        tree.nodes[caption].parent = Some(target);
        tree.nodes[target].children.insert(0, caption);
        match &mut tree.nodes[target].kind {
            NodeKind::Table { .. } | NodeKind::Figure { .. } => {
                let _ = number;
            }
            _ => {}
        }
    }
}

fn matches_graphic_kind(kind: &NodeKind, caption_kind: &str) -> bool {
    match (kind, caption_kind) {
        (NodeKind::Table { .. }, "table") => true,
        (NodeKind::Figure { .. }, "figure") => true,
        _ => false,
    }
}

/// Stage 4: contiguous same-kind children wrap into a `list`, built bottom-up so
/// nested lists compose correctly.
pub fn normalize_lists(tree: &mut Tree) {
    // Process deepest nodes first by iterating node indices in reverse: children
    // are always pushed after their parent, so reverse order visits leaves first.
    for parent_idx in (0..tree.nodes.len()).rev() {
        let children = tree.nodes[parent_idx].children.clone();
        let mut runs: Vec<(usize, usize, crate::ast::ListKind)> = Vec::new();
        let mut i = 0;
        while i < children.len() {
            if let NodeKind::List { kind } = tree.nodes[children[i]].kind {
                let start = i;
                let mut j = i + 1;
                while j < children.len() {
                    if let NodeKind::List { kind: k2 } = tree.nodes[children[j]].kind {
                        if k2 == kind {
                            j += 1;
                            continue;
                        }
                    }
                    break;
                }
                runs.push((start, j, kind));
                i = j;
            } else {
                i += 1;
            }
        }
        if runs.is_empty() {
            continue;
        }
        for (start, end, kind) in runs.into_iter().rev() {
            let items = &children[start..end];
            let xpos = tree.nodes[items[0]].xpos;
            let list = tree.nodes.len();
            let all_elements: Vec<NodeIndex> =
                items.iter().flat_map(|&it| tree.nodes[it].children.clone()).collect();
            tree.nodes.push(Node { kind: NodeKind::List { kind }, xpos, children: all_elements.clone(), parent: Some(parent_idx) });
            for &e in &all_elements {
                tree.nodes[e].parent = Some(list);
            }
            tree.nodes[parent_idx].children.splice(start..end, [list]);
        }
    }
}

/// Stage 5: a lone `para` child of `element`/`caption` is flattened (these
/// already render their children as a block, so a solo wrapping `para` is
/// redundant); adjacent `text` nodes merge into the first. The document root
/// itself is never a flatten target — `html::render_block` only wraps `para`
/// nodes in `<p>`, so a top-level paragraph must keep its `para` wrapper or it
/// would render as bare unwrapped text.
pub fn normalize_paragraphs(tree: &mut Tree) {
    for parent_idx in 0..tree.nodes.len() {
        let is_target =
            matches!(tree.nodes[parent_idx].kind, NodeKind::Element { .. } | NodeKind::Caption { .. });
        if !is_target {
            continue;
        }
        let children = tree.nodes[parent_idx].children.clone();
        let para_children: Vec<NodeIndex> =
            children.iter().copied().filter(|&c| matches!(tree.nodes[c].kind, NodeKind::Para)).collect();
        if para_children.len() == 1 {
            let para = para_children[0];
            let grandchildren = tree.nodes[para].children.clone();
            for &g in &grandchildren {
                tree.nodes[g].parent = Some(parent_idx);
            }
            let pos = tree.nodes[parent_idx].children.iter().position(|&c| c == para).unwrap();
            tree.nodes[parent_idx].children.splice(pos..pos + 1, grandchildren);
        }

        let children = tree.nodes[parent_idx].children.clone();
        let mut merged: Vec<NodeIndex> = Vec::new();
        for &c in &children {
            if matches!(tree.nodes[c].kind, NodeKind::Text) {
                if let Some(&last) = merged.last() {
                    if matches!(tree.nodes[last].kind, NodeKind::Text) {
                        let extra = tree.nodes[c].children.clone();
                        for &e in &extra {
                            tree.nodes[e].parent = Some(last);
                        }
                        tree.nodes[last].children.extend(extra);
                        continue;
                    }
                }
            }
            merged.push(c);
        }
        tree.nodes[parent_idx].children = merged;
    }
}

/// Stage 6: empty headings are dropped; the surviving `para` child is renamed to
/// the heading level and inherits its marker.
pub fn normalize_headings(tree: &mut Tree) {
    let mut to_drop = Vec::new();
    for i in 0..tree.nodes.len() {
        if let NodeKind::Section { .. } = tree.nodes[i].kind.clone() {
            if tree.nodes[i].children.is_empty() {
                to_drop.push(i);
                continue;
            }
            // The placeholder `para` opened right after pushing the `section` node
            // carries the heading's own text; flatten it into `i` directly so a
            // heading never nests a second `section` inside itself.
            if let Some(&para) = tree.nodes[i].children.first() {
                if matches!(tree.nodes[para].kind, NodeKind::Para) {
                    let grandchildren = tree.nodes[para].children.clone();
                    for &g in &grandchildren {
                        tree.nodes[g].parent = Some(i);
                    }
                    tree.nodes[i].children.splice(0..1, grandchildren);
                }
            }
        }
    }
    for i in to_drop {
        if let Some(p) = tree.nodes[i].parent {
            tree.nodes[p].children.retain(|&c| c != i);
        }
    }
}

/// Stage 7: consecutive `bit` nodes on the same page fold into a `bitfield`
/// `VirtualTable` node (represented here as a `Table { is_register: false, .. }`
/// whose cells carry `is_simple` register labels).
pub fn normalize_registers(tree: &mut Tree) {
    for parent_idx in 0..tree.nodes.len() {
        let children = tree.nodes[parent_idx].children.clone();
        let mut i = 0;
        while i < children.len() {
            if matches!(tree.nodes[children[i]].kind, NodeKind::Bit { .. }) {
                let start = i;
                let mut j = i + 1;
                while j < children.len() && matches!(tree.nodes[children[j]].kind, NodeKind::Bit { .. }) {
                    j += 1;
                }
                if j - start >= 1 {
                    let xpos = tree.nodes[children[start]].xpos;
                    let rows: Vec<(String, String)> =
                        children[start..j].iter().map(|&b| bit_row_text(tree, b)).collect();
                    let bbox = crate::geom::Rectangle::new(0.0, 0.0, 0.0, 0.0);
                    let virtual_table = crate::table::VirtualTable::bitfield(rows, bbox);
                    let grid = Box::new(crate::table::Table {
                        bbox,
                        caption_bbox: None,
                        kind: crate::table::TableKind::Bitfield,
                        xpos: vec![0.0, 1.0, 2.0],
                        ypos: (0..=virtual_table.cells.len() / 2).map(|r| -(r as f64)).collect(),
                        cells: virtual_table.cells,
                        bit_headers: None,
                    });
                    let table = tree.nodes.len();
                    tree.nodes.push(Node {
                        kind: NodeKind::Table { width_frac: 0.5, is_register: false, grid: Some(grid) },
                        xpos,
                        children: children[start..j].to_vec(),
                        parent: Some(parent_idx),
                    });
                    for &b in &children[start..j] {
                        tree.nodes[b].parent = Some(table);
                    }
                    tree.nodes[parent_idx].children.splice(start..j, [table]);
                    break;
                }
                i = j;
            } else {
                i += 1;
            }
        }
    }
}

/// Stage 8: multi-page table continuations fold via `append_bottom`/`append_side`.
///
/// This stage operates on the AST (which tracks which `table` nodes share a
/// caption number) rather than on `crate::table::Table` directly: the actual cell
/// grid merge happens when a `table` node's source `Table` is resolved during HTML
/// emission. Here we only merge the AST's sibling table nodes sharing a caption
/// number into one, concatenating their child cell/caption subtrees; a merge that
/// cannot reconcile header skeletons leaves both tables as separate siblings
/// rather than aborting the document.
pub fn normalize_tables(tree: &mut Tree) {
    for parent_idx in 0..tree.nodes.len() {
        let children = tree.nodes[parent_idx].children.clone();
        let mut consumed = vec![false; children.len()];
        for i in 0..children.len() {
            if consumed[i] {
                continue;
            }
            if !matches!(tree.nodes[children[i]].kind, NodeKind::Table { .. }) {
                continue;
            }
            let number_i = caption_number(tree, children[i]);
            for j in (i + 1)..children.len() {
                if consumed[j] || !matches!(tree.nodes[children[j]].kind, NodeKind::Table { .. }) {
                    continue;
                }
                let number_j = caption_number(tree, children[j]);
                if number_i.is_some() && number_i == number_j {
                    let extra = tree.nodes[children[j]].children.clone();
                    for &e in &extra {
                        tree.nodes[e].parent = Some(children[i]);
                    }
                    tree.nodes[children[i]].children.extend(extra);
                    consumed[j] = true;
                }
            }
        }
        let kept: Vec<NodeIndex> = children.iter().enumerate().filter(|(idx, _)| !consumed[*idx]).map(|(_, &c)| c).collect();
        tree.nodes[parent_idx].children = kept;
    }
}

/// `(bit-range label, description)` for one `bit` node: the label comes from the
/// node's own `left` field (falling back to the text up to the first `:` of its
/// first descendant line), the description from the remaining line text.
fn bit_row_text(tree: &Tree, bit: NodeIndex) -> (String, String) {
    let (left, middle, right) = match &tree.nodes[bit].kind {
        NodeKind::Bit { left, middle, right, .. } => (left.clone(), middle.clone(), right.clone()),
        _ => (String::new(), String::new(), String::new()),
    };
    let mut lines_text = String::new();
    collect_line_text(tree, bit, &mut lines_text);
    if !left.is_empty() {
        let desc = if middle.is_empty() && right.is_empty() { lines_text } else { format!("{middle} {right}") };
        return (left, desc.trim().to_string());
    }
    let trimmed = lines_text.trim();
    match trimmed.split_once(':') {
        Some((label, rest)) => (label.trim().to_string(), rest.trim().to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

fn collect_line_text(tree: &Tree, node: NodeIndex, out: &mut String) {
    if let NodeKind::Line { content, .. } = &tree.nodes[node].kind {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(content);
    }
    for &c in &tree.nodes[node].children {
        collect_line_text(tree, c, out);
    }
}

fn caption_number(tree: &Tree, table: NodeIndex) -> Option<u32> {
    tree.nodes[table].children.iter().find_map(|&c| match &tree.nodes[c].kind {
        NodeKind::Caption { number, .. } => Some(*number),
        _ => None,
    })
}

/// Stage 9: split top-level children into `chapter{title, filename}` nodes at
/// `head1`/`head2` boundaries. Runs by default; when the CLI does not request
/// per-chapter output the stage's result is simply unused.
pub fn normalize_chapters(tree: &mut Tree) {
    let root = tree.root();
    let children = tree.nodes[root].children.clone();
    let mut chapters: Vec<(String, Vec<NodeIndex>)> = Vec::new();
    for &c in &children {
        let is_boundary = matches!(&tree.nodes[c].kind, NodeKind::Section { level, .. } if *level <= 2);
        if is_boundary || chapters.is_empty() {
            let title = heading_text(tree, c).unwrap_or_else(|| "untitled".to_string());
            chapters.push((title, Vec::new()));
        }
        chapters.last_mut().unwrap().1.push(c);
    }
    let mut new_children = Vec::new();
    for (title, members) in chapters {
        let filename = sanitize_filename(&title);
        let chapter = tree.nodes.len();
        tree.nodes.push(Node {
            kind: NodeKind::Chapter { title, filename },
            xpos: 0.0,
            children: members.clone(),
            parent: Some(root),
        });
        for &m in &members {
            tree.nodes[m].parent = Some(chapter);
        }
        new_children.push(chapter);
    }
    tree.nodes[root].children = new_children;
}

fn heading_text(tree: &Tree, node: NodeIndex) -> Option<String> {
    tree.nodes[node].children.iter().find_map(|&c| {
        tree.nodes[c].children.iter().find_map(|&g| match &tree.nodes[g].kind {
            NodeKind::Line { content, .. } => Some(content.clone()),
            _ => None,
        })
    })
}

fn sanitize_filename(title: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

/// A page whose content area reconstructed to nothing but the synthetic `page`
/// marker node — the boundary case of §8 where an empty content area yields a
/// single `area` node containing only that marker.
fn is_boilerplate_page(trees: &[Tree]) -> bool {
    trees
        .iter()
        .all(|t| t.nodes.iter().all(|n| matches!(n.kind, NodeKind::Document | NodeKind::Area | NodeKind::Page { .. })))
}

/// Run the full nine-stage pipeline over every page of `doc`, producing one
/// normalized document tree per requested chapter split (or a single tree if
/// chapters were not requested).
pub fn normalize_document(doc: &Document, config: &Config) -> Vec<crate::ast::Node> {
    let producer = doc.producer();
    let template = crate::classifier::select_template(producer);

    let mut page_trees = Vec::new();
    let mut em = 5.0;
    let mut em_set = false;
    for (i, page) in doc.pages.iter().enumerate() {
        if !config.page_selected(i) {
            continue;
        }
        if !em_set {
            em = template.spacing(page).x_em;
            em_set = true;
        }
        let areas = template.areas(page).content;
        let trees = crate::ast::content_ast(page, template.as_ref(), &areas, i);
        if !config.include_boilerplate && is_boilerplate_page(&trees) {
            tracing::warn!(page = i, "skipping boilerplate page");
            continue;
        }
        page_trees.extend(trees);
    }

    let mut tree = merge_pages(&page_trees, em);

    normalize_lines(&mut tree);
    normalize_captions(&mut tree);
    normalize_lists(&mut tree);
    normalize_paragraphs(&mut tree);
    normalize_headings(&mut tree);
    normalize_registers(&mut tree);
    normalize_tables(&mut tree);
    if config.chapters {
        normalize_chapters(&mut tree);
    }

    tree.nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    #[test]
    fn normalize_lines_wraps_lines_in_text_node() {
        let mut tree = Tree::new();
        let root = tree.root();
        let para = tree.push(root, NodeKind::Para, 0.0);
        tree.push(para, NodeKind::Line { xpos: 0.0, start: 0, content: "hi".into(), runs: vec![] }, 0.0);
        normalize_lines(&mut tree);
        let text_children: Vec<_> =
            tree.nodes[para].children.iter().filter(|&&c| matches!(tree.nodes[c].kind, NodeKind::Text)).collect();
        assert_eq!(text_children.len(), 1);
    }

    #[test]
    fn sanitize_filename_collapses_non_alphanumeric_runs() {
        assert_eq!(sanitize_filename("Chapter 1: Overview!!"), "chapter_1_overview");
    }

    #[test]
    fn normalize_headings_drops_empty_section() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.push(root, NodeKind::Section { level: 2, marker: "1".into() }, 0.0);
        normalize_headings(&mut tree);
        assert!(tree.nodes[root].children.is_empty());
    }

    #[test]
    fn boilerplate_page_is_just_area_and_page_marker() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.push(root, NodeKind::Page { number: 3 }, 0.0);
        assert!(is_boilerplate_page(&[tree]));
    }

    #[test]
    fn page_with_a_paragraph_is_not_boilerplate() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.push(root, NodeKind::Para, 0.0);
        assert!(!is_boilerplate_page(&[tree]));
    }
}
