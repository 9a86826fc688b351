//! End-to-end scenarios exercising the reconstruction pipeline's seed cases:
//! a plain paragraph, a nested list, a bordered table, a multi-page table
//! continuation, a register bitfield grid, and a rotated table header.

use std::sync::Once;

use docreflow::ast::{ListKind, NodeKind, Tree};
use docreflow::geom::Rectangle;
use docreflow::html::write_document;
use docreflow::normalize::{normalize_lines, normalize_paragraphs};
use docreflow::table::{Borders, Cell, Table, TableKind};

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn render(tree: &Tree) -> anyhow::Result<String> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.html");
    write_document(&tree.nodes, &path)?;
    Ok(std::fs::read_to_string(&path)?)
}

#[test]
fn single_paragraph_reconstructs_to_p_tag() -> anyhow::Result<()> {
    init_tracing();
    let mut tree = Tree::new();
    let root = tree.root();
    let para = tree.push(root, NodeKind::Para, 0.0);
    tree.push(para, NodeKind::Line { xpos: 0.0, start: 0, content: "Hello World.".into(), runs: vec![] }, 0.0);

    normalize_lines(&mut tree);
    normalize_paragraphs(&mut tree);

    let content = render(&tree)?;
    assert!(content.contains("<p>Hello World.</p>"), "got: {content}");
    Ok(())
}

#[test]
fn nested_bullet_list_round_trips_to_nested_ul() -> anyhow::Result<()> {
    init_tracing();
    let mut tree = Tree::new();
    let root = tree.root();

    let list = tree.push(root, NodeKind::List { kind: ListKind::Bullet }, 0.0);
    let elem_a = tree.push(list, NodeKind::Element { value: None }, 0.0);
    tree.push(elem_a, NodeKind::Line { xpos: 0.0, start: 0, content: "A".into(), runs: vec![] }, 0.0);
    let nested = tree.push(elem_a, NodeKind::List { kind: ListKind::Bullet }, 0.0);
    let elem_b = tree.push(nested, NodeKind::Element { value: None }, 0.0);
    tree.push(elem_b, NodeKind::Line { xpos: 0.0, start: 0, content: "B".into(), runs: vec![] }, 0.0);
    let elem_c = tree.push(list, NodeKind::Element { value: None }, 0.0);
    tree.push(elem_c, NodeKind::Line { xpos: 0.0, start: 0, content: "C".into(), runs: vec![] }, 0.0);

    let content = render(&tree)?;
    assert!(
        content.contains("<li>A<ul>\n<li>B</li>\n</ul>\n</li>\n<li>C</li>\n"),
        "got: {content}"
    );
    Ok(())
}

fn cell(r: usize, c: usize, is_header: bool, content: &str) -> Cell {
    Cell {
        positions: vec![(r, c)],
        bbox: Rectangle::new(0.0, 0.0, 1.0, 1.0),
        borders: Borders::default(),
        is_header,
        is_simple: false,
        content: content.into(),
        rotation: 0,
        is_left_aligned: false,
    }
}

fn left_aligned_cell(r: usize, c: usize, content: &str) -> Cell {
    Cell { is_left_aligned: true, ..cell(r, c, false, content) }
}

#[test]
fn two_by_two_bordered_table_marks_header_row() -> anyhow::Result<()> {
    init_tracing();
    let bbox = Rectangle::new(0.0, 0.0, 20.0, 20.0);
    let table = Table {
        bbox,
        caption_bbox: None,
        kind: TableKind::Table,
        xpos: vec![0.0, 10.0, 20.0],
        ypos: vec![20.0, 10.0, 0.0],
        cells: vec![cell(0, 0, true, "H1"), cell(0, 1, true, "H2"), left_aligned_cell(1, 0, "a"), cell(1, 1, false, "b")],
        bit_headers: None,
    };
    assert_eq!(table.cols(), 2);
    assert_eq!(table.rows(), 2);

    let mut tree = Tree::new();
    let root = tree.root();
    tree.push(root, NodeKind::Table { width_frac: 1.0, is_register: false, grid: Some(Box::new(table)) }, 0.0);

    let content = render(&tree)?;
    assert!(content.contains("<th class=\"thb\">H1</th>"), "got: {content}");
    assert!(content.contains("<th class=\"thb\">H2</th>"), "got: {content}");
    // Only the cell whose text actually sits left-aligned within its bbox gets `tl`.
    assert!(content.contains("<td class=\"tl\">a</td>"), "got: {content}");
    assert!(content.contains("<td>b</td>"), "got: {content}");
    Ok(())
}

#[test]
fn table_continuation_appends_next_pages_rows() {
    let header_row = |content_left: &str, content_right: &str| {
        vec![cell(0, 0, true, content_left), cell(0, 1, true, content_right)]
    };
    let mut page1 = Table {
        bbox: Rectangle::new(0.0, 0.0, 20.0, 20.0),
        caption_bbox: None,
        kind: TableKind::Table,
        xpos: vec![0.0, 10.0, 20.0],
        ypos: vec![20.0, 10.0, 0.0],
        cells: {
            let mut cells = header_row("H1", "H2");
            cells.push(cell(1, 0, false, "a"));
            cells.push(cell(1, 1, false, "b"));
            cells
        },
        bit_headers: None,
    };
    let page2 = Table {
        bbox: Rectangle::new(0.0, 0.0, 20.0, 20.0),
        caption_bbox: None,
        kind: TableKind::Table,
        xpos: vec![0.0, 10.0, 20.0],
        ypos: vec![20.0, 10.0, 0.0],
        cells: {
            let mut cells = header_row("H1", "H2");
            cells.push(cell(1, 0, false, "c"));
            cells.push(cell(1, 1, false, "d"));
            cells
        },
        bit_headers: None,
    };

    assert!(page1.append_bottom(page2, true));
    assert_eq!(page1.rows(), 3);

    let mut continuation_row: Vec<&str> =
        page1.cells.iter().filter(|c| c.row_range().0 == 2).map(|c| c.content.as_str()).collect();
    continuation_row.sort();
    assert_eq!(continuation_row, vec!["c", "d"]);

    // The continuation page's own header row was dropped, not duplicated.
    let header_rows: usize = page1.cells.iter().filter(|c| c.is_header).map(|c| c.row_range().1 + 1).max().unwrap_or(0);
    assert_eq!(header_rows, 1);
}

#[test]
fn register_bitfield_grid_is_32_by_4_and_carries_rt_class() -> anyhow::Result<()> {
    init_tracing();
    let bbox = Rectangle::new(0.0, 0.0, 32.0, 4.0);
    let xpos: Vec<f64> = (0..=32).map(|i| i as f64).collect();
    let ypos: Vec<f64> = (0..=4).map(|i| (4 - i) as f64).collect();
    let bar = Cell {
        positions: (28..=31).map(|c| (3usize, c)).collect(),
        bbox,
        borders: Borders::default(),
        is_header: false,
        is_simple: false,
        content: "BAR[3:0]".into(),
        rotation: 0,
        is_left_aligned: false,
    };
    let table =
        Table { bbox, caption_bbox: None, kind: TableKind::Register, xpos, ypos, cells: vec![bar], bit_headers: Some(1) };
    assert_eq!(table.cols(), 32);
    assert_eq!(table.rows(), 4);

    let mut tree = Tree::new();
    let root = tree.root();
    tree.push(root, NodeKind::Table { width_frac: 1.0, is_register: true, grid: Some(Box::new(table)) }, 0.0);

    let content = render(&tree)?;
    assert!(content.contains("class=\"rt\""), "got: {content}");
    assert!(content.contains("colspan=\"4\""), "got: {content}");
    assert!(content.contains("BAR[3:0]"), "got: {content}");
    Ok(())
}

#[test]
fn rotated_header_cell_wraps_content_in_vertical_span() -> anyhow::Result<()> {
    init_tracing();
    let bbox = Rectangle::new(0.0, 0.0, 10.0, 10.0);
    let rotated_header = Cell { rotation: 90, ..cell(0, 0, true, "H1") };
    let table = Table {
        bbox,
        caption_bbox: None,
        kind: TableKind::Table,
        xpos: vec![0.0, 10.0],
        ypos: vec![10.0, 0.0],
        cells: vec![rotated_header],
        bit_headers: None,
    };

    let mut tree = Tree::new();
    let root = tree.root();
    tree.push(root, NodeKind::Table { width_frac: 1.0, is_register: false, grid: Some(Box::new(table)) }, 0.0);

    let content = render(&tree)?;
    assert!(content.contains("<th class=\"thb\"><span class=\"tv\">H1</span></th>"), "got: {content}");
    Ok(())
}
