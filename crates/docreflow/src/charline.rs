//! Line assembly: groups glyphs sharing a baseline (or a column, for rotated text)
//! into `CharLine`s, ordered the way a reader would scan the page.

use std::collections::HashMap;

use crate::geom::Rectangle;
use crate::page::{Character, Page};

/// Per-glyph character styling carried into inline HTML emission: bold/italic come
/// straight off the glyph, underline off whether it sits under a link, and
/// sub/superscript off where the glyph's origin falls relative to the line's own
/// baseline/height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub superscript: bool,
    pub subscript: bool,
}

/// A run of characters that share a baseline (rotation 0/180) or a column
/// (rotation 90/270).
#[derive(Debug, Clone)]
pub struct CharLine<'a> {
    pub chars: Vec<&'a Character>,
    pub rotation: i32,
    pub origin: f64,
    pub bottom: f64,
    pub top: f64,
    pub height: f64,
    /// `page.height − origin` for horizontal lines, raw `origin.x` for vertical ones
    /// — the single scalar the full reading-order list is sorted by.
    sort_origin: f64,
}

impl<'a> CharLine<'a> {
    pub fn text(&self) -> String {
        self.chars.iter().filter_map(|c| c.char()).collect()
    }

    /// Sub/superscript for one of this line's own characters, following the same
    /// rotation-aware baseline/height thresholds (`0.25`/`0.15` em-of-height) the
    /// merge above uses to decide whether a shorter neighbour line merges in.
    fn sub_superscript(&self, c: &Character) -> (bool, bool) {
        match self.rotation {
            90 | 270 => {
                if c.origin.x < self.origin - 0.25 * self.height {
                    (true, false)
                } else if c.origin.x > self.origin + 0.15 * self.height {
                    (false, true)
                } else {
                    (false, false)
                }
            }
            _ => {
                if c.origin.y > self.origin + 0.25 * self.height {
                    (true, false)
                } else if c.origin.y < self.origin - 0.15 * self.height {
                    (false, true)
                } else {
                    (false, false)
                }
            }
        }
    }

    pub fn char_style(&self, c: &Character, page: &Page) -> CharStyle {
        let (superscript, subscript) = self.sub_superscript(c);
        CharStyle { bold: c.is_bold(), italic: c.is_italic(), underline: page.char_is_linked(c), superscript, subscript }
    }

    /// This line's text as contiguous `(style, text)` runs, in the same character
    /// order `text()` returns — the input to inline HTML tag emission.
    pub fn styled_runs(&self, page: &Page) -> Vec<(CharStyle, String)> {
        let mut runs: Vec<(CharStyle, String)> = Vec::new();
        for &c in &self.chars {
            let Some(ch) = c.char() else { continue };
            let style = self.char_style(c, page);
            match runs.last_mut() {
                Some((last_style, text)) if *last_style == style => text.push(ch),
                _ => runs.push((style, ch.to_string())),
            }
        }
        runs
    }

    pub fn bbox(&self) -> Rectangle {
        match self.rotation {
            90 | 270 => Rectangle::new(self.bottom, f64::MIN, self.top, f64::MAX),
            _ => Rectangle::new(f64::MIN, self.bottom, f64::MAX, self.top),
        }
    }

    pub fn is_bold_fraction(&self) -> f64 {
        let non_ws: Vec<&&Character> = self.chars.iter().filter(|c| !c.is_whitespace()).collect();
        if non_ws.is_empty() {
            return 0.0;
        }
        non_ws.iter().filter(|c| c.is_bold()).count() as f64 / non_ws.len() as f64
    }

    /// Neighbour-gap clustering: characters split into a new cluster whenever the
    /// gap since the last non-space character exceeds `atol` (default one em). A
    /// run of trailing spaces does not itself widen the gap past that tolerance.
    pub fn clusters(&self, atol: f64) -> Vec<Vec<&'a Character>> {
        let mut out: Vec<Vec<&'a Character>> = Vec::new();
        let mut current: Vec<&'a Character> = Vec::new();
        let mut last_edge: Option<f64> = None;

        for &c in &self.chars {
            let (lead, trail) = match self.rotation {
                90 | 270 => (c.tbbox.bottom, c.tbbox.top),
                _ => (c.tbbox.left, c.tbbox.right),
            };
            if let Some(edge) = last_edge {
                if lead - edge > atol {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                }
            }
            current.push(c);
            if !c.is_whitespace() {
                last_edge = Some(trail);
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

fn quantize(v: f64) -> i64 {
    (v * 10.0).round() as i64
}

/// Characters with the same rounded key form one provisional line.
fn collapse_bucket<'a>(
    rotation_group: i32,
    buckets: HashMap<i64, Vec<&'a Character>>,
    page_height: f64,
) -> Vec<CharLine<'a>> {
    let mut lines = Vec::new();
    for (_, mut chars) in buckets {
        if chars.iter().all(|c| c.is_whitespace()) {
            continue;
        }
        chars.sort_by(|a, b| a.origin.x.partial_cmp(&b.origin.x).unwrap());
        let bottom = chars.iter().map(|c| c.tbbox.bottom).fold(f64::INFINITY, f64::min);
        let top = chars.iter().map(|c| c.tbbox.top).fold(f64::NEG_INFINITY, f64::max);
        let origin = chars[0].origin.y;
        let height = top - bottom;
        let rotation = rotation_group;
        let sort_origin = match rotation {
            90 | 270 => chars[0].origin.x,
            _ => page_height - origin,
        };
        lines.push(CharLine { chars, rotation, origin, bottom, top, height, sort_origin });
    }
    lines
}

/// Merge tolerance: `rtol * max(height)` between vertically adjacent lines, default
/// `rtol` is the classifier's `sc` spacing constant (0.3-ish); callers that don't
/// have a template handy may use `DEFAULT_MERGE_RTOL`.
pub const DEFAULT_MERGE_RTOL: f64 = 0.3;

fn merge_adjacent<'a>(mut lines: Vec<CharLine<'a>>, rtol: f64) -> Vec<CharLine<'a>> {
    let mut merged: Vec<CharLine<'a>> = Vec::new();
    for line in lines.drain(..) {
        if let Some(prev) = merged.last_mut() {
            let tol = rtol * prev.height.max(line.height);
            if (prev.sort_origin - line.sort_origin).abs() <= tol {
                // The taller line keeps its baseline/height; the shorter line's
                // characters become sub/superscript of the merged line.
                if line.height > prev.height {
                    let mut combined = prev.chars.clone();
                    combined.extend(line.chars.iter().cloned());
                    prev.chars = combined;
                    prev.bottom = prev.bottom.min(line.bottom);
                    prev.top = prev.top.max(line.top);
                    prev.height = prev.top - prev.bottom;
                    prev.origin = line.origin;
                    prev.sort_origin = line.sort_origin;
                } else {
                    prev.chars.extend(line.chars.iter().cloned());
                    prev.bottom = prev.bottom.min(line.bottom);
                    prev.top = prev.top.max(line.top);
                    prev.height = prev.top - prev.bottom;
                }
                continue;
            }
        }
        merged.push(line);
    }
    merged
}

/// Re-sort a line's characters into logical reading order and push newline/carriage
/// return glyphs to the end via a `±1e9` offset so they never interleave with real
/// content.
fn reading_order_sort(line: &mut CharLine<'_>) {
    const PUSH: f64 = 1e9;
    let rotation = line.rotation;
    line.chars.sort_by(|a, b| {
        let key = |c: &&Character| -> f64 {
            let base = match rotation {
                90 => c.tbbox.midpoint().y,
                270 => -c.tbbox.midpoint().y,
                _ => c.origin.x,
            };
            if c.is_newline() {
                base + PUSH
            } else {
                base
            }
        };
        key(a).partial_cmp(&key(b)).unwrap()
    });
}

/// Assemble every `CharLine` covering the characters of `area`, in reading order.
pub fn charlines_in_area<'a>(chars: &[&'a Character], page_height: f64, rtol: f64) -> Vec<CharLine<'a>> {
    let mut horiz_buckets: HashMap<i64, Vec<&'a Character>> = HashMap::new();
    let mut vert_buckets: HashMap<i64, Vec<&'a Character>> = HashMap::new();

    for &c in chars {
        match c.rotation.rem_euclid(360) {
            90 | 270 => vert_buckets.entry(quantize(c.origin.x)).or_default().push(c),
            _ => horiz_buckets.entry(quantize(c.origin.y)).or_default().push(c),
        }
    }

    let mut horiz_lines = collapse_bucket(0, horiz_buckets, page_height);
    horiz_lines.sort_by(|a, b| b.sort_origin.partial_cmp(&a.sort_origin).unwrap());

    let mut vert_lines = collapse_bucket(90, vert_buckets, page_height);
    vert_lines.sort_by(|a, b| a.sort_origin.partial_cmp(&b.sort_origin).unwrap());

    let mut all = horiz_lines;
    all.append(&mut vert_lines);

    let mut merged = merge_adjacent(all, rtol);
    for line in &mut merged {
        reading_order_sort(line);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point;
    use crate::primitive::{GlyphPrim, RenderMode};

    fn glyph(ch: char, x: f64, y: f64) -> GlyphPrim {
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

    fn build_chars(glyphs: Vec<GlyphPrim>) -> Vec<Character> {
        use crate::page::{BboxCache, Document};
        use crate::primitive::fixture::{FixtureDocument, FixturePage};
        let page = FixturePage { width: 600.0, height: 800.0, rotation: 0, glyphs, ..Default::default() };
        let doc = FixtureDocument { pages: vec![page], ..Default::default() };
        let _ = BboxCache::new();
        let document = Document::load(&doc);
        document.pages[0].chars.clone()
    }

    #[test]
    fn same_baseline_glyphs_form_one_line_in_reading_order() {
        let chars = build_chars(vec![glyph('H', 100.0, 700.0), glyph('i', 106.0, 700.0)]);
        let refs: Vec<&Character> = chars.iter().collect();
        let lines = charlines_in_area(&refs, 800.0, DEFAULT_MERGE_RTOL);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text(), "Hi");
    }

    #[test]
    fn lines_are_ordered_top_first() {
        let chars = build_chars(vec![glyph('A', 100.0, 700.0), glyph('B', 100.0, 100.0)]);
        let refs: Vec<&Character> = chars.iter().collect();
        let lines = charlines_in_area(&refs, 800.0, DEFAULT_MERGE_RTOL);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "A");
        assert_eq!(lines[1].text(), "B");
    }

    #[test]
    fn clusters_split_on_wide_gaps() {
        let chars = build_chars(vec![glyph('A', 0.0, 700.0), glyph('B', 6.0, 700.0), glyph('C', 60.0, 700.0)]);
        let refs: Vec<&Character> = chars.iter().collect();
        let lines = charlines_in_area(&refs, 800.0, DEFAULT_MERGE_RTOL);
        let clusters = lines[0].clusters(8.0);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 2);
        assert_eq!(clusters[1].len(), 1);
    }
}
