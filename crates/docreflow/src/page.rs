//! The page primitive model (component B): owned, rotation-normalized wrappers over
//! whatever a `primitive::DocumentPrim`/`PagePrim` backend delivers.
//!
//! Every geometric value exposed from here on is already expressed as if the page's
//! `/Rotate` entry were zero — callers never have to think about rotation again,
//! except where `Character::rotation` itself carries the glyph's own orientation
//! (needed to route it into the horizontal or vertical `CharLine` bucket).

use std::collections::HashMap;

use dashmap::DashMap;

use crate::geom::{Point, Rectangle};
use crate::primitive::{
    CapStyle, DocumentPrim, GlyphPrim, ImagePrim, JoinStyle, ObjLinkPrim, PagePrim, PointKind, RenderMode,
    SegmentKind, StructurePrim, WebLinkPrim,
};

/// Rotate a point from the page's native coordinate space into display space.
fn rotate_point(p: Point, rotation: i32, width: f64, height: f64) -> Point {
    match rotation.rem_euclid(360) {
        90 => Point::new(p.y, width - p.x),
        180 => Point::new(width - p.x, height - p.y),
        270 => Point::new(height - p.y, p.x),
        _ => p,
    }
}

fn rotate_rect(r: &Rectangle, rotation: i32, width: f64, height: f64) -> Rectangle {
    let p0 = rotate_point(Point::new(r.left, r.bottom), rotation, width, height);
    let p1 = rotate_point(Point::new(r.right, r.top), rotation, width, height);
    Rectangle::from_points(p0, p1)
}

/// Key into the document-wide glyph bbox cache: `(font, unicode, tight height, tight
/// width)`, matching the cache key the reference engine uses to donate an unrotated
/// glyph's loose bbox to a later rotated instance of the same glyph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BboxCacheKey {
    font: String,
    unicode: u32,
    height_tenths: i64,
    width_tenths: i64,
}

impl BboxCacheKey {
    fn new(font: &str, unicode: u32, tbbox: &Rectangle) -> Self {
        BboxCacheKey {
            font: font.to_string(),
            unicode,
            height_tenths: (tbbox.height() * 10.0).round() as i64,
            width_tenths: (tbbox.width() * 10.0).round() as i64,
        }
    }
}

/// Write-once-per-key document-wide bbox cache (§5: first writer wins, readers see
/// either absent or final value).
#[derive(Debug, Default)]
pub struct BboxCache {
    entries: DashMap<BboxCacheKey, Rectangle>,
}

impl BboxCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn donate(&self, font: &str, unicode: u32, tbbox: &Rectangle, donor: Rectangle) {
        self.entries.entry(BboxCacheKey::new(font, unicode, tbbox)).or_insert(donor);
    }

    fn lookup(&self, font: &str, unicode: u32, tbbox: &Rectangle) -> Option<Rectangle> {
        self.entries.get(&BboxCacheKey::new(font, unicode, tbbox)).map(|e| *e)
    }
}

fn is_whitespace_unicode(cp: u32) -> bool {
    matches!(cp, 0x20 | 0x9 | 0xA | 0xD)
}

/// Drop CR and the registered-trademark sign; remap the legacy hyphen alias and the
/// two private-use bullet codepoints; drop other C0 controls except LF.
pub fn default_unicode_filter(cp: u32) -> Option<u32> {
    match cp {
        0xD | 0xAE => None,
        2 => Some('-' as u32),
        61623 | 61664 => Some(0x2022),
        c if c < 0x20 && c != 0xA => None,
        c => Some(c),
    }
}

/// A glyph with page-rotation already folded into its geometry.
#[derive(Debug, Clone)]
pub struct Character {
    pub unicode: u32,
    pub origin: Point,
    /// Loose bbox, falling back to the tight bbox whenever it would otherwise be
    /// empty or absent.
    pub bbox: Rectangle,
    pub tbbox: Rectangle,
    pub rotation: i32,
    pub render_mode: RenderMode,
    pub font: String,
    pub font_flags: u32,
    pub size: f64,
    pub weight: i32,
    pub fill: u32,
    pub stroke: u32,
}

impl Character {
    pub fn is_whitespace(&self) -> bool {
        is_whitespace_unicode(self.unicode)
    }

    pub fn is_newline(&self) -> bool {
        matches!(self.unicode, 0xA | 0xD)
    }

    pub fn char(&self) -> Option<char> {
        char::from_u32(self.unicode)
    }

    /// Bold-ish by either font weight or the PDF `ForceBold` flag (bit 18, `1<<18`).
    pub fn is_bold(&self) -> bool {
        self.weight >= 600 || (self.font_flags & (1 << 18)) != 0
    }

    pub fn is_italic(&self) -> bool {
        (self.font_flags & (1 << 6)) != 0
    }

    /// Width/height swap under 90/270 rotation, taken from the tight bbox.
    pub fn width(&self) -> f64 {
        match self.rotation.rem_euclid(360) {
            90 | 270 => self.tbbox.height(),
            _ => self.tbbox.width(),
        }
    }

    pub fn height(&self) -> f64 {
        match self.rotation.rem_euclid(360) {
            90 | 270 => self.tbbox.width(),
            _ => self.tbbox.height(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathPoint {
    pub point: Point,
    pub kind: PointKind,
}

#[derive(Debug, Clone)]
pub struct Path {
    pub points: Vec<PathPoint>,
    pub stroke: u32,
    pub fill: u32,
    pub stroke_width: f64,
    pub cap: CapStyle,
    pub join: JoinStyle,
    pub bbox: Rectangle,
}

impl Path {
    pub fn count(&self) -> usize {
        self.points.len()
    }

    /// Consecutive point pairs, as used by line-segment classification.
    pub fn lines(&self) -> Vec<(Point, Point)> {
        self.points.windows(2).map(|w| (w[0].point, w[1].point)).collect()
    }
}

/// An image presents the same 4-corner/4-edge surface as a zero-width, zero-fill
/// `Path` so clustering code never has to special-case it.
#[derive(Debug, Clone)]
pub struct Image {
    pub bbox: Rectangle,
}

impl Image {
    pub fn as_path(&self) -> Path {
        let corners = self.bbox.points();
        Path {
            points: corners.iter().map(|p| PathPoint { point: *p, kind: PointKind::Line }).collect(),
            stroke: 0,
            fill: 0,
            stroke_width: 0.0,
            cap: CapStyle::Butt,
            join: JoinStyle::Miter,
            bbox: self.bbox,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjLink {
    pub bbox: Rectangle,
    pub page_index: usize,
}

#[derive(Debug, Clone)]
pub struct WebLink {
    pub bboxes: Vec<Rectangle>,
    pub char_range: (usize, usize),
    pub url: String,
}

/// Either a graphic unit fed into clustering: a vector path, or an image treated as
/// one.
#[derive(Debug, Clone)]
pub enum GraphicObj {
    Path(Path),
    Image(Image),
}

impl GraphicObj {
    pub fn bbox(&self) -> Rectangle {
        match self {
            GraphicObj::Path(p) => p.bbox,
            GraphicObj::Image(i) => i.bbox,
        }
    }

    pub fn as_path(&self) -> Path {
        match self {
            GraphicObj::Path(p) => p.clone(),
            GraphicObj::Image(i) => i.as_path(),
        }
    }
}

/// An index over a page's characters bucketed by rounded origin-y, then within each
/// bucket sorted by origin-x — the structure `chars_in_area` binary-searches.
struct CharIndex {
    /// Sorted by key.
    rows: Vec<(i64, Vec<usize>)>,
}

fn quantize(v: f64) -> i64 {
    (v * 10.0).round() as i64
}

impl CharIndex {
    fn build(chars: &[Character]) -> Self {
        let mut by_row: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, c) in chars.iter().enumerate() {
            by_row.entry(quantize(c.origin.y)).or_default().push(i);
        }
        for v in by_row.values_mut() {
            v.sort_by(|&a, &b| chars[a].origin.x.partial_cmp(&chars[b].origin.x).unwrap());
        }
        let mut rows: Vec<(i64, Vec<usize>)> = by_row.into_iter().collect();
        rows.sort_by_key(|(k, _)| *k);
        CharIndex { rows }
    }

    /// O(log N + k): binary search the row band, then binary search within each row.
    fn in_area(&self, chars: &[Character], area: &Rectangle) -> Vec<usize> {
        let lo = quantize(area.bottom);
        let hi = quantize(area.top);
        let start = self.rows.partition_point(|(k, _)| *k < lo);
        let end = self.rows.partition_point(|(k, _)| *k <= hi);
        let mut out = Vec::new();
        for (_, idxs) in &self.rows[start..end] {
            let xs: Vec<f64> = idxs.iter().map(|&i| chars[i].origin.x).collect();
            let xstart = xs.partition_point(|&x| x < area.left);
            let xend = xs.partition_point(|&x| x <= area.right);
            out.extend_from_slice(&idxs[xstart..xend]);
        }
        out
    }
}

/// A document page with fully owned, rotation-normalized geometry.
pub struct Page {
    pub index: usize,
    pub width: f64,
    pub height: f64,
    pub rotation: i32,
    pub chars: Vec<Character>,
    pub graphics: Vec<GraphicObj>,
    pub obj_links: Vec<ObjLink>,
    pub web_links: Vec<WebLink>,
    pub structures: Vec<StructurePrim>,
    char_index: CharIndex,
}

fn build_glyph(glyph: &GlyphPrim, page_rotation: i32, width: f64, height: f64, cache: &BboxCache) -> Character {
    // The reference engine forces 90 degrees when the page itself is rotated 90 and
    // the glyph carries no explicit rotation of its own, as long as it renders
    // something visible — text drawn "straight" on an already-rotated page is, in
    // display space, actually sideways.
    let rotation = if page_rotation == 90 && glyph.rotation == 0 && !is_whitespace_unicode(glyph.unicode) {
        90
    } else {
        (page_rotation + glyph.rotation).rem_euclid(360)
    };

    let tbbox_native = glyph.tight_bbox.unwrap_or(Rectangle::new(
        glyph.origin.x,
        glyph.origin.y,
        glyph.origin.x,
        glyph.origin.y,
    ));
    let tbbox = rotate_rect(&tbbox_native, rotation, width, height);
    let origin = rotate_point(glyph.origin, rotation, width, height);

    let bbox = match glyph.loose_bbox {
        Some(loose) => {
            let normalized = rotate_rect(&loose, rotation, width, height);
            if rotation == 0 {
                let donor = normalized.offset(-origin.x, -origin.y);
                cache.donate(&glyph.font_name, glyph.unicode, &tbbox, donor);
            }
            normalized
        }
        None => {
            if rotation != 0 {
                if let Some(donor) = cache.lookup(&glyph.font_name, glyph.unicode, &tbbox) {
                    donor.offset(origin.x, origin.y)
                } else {
                    if !is_whitespace_unicode(glyph.unicode) {
                        tracing::debug!(
                            unicode = glyph.unicode,
                            font = %glyph.font_name,
                            "no bbox cache hit for rotated glyph, falling back to tight bbox"
                        );
                    }
                    tbbox
                }
            } else {
                tbbox
            }
        }
    };

    Character {
        unicode: glyph.unicode,
        origin,
        bbox,
        tbbox,
        rotation,
        render_mode: glyph.render_mode,
        font: glyph.font_name.clone(),
        font_flags: glyph.font_flags,
        size: glyph.size,
        weight: glyph.weight,
        fill: glyph.fill_rgba,
        stroke: glyph.stroke_rgba,
    }
}

fn build_path(path: &crate::primitive::PathPrim, rotation: i32, width: f64, height: f64) -> Path {
    let mut points = Vec::with_capacity(path.segments.len());
    for seg in &path.segments {
        let kind = match seg.kind {
            SegmentKind::Move => PointKind::Move,
            SegmentKind::Line => PointKind::Line,
            SegmentKind::Bezier => PointKind::Bezier,
        };
        let p = rotate_point(Point::new(seg.x, seg.y), rotation, width, height);
        points.push(PathPoint { point: p, kind });
    }
    // A closed subpath repeats its first point at the end.
    if let (Some(first), Some(last)) = (points.first().cloned(), points.last()) {
        if points.len() > 1 && !first.point.isclose(&last.point, 1e-6) && path.segments.iter().any(|s| s.close) {
            points.push(first);
        }
    }
    Path {
        points,
        stroke: path.stroke_rgba,
        fill: path.fill_rgba,
        stroke_width: path.stroke_width,
        cap: path.cap,
        join: path.join,
        bbox: rotate_rect(&path.bbox, rotation, width, height),
    }
}

impl Page {
    pub fn from_primitive(index: usize, prim: &impl PagePrim, cache: &BboxCache) -> Self {
        let rotation = prim.rotation();
        let (width, height) = match rotation {
            90 | 270 => (prim.height(), prim.width()),
            _ => (prim.width(), prim.height()),
        };

        let chars: Vec<Character> = prim
            .glyphs()
            .iter()
            .filter_map(|g| default_unicode_filter(g.unicode).map(|u| (g, u)))
            .map(|(g, u)| {
                let mut c = build_glyph(g, rotation, width, height, cache);
                c.unicode = u;
                c
            })
            .collect();

        let mut graphics: Vec<GraphicObj> =
            prim.paths().iter().map(|p| GraphicObj::Path(build_path(p, rotation, width, height))).collect();
        graphics.extend(prim.images().iter().map(|img: &ImagePrim| {
            GraphicObj::Image(Image { bbox: rotate_rect(&img.bbox, rotation, width, height) })
        }));

        let obj_links = prim
            .obj_links()
            .iter()
            .map(|l: &ObjLinkPrim| ObjLink { bbox: rotate_rect(&l.bbox, rotation, width, height), page_index: l.dest_page_index })
            .collect();
        let web_links = prim
            .web_links()
            .iter()
            .map(|l: &WebLinkPrim| WebLink {
                bboxes: l.bboxes.iter().map(|b| rotate_rect(b, rotation, width, height)).collect(),
                char_range: l.char_range,
                url: l.url.clone(),
            })
            .collect();

        let char_index = CharIndex::build(&chars);

        Page {
            index,
            width,
            height,
            rotation,
            chars,
            graphics,
            obj_links,
            web_links,
            structures: prim.structures().to_vec(),
            char_index,
        }
    }

    pub fn bbox(&self) -> Rectangle {
        Rectangle::new(0.0, 0.0, self.width, self.height)
    }

    /// O(log N + k) lookup via the two-level row/column index.
    pub fn chars_in_area(&self, area: &Rectangle) -> Vec<&Character> {
        self.char_index.in_area(&self.chars, area).into_iter().map(|i| &self.chars[i]).collect()
    }

    pub fn text_in_area(&self, area: &Rectangle) -> String {
        self.chars_in_area(area).into_iter().filter_map(|c| c.char()).collect()
    }

    /// Whether `c`'s origin falls inside an object link's target area or a web
    /// link's underlying bbox — the underline style an anchor gets in the reference
    /// output.
    pub fn char_is_linked(&self, c: &Character) -> bool {
        self.obj_links.iter().any(|l| l.bbox.contains_point(c.origin))
            || self.web_links.iter().any(|l| l.bboxes.iter().any(|b| b.contains_point(c.origin)))
    }

    /// Consecutive whole-word matches of `needle`, returned as lists of the matching
    /// characters (so callers can recover bboxes for highlighting).
    pub fn find(&self, needle: &str, case_sensitive: bool) -> Vec<Vec<&Character>> {
        if needle.is_empty() {
            return Vec::new();
        }
        let fold = |s: &str| if case_sensitive { s.to_string() } else { s.to_lowercase() };
        let target = fold(needle);
        let content: String = self.chars.iter().filter_map(|c| c.char()).collect();
        let content_folded = fold(&content);
        let mut matches = Vec::new();
        let mut start = 0;
        while let Some(pos) = content_folded[start..].find(&target) {
            let byte_pos = start + pos;
            let char_start = content_folded[..byte_pos].chars().count();
            let char_len = target.chars().count();
            if char_start + char_len <= self.chars.len() {
                matches.push(self.chars[char_start..char_start + char_len].iter().collect());
            }
            start = byte_pos + target.len().max(1);
        }
        matches
    }
}

/// A document with fully loaded pages and the shared glyph-bbox cache.
pub struct Document {
    pub metadata: HashMap<String, String>,
    pub pages: Vec<Page>,
    pub toc: Vec<crate::primitive::OutlineItem>,
    bbox_cache: BboxCache,
}

impl Document {
    pub fn load(prim: &impl DocumentPrim) -> Self {
        let bbox_cache = BboxCache::new();
        let pages = (0..prim.page_count()).map(|i| Page::from_primitive(i, prim.page(i), &bbox_cache)).collect();
        Document { metadata: prim.metadata().clone(), pages, toc: prim.toc().to_vec(), bbox_cache }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> &Page {
        &self.pages[index]
    }

    pub fn producer(&self) -> Option<&str> {
        self.metadata.get("Producer").map(|s| s.as_str())
    }

    pub fn bbox_cache(&self) -> &BboxCache {
        &self.bbox_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::fixture::{FixtureDocument, FixturePage};
    use crate::primitive::{GlyphPrim, RenderMode};

    fn glyph(ch: char, x: f64, y: f64) -> GlyphPrim {
        let u = ch as u32;
        GlyphPrim {
            unicode: u,
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

    #[test]
    fn chars_in_area_finds_expected_glyphs() {
        let page = FixturePage {
            width: 600.0,
            height: 800.0,
            rotation: 0,
            glyphs: vec![glyph('H', 100.0, 700.0), glyph('i', 106.0, 700.0), glyph('x', 400.0, 100.0)],
            ..Default::default()
        };
        let doc = FixtureDocument { pages: vec![page], ..Default::default() };
        let document = Document::load(&doc);
        let page = document.page(0);
        let hits = page.chars_in_area(&Rectangle::new(0.0, 690.0, 200.0, 720.0));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].char(), Some('H'));
        assert_eq!(hits[1].char(), Some('i'));
    }

    #[test]
    fn unicode_filter_drops_cr_and_maps_bullet_aliases() {
        assert_eq!(default_unicode_filter(0xD), None);
        assert_eq!(default_unicode_filter(61623), Some(0x2022));
        assert_eq!(default_unicode_filter('A' as u32), Some('A' as u32));
    }

    #[test]
    fn rotated_page_swaps_display_dimensions() {
        let page = FixturePage { width: 600.0, height: 800.0, rotation: 90, ..Default::default() };
        let doc = FixtureDocument { pages: vec![page], ..Default::default() };
        let document = Document::load(&doc);
        assert_eq!(document.page(0).width, 800.0);
        assert_eq!(document.page(0).height, 600.0);
    }
}
