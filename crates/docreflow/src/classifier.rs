//! Page classification: the vendor policy ([`PageTemplate`]) that turns raw graphic
//! clusters into figures and tables, plus the spacing tolerances every later stage
//! reads off it.

use crate::geom::{HLine, Rectangle, VLine};
use crate::graphics::{graphic_clusters, GraphicCluster};
use crate::page::{GraphicObj, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSize {
    H1,
    H2,
    H3,
    H4,
    Normal,
    Footnote,
}

/// Named page regions, as fractions of page size, already rotated for the page's
/// own orientation.
#[derive(Debug, Clone)]
pub struct Areas {
    pub top: Rectangle,
    pub number: Rectangle,
    pub content: Vec<Rectangle>,
}

/// Spacing tolerances driving every downstream decision.
#[derive(Debug, Clone, Copy)]
pub struct Spacing {
    pub x_em: f64,
    pub y_em: f64,
    pub x_left: f64,
    pub x_right: f64,
    pub x_content: f64,
    pub y_tline: f64,
    pub lh: f64,
    pub sc: f64,
    pub th: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolicColor {
    Black,
    White,
    Gray,
    LightBlue,
    DarkBlue,
    Blue,
    Unknown,
}

/// A classified graphic: a figure (images/shapes with no table structure) or a
/// table-shaped cluster carrying the VLine/HLine sets grid inference will consume.
#[derive(Debug, Clone)]
pub enum Classified {
    Figure { bbox: Rectangle, caption: Option<Caption> },
    Table { bbox: Rectangle, caption: Option<Caption>, vlines: Vec<VLine>, hlines: Vec<HLine>, is_register: bool },
}

#[derive(Debug, Clone)]
pub struct Caption {
    pub bbox: Rectangle,
    pub kind: &'static str,
    pub number: u32,
}

/// Vendor policy: the strategy object selected by `Producer` metadata.
pub trait PageTemplate: Send + Sync {
    fn spacing(&self, page: &Page) -> Spacing;
    fn areas(&self, page: &Page) -> Areas;
    fn line_size(&self, height: f64) -> LineSize;
    fn color(&self, rgba: u32) -> SymbolicColor;
    fn unicode_filter(&self, cp: u32) -> Option<u32> {
        Some(cp)
    }

    /// The heart of classification: group the graphic clusters of `area` into
    /// figures and tables.
    fn graphics_in_area<'a>(&self, page: &'a Page, area: &Rectangle) -> Vec<Classified>;
}

fn base_spacing(width: f64, height: f64) -> Spacing {
    Spacing {
        x_em: 0.01 * width,
        x_left: 0.1 * width,
        x_right: 0.9 * width,
        x_content: 0.2 * width,
        y_em: 0.01 * height,
        y_tline: 0.005 * height,
        lh: 0.9,
        sc: 0.3,
        th: 0.3,
    }
}

fn is_rotated(rotation: i32) -> bool {
    matches!(rotation.rem_euclid(360), 90 | 270)
}

fn default_areas(page: &Page) -> Areas {
    Areas {
        top: Rectangle::new(0.0, page.height * 0.93, page.width, page.height),
        number: Rectangle::new(page.width * 0.45, 0.0, page.width * 0.55, page.height * 0.05),
        content: vec![Rectangle::new(0.0, page.height * 0.05, page.width, page.height * 0.93)],
    }
}

fn caption_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\s*(Figure|Table)\s+(\d+)\.").unwrap())
}

/// Scan bold character lines of `area` for `^Figure \d+\.`/`^Table \d+\.`, grouped
/// by `round(bbox.y / em)` so side-by-side figures don't collide.
fn find_captions(page: &Page, area: &Rectangle, em: f64) -> Vec<Caption> {
    let chars = page.chars_in_area(area);
    let lines = crate::charline::charlines_in_area(&chars, page.height, crate::charline::DEFAULT_MERGE_RTOL);
    let mut captions = Vec::new();
    for line in &lines {
        if line.is_bold_fraction() < 0.5 {
            continue;
        }
        let text = line.text();
        if let Some(caps) = caption_regex().captures(&text) {
            let kind = if &caps[1] == "Figure" { "figure" } else { "table" };
            let number: u32 = caps[2].parse().unwrap_or(0);
            captions.push(Caption { bbox: line.bbox(), kind, number });
        }
    }
    let _ = em;
    captions
}

fn pair_caption_with_cluster<'a>(caption: &Caption, clusters: &[GraphicCluster<'a>], area: &Rectangle) -> Option<usize> {
    let mid_x = (area.left + area.right) / 2.0;
    let caption_half_left = caption.bbox.left < mid_x;
    clusters.iter().position(|c| {
        let below = c.bbox.top <= caption.bbox.bottom;
        let same_half = if caption_half_left { c.bbox.left < mid_x } else { c.bbox.left >= mid_x };
        below && same_half
    })
}

fn classify_cluster_blue_gray(objs: &[&GraphicObj], bw_like: &BlueGrayTemplate) -> bool {
    objs.iter().all(|o| match o {
        GraphicObj::Path(p) => {
            bw_like.color(p.stroke) == SymbolicColor::Gray || bw_like.color(p.fill) == SymbolicColor::DarkBlue
        }
        GraphicObj::Image(_) => false,
    })
}

fn classify_cluster_black_white(objs: &[&GraphicObj]) -> &'static str {
    let paths: Vec<&crate::page::Path> = objs
        .iter()
        .filter_map(|o| if let GraphicObj::Path(p) = o { Some(p) } else { None })
        .collect();
    if paths.is_empty() {
        return "figure";
    }
    let two_point = paths.iter().filter(|p| p.count() == 2).count();
    if two_point * 2 > paths.len() {
        return "table_lines";
    }
    let on_edge_frac = |p: &&crate::page::Path| -> f64 {
        if p.points.is_empty() {
            return 0.0;
        }
        let on = p
            .points
            .iter()
            .filter(|pt| {
                (pt.point.x - p.bbox.left).abs() < 1e-3
                    || (pt.point.x - p.bbox.right).abs() < 1e-3
                    || (pt.point.y - p.bbox.bottom).abs() < 1e-3
                    || (pt.point.y - p.bbox.top).abs() < 1e-3
            })
            .count();
        on as f64 / p.points.len() as f64
    };
    let shapeish = paths.iter().filter(|p| on_edge_frac(p) >= 2.0 / 3.0).count();
    if shapeish * 3 >= paths.len() * 2 {
        "table"
    } else {
        "figure"
    }
}

/// Acrobat-producer template: thin black rules, synthetic virtual borders.
pub struct BlackWhiteTemplate;

impl PageTemplate for BlackWhiteTemplate {
    fn spacing(&self, page: &Page) -> Spacing {
        let mut s = base_spacing(page.width, page.height);
        if is_rotated(page.rotation) {
            s.lh = 1.2;
            s.sc = 0.4;
        } else {
            s.x_content = 0.2075 * page.width;
            s.lh = 0.9;
            s.sc = 0.325;
        }
        s.th = 0.33;
        s
    }

    fn areas(&self, page: &Page) -> Areas {
        default_areas(page)
    }

    fn line_size(&self, height: f64) -> LineSize {
        if height >= 17.5 {
            LineSize::H1
        } else if height >= 15.5 {
            LineSize::H2
        } else if height >= 13.5 {
            LineSize::H3
        } else if height >= 11.4 {
            LineSize::H4
        } else if height >= 8.5 {
            LineSize::Normal
        } else {
            LineSize::Footnote
        }
    }

    fn color(&self, rgba: u32) -> SymbolicColor {
        match rgba {
            0x000000ff => SymbolicColor::Black,
            0xffffffff => SymbolicColor::White,
            _ => SymbolicColor::Unknown,
        }
    }

    fn graphics_in_area<'a>(&self, page: &'a Page, area: &Rectangle) -> Vec<Classified> {
        let spacing = self.spacing(page);
        let widened = area.offset(0.0, 0.0);
        let refs: Vec<&GraphicObj> = page
            .graphics
            .iter()
            .filter(|g| widened.offset(-spacing.x_em / 2.0, -spacing.y_em / 2.0).overlaps(&g.bbox()))
            .collect();
        let clusters = graphic_clusters(&refs, 0.01 * page.width.min(page.height));
        let captions = find_captions(page, area, spacing.x_em);

        let mut used = vec![false; clusters.len()];
        let mut out = Vec::new();
        for caption in &captions {
            if let Some(idx) = pair_caption_with_cluster(caption, &clusters, area) {
                used[idx] = true;
                out.push(classify_one_bw(&clusters[idx], Some(caption.clone()), spacing));
            }
        }
        for (i, cluster) in clusters.iter().enumerate() {
            if !used[i] {
                out.push(classify_one_bw(cluster, None, spacing));
            }
        }
        out
    }
}

fn classify_one_bw(cluster: &GraphicCluster<'_>, caption: Option<Caption>, spacing: Spacing) -> Classified {
    if cluster.objs.iter().any(|o| matches!(o, GraphicObj::Image(_))) {
        return Classified::Figure { bbox: cluster.bbox, caption };
    }
    match classify_cluster_black_white(&cluster.objs) {
        "table" | "table_lines" => {
            let (vlines, hlines) = bw_lines_from_paths(&cluster.objs, spacing);
            Classified::Table { bbox: cluster.bbox, caption, vlines, hlines, is_register: false }
        }
        _ => Classified::Figure { bbox: cluster.bbox, caption },
    }
}

fn bw_lines_from_paths(objs: &[&GraphicObj], spacing: Spacing) -> (Vec<VLine>, Vec<HLine>) {
    let mut vlines = Vec::new();
    let mut hlines = Vec::new();
    for obj in objs {
        if let GraphicObj::Path(p) = obj {
            if p.stroke_width <= spacing.x_em / 2.0 {
                let w = p.bbox.width();
                let h = p.bbox.height();
                if h >= spacing.y_em / 2.0 && h >= w {
                    vlines.push(VLine { x: p.bbox.midpoint().x, y0: p.bbox.bottom, y1: p.bbox.top, width: p.stroke_width });
                } else if w >= spacing.y_em / 2.0 {
                    hlines.push(HLine { y: p.bbox.midpoint().y, x0: p.bbox.left, x1: p.bbox.right, width: p.stroke_width });
                }
            } else {
                // Wide filled rectangle: split into its four outline edges at the
                // synthetic "virtual border" width.
                let b = p.bbox;
                vlines.push(VLine { x: b.left, y0: b.bottom, y1: b.top, width: 0.1 });
                vlines.push(VLine { x: b.right, y0: b.bottom, y1: b.top, width: 0.1 });
                hlines.push(HLine { y: b.bottom, x0: b.left, x1: b.right, width: 0.1 });
                hlines.push(HLine { y: b.top, x0: b.left, x1: b.right, width: 0.1 });
            }
        }
    }
    (vlines, hlines)
}

/// Antenna House-producer template: gray intercell rules, dark-blue header bars.
pub struct BlueGrayTemplate;

impl PageTemplate for BlueGrayTemplate {
    fn spacing(&self, page: &Page) -> Spacing {
        let mut s = base_spacing(page.width, page.height);
        if is_rotated(page.rotation) {
            s.lh = 1.6;
            s.sc = 0.2;
        } else {
            s.x_content = 0.165 * page.width;
            s.lh = 0.9;
            s.sc = 0.3;
        }
        s.th = 0.33;
        s
    }

    fn areas(&self, page: &Page) -> Areas {
        default_areas(page)
    }

    fn line_size(&self, height: f64) -> LineSize {
        let h = height.round();
        if h >= 16.0 {
            LineSize::H1
        } else if h >= 14.0 {
            LineSize::H2
        } else if h >= 12.0 {
            LineSize::H3
        } else if h >= 10.0 {
            LineSize::H4
        } else if h >= 7.0 {
            LineSize::Normal
        } else {
            LineSize::Footnote
        }
    }

    fn color(&self, rgba: u32) -> SymbolicColor {
        match rgba {
            0x000000ff => SymbolicColor::Black,
            0xffffffff => SymbolicColor::White,
            0xb9c4caff => SymbolicColor::Gray,
            0x1f81afff => SymbolicColor::LightBlue,
            0x2052ffff => SymbolicColor::DarkBlue,
            0x39a9dcff => SymbolicColor::Blue,
            _ => SymbolicColor::Unknown,
        }
    }

    fn graphics_in_area<'a>(&self, page: &'a Page, area: &Rectangle) -> Vec<Classified> {
        let spacing = self.spacing(page);
        let refs: Vec<&GraphicObj> = page
            .graphics
            .iter()
            .filter(|g| area.offset(-spacing.x_em / 2.0, -spacing.y_em / 2.0).overlaps(&g.bbox()))
            .collect();
        let clusters = graphic_clusters(&refs, 0.01 * page.width.min(page.height));
        let captions = find_captions(page, area, spacing.x_em);

        let mut used = vec![false; clusters.len()];
        let mut out = Vec::new();
        for caption in &captions {
            if let Some(idx) = pair_caption_with_cluster(caption, &clusters, area) {
                used[idx] = true;
                out.push(self.classify_one_bg(&clusters[idx], Some(caption.clone()), page, spacing));
            }
        }
        for (i, cluster) in clusters.iter().enumerate() {
            if !used[i] {
                out.push(self.classify_one_bg(cluster, None, page, spacing));
            }
        }
        out
    }
}

impl BlueGrayTemplate {
    fn classify_one_bg(&self, cluster: &GraphicCluster<'_>, caption: Option<Caption>, page: &Page, spacing: Spacing) -> Classified {
        if cluster.objs.iter().any(|o| matches!(o, GraphicObj::Image(_))) {
            return Classified::Figure { bbox: cluster.bbox, caption };
        }
        if classify_cluster_blue_gray(&cluster.objs, self) {
            let (vlines, hlines) = self.bg_lines_from_paths(&cluster.objs);
            let mut bbox = cluster.bbox;
            let mut is_register = false;
            // Register promotion: scan the one-em band above the bbox for a
            // majority-digit character band.
            let band = Rectangle::new(bbox.left, bbox.top, bbox.right, bbox.top + spacing.y_em);
            let text = page.text_in_area(&band);
            let non_ws: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
            if !non_ws.is_empty() {
                let digits = non_ws.iter().filter(|c| c.is_ascii_digit()).count();
                if digits * 3 >= non_ws.len() {
                    is_register = true;
                    bbox = bbox.joined(&band);
                }
            }
            Classified::Table { bbox, caption, vlines, hlines, is_register }
        } else {
            Classified::Figure { bbox: cluster.bbox, caption }
        }
    }

    fn bg_lines_from_paths(&self, objs: &[&GraphicObj]) -> (Vec<VLine>, Vec<HLine>) {
        let mut vlines = Vec::new();
        let mut hlines = Vec::new();
        let mut darkblue_bottoms: Vec<f64> = Vec::new();
        for obj in objs {
            if let GraphicObj::Path(p) = obj {
                if self.color(p.stroke) == SymbolicColor::Gray {
                    let w = p.bbox.width();
                    let h = p.bbox.height();
                    if h >= w {
                        vlines.push(VLine { x: p.bbox.midpoint().x, y0: p.bbox.bottom, y1: p.bbox.top, width: p.stroke_width });
                    } else {
                        hlines.push(HLine { y: p.bbox.midpoint().y, x0: p.bbox.left, x1: p.bbox.right, width: p.stroke_width });
                    }
                } else if self.color(p.fill) == SymbolicColor::DarkBlue {
                    darkblue_bottoms.push(p.bbox.bottom);
                }
            }
        }
        if let Some(&lowest) = darkblue_bottoms.iter().min_by(|a, b| a.partial_cmp(b).unwrap()) {
            let (x0, x1) = (
                vlines.iter().map(|v| v.x).fold(f64::INFINITY, f64::min),
                vlines.iter().map(|v| v.x).fold(f64::NEG_INFINITY, f64::max),
            );
            if x0.is_finite() && x1.is_finite() {
                hlines.push(HLine { y: lowest, x0, x1, width: 5.0 });
            }
        }
        (vlines, hlines)
    }
}

/// Select a template by the PDF `Producer` metadata string; unknown producers fall
/// back to black-white with a warning (an input anomaly, never a hard failure).
pub fn select_template(producer: Option<&str>) -> Box<dyn PageTemplate> {
    let lower = producer.unwrap_or_default().to_lowercase();
    if lower.contains("acrobat") {
        Box::new(BlackWhiteTemplate)
    } else if lower.contains("antenna") {
        Box::new(BlueGrayTemplate)
    } else {
        tracing::warn!(producer = %lower, "unknown PDF producer, falling back to black-white template");
        Box::new(BlackWhiteTemplate)
    }
}

/// Build the register-table bit-number header columns from a caption area's first
/// numeric CharLine cluster, per §4.E's register specialization.
pub fn bit_number_columns(page: &Page, caption_area: &Rectangle, x_em: f64) -> Vec<f64> {
    let chars = page.chars_in_area(caption_area);
    let lines = crate::charline::charlines_in_area(&chars, page.height, crate::charline::DEFAULT_MERGE_RTOL);
    for line in &lines {
        let clusters = line.clusters(x_em / 2.0);
        let all_numeric = clusters.iter().all(|c| c.iter().all(|ch| ch.char().map(|c| c.is_ascii_digit()).unwrap_or(false)));
        if all_numeric && !clusters.is_empty() {
            return clusters
                .iter()
                .map(|c| {
                    let xs: Vec<f64> = c.iter().map(|ch| ch.origin.x).collect();
                    xs.iter().sum::<f64>() / xs.len() as f64
                })
                .collect();
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_template_matches_producer_substring_case_insensitively() {
        let _ = select_template(Some("Antenna House PDF Output Library"));
        let _ = select_template(Some("Acrobat Distiller"));
        let _ = select_template(None);
    }

    #[test]
    fn line_size_buckets_are_monotonic() {
        let t = BlackWhiteTemplate;
        assert_eq!(t.line_size(20.0), LineSize::H1);
        assert_eq!(t.line_size(9.0), LineSize::Normal);
        assert_eq!(t.line_size(3.0), LineSize::Footnote);
    }

    #[test]
    fn blue_gray_line_size_uses_rounded_height() {
        let t = BlueGrayTemplate;
        assert_eq!(t.line_size(15.6), LineSize::H1);
        assert_eq!(t.line_size(15.4), LineSize::H2);
    }
}
