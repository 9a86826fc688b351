//! The inward contract: a read-only view over a decoded PDF.
//!
//! This crate does not decode PDF bytes. It consumes whatever already turned a PDF
//! into positioned glyphs, paths, images, links, and structure tags — a `pdfium` or
//! `lopdf` binding, most likely — through the traits below. `fixture` provides a
//! minimal in-memory implementation used by this crate's own tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geom::Point;

/// How a glyph's outline is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    Fill,
    Stroke,
    FillStroke,
    Invisible,
    FillClip,
    StrokeClip,
    FillStrokeClip,
    Clip,
}

/// RGBA packed as `r<<24 | g<<16 | b<<8 | a`.
pub type Rgba = u32;

/// A single glyph as delivered by the primitive provider, before rotation
/// normalization or bbox-cache backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlyphPrim {
    pub unicode: u32,
    pub origin: Point,
    /// Loose bounding box; `None` when the provider could not compute one (common
    /// for rotated or degenerate glyphs).
    pub loose_bbox: Option<crate::geom::Rectangle>,
    /// Tight bounding box; present whenever the glyph is renderable at all.
    pub tight_bbox: Option<crate::geom::Rectangle>,
    pub rotation: i32,
    pub render_mode: RenderMode,
    pub font_name: String,
    pub font_flags: u32,
    pub size: f64,
    pub weight: i32,
    pub fill_rgba: Rgba,
    pub stroke_rgba: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Move,
    Line,
    Bezier,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SegmentPrim {
    pub kind: SegmentKind,
    pub x: f64,
    pub y: f64,
    pub close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapStyle {
    Butt,
    Round,
    ProjectingSquare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinStyle {
    Miter,
    Round,
    Bevel,
}

/// A vector path, in the page's original (possibly rotated) coordinate space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPrim {
    pub matrix: [f64; 6],
    pub segments: Vec<SegmentPrim>,
    pub stroke_rgba: Rgba,
    pub fill_rgba: Rgba,
    pub stroke_width: f64,
    pub cap: CapStyle,
    pub join: JoinStyle,
    pub bbox: crate::geom::Rectangle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePrim {
    pub matrix: [f64; 6],
    pub bbox: crate::geom::Rectangle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjLinkPrim {
    pub bbox: crate::geom::Rectangle,
    pub dest_page_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebLinkPrim {
    pub bboxes: Vec<crate::geom::Rectangle>,
    pub char_range: (usize, usize),
    pub url: String,
}

/// A structure-tree (tagged PDF) node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructurePrim {
    pub title: Option<String>,
    pub actual_text: Option<String>,
    pub alt_text: Option<String>,
    pub tag_type: Option<String>,
    pub obj_type: Option<String>,
    pub language: Option<String>,
    pub id: Option<String>,
    pub marked_ids: Vec<u32>,
    pub attributes: HashMap<String, String>,
    pub children: Vec<StructurePrim>,
}

/// Per-page surface exposed by the primitive provider.
pub trait PagePrim {
    fn width(&self) -> f64;
    fn height(&self) -> f64;
    /// One of 0, 90, 180, 270.
    fn rotation(&self) -> i32;
    fn bbox(&self) -> crate::geom::Rectangle {
        crate::geom::Rectangle::new(0.0, 0.0, self.width(), self.height())
    }

    fn glyphs(&self) -> &[GlyphPrim];
    fn paths(&self) -> &[PathPrim];
    fn images(&self) -> &[ImagePrim];
    fn obj_links(&self) -> &[ObjLinkPrim];
    fn web_links(&self) -> &[WebLinkPrim];
    fn structures(&self) -> &[StructurePrim];
}

/// A table-of-contents entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineItem {
    pub level: u32,
    pub title: String,
    pub page_index: usize,
}

/// Document-level surface exposed by the primitive provider.
pub trait DocumentPrim {
    type Page: PagePrim;

    fn metadata(&self) -> &HashMap<String, String>;
    fn page_count(&self) -> usize;
    fn page(&self, index: usize) -> &Self::Page;
    fn toc(&self) -> &[OutlineItem];
    fn destinations(&self) -> &[(usize, String)];
}

/// A minimal in-memory `DocumentPrim`/`PagePrim` implementation used by this crate's
/// own test suite, and a reasonable starting point for a host wiring up a real
/// `pdfium`/`lopdf` backend against the same contract.
pub mod fixture {
    use super::*;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct FixturePage {
        pub width: f64,
        pub height: f64,
        pub rotation: i32,
        pub glyphs: Vec<GlyphPrim>,
        pub paths: Vec<PathPrim>,
        pub images: Vec<ImagePrim>,
        pub obj_links: Vec<ObjLinkPrim>,
        pub web_links: Vec<WebLinkPrim>,
        pub structures: Vec<StructurePrim>,
    }

    impl PagePrim for FixturePage {
        fn width(&self) -> f64 {
            self.width
        }
        fn height(&self) -> f64 {
            self.height
        }
        fn rotation(&self) -> i32 {
            self.rotation
        }
        fn glyphs(&self) -> &[GlyphPrim] {
            &self.glyphs
        }
        fn paths(&self) -> &[PathPrim] {
            &self.paths
        }
        fn images(&self) -> &[ImagePrim] {
            &self.images
        }
        fn obj_links(&self) -> &[ObjLinkPrim] {
            &self.obj_links
        }
        fn web_links(&self) -> &[WebLinkPrim] {
            &self.web_links
        }
        fn structures(&self) -> &[StructurePrim] {
            &self.structures
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct FixtureDocument {
        pub metadata: HashMap<String, String>,
        pub pages: Vec<FixturePage>,
        pub toc: Vec<OutlineItem>,
        pub destinations: Vec<(usize, String)>,
    }

    impl DocumentPrim for FixtureDocument {
        type Page = FixturePage;

        fn metadata(&self) -> &HashMap<String, String> {
            &self.metadata
        }
        fn page_count(&self) -> usize {
            self.pages.len()
        }
        fn page(&self, index: usize) -> &FixturePage {
            &self.pages[index]
        }
        fn toc(&self) -> &[OutlineItem] {
            &self.toc
        }
        fn destinations(&self) -> &[(usize, String)] {
            &self.destinations
        }
    }
}
