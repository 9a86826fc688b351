//! Reconstructs headings, paragraphs, lists, and tables from the raw glyphs, paths,
//! and images of a rendered PDF page.
//!
//! The crate never decodes PDF bytes itself ([`primitive`]); it is handed a
//! `DocumentPrim` by a host, folds page rotation out of the geometry ([`page`]),
//! groups glyphs into reading-order lines ([`charline`]) and vector paths into
//! visual clusters ([`graphics`]), infers tables from both ([`table`]), classifies
//! each line into a block kind ([`classifier`]), assembles the per-page tree
//! ([`ast`]), stitches pages into a document-wide tree ([`normalize`]), and renders
//! the result ([`html`]).

pub mod ast;
pub mod charline;
pub mod classifier;
pub mod config;
pub mod error;
pub mod geom;
pub mod graphics;
pub mod html;
pub mod normalize;
pub mod page;
pub mod primitive;
pub mod table;

pub use error::{DocError, Result};
pub use page::{BboxCache, Character, Document, GraphicObj, Image, ObjLink, Page, Path, WebLink};
pub use primitive::{DocumentPrim, PagePrim};

/// Build the normalized document tree for every page of `doc`, in document order.
///
/// This is the crate's single top-level entry point: everything downstream of the
/// primitive contract (line assembly, classification, table inference, cross-page
/// stitching) runs through it.
pub fn reconstruct(doc: &Document, config: &config::Config) -> Vec<ast::Node> {
    normalize::normalize_document(doc, config)
}
