//! Two-pass clustering of vector paths and images into visually coherent groups —
//! the same primitive backs coarse content-region identification, figure/table
//! shape finding, and the register bit-header column scan.

use crate::geom::{Region, Rectangle};
use crate::page::GraphicObj;

/// One leaf cluster: a bounding rect and the graphic objects that fell inside it.
#[derive(Debug, Clone)]
pub struct GraphicCluster<'a> {
    pub bbox: Rectangle,
    pub objs: Vec<&'a GraphicObj>,
}

/// Cluster `objs` into visually separated groups.
///
/// 1. Build vertical regions: sweep ascending by bbox bottom; a path joins the first
///    region whose `[v0,v1]` overlaps its own `[bottom,top]` within `atol`, else
///    opens a new region.
/// 2. Within each vertical region, repeat on x to get horizontal sub-regions.
/// 3. A vertical region with exactly one horizontal sub-region keeps the region's
///    full height; otherwise each sub-region tightens to its own objects.
/// 4. Sort results by `(-y, x)`.
pub fn graphic_clusters<'a>(objs: &[&'a GraphicObj], atol: f64) -> Vec<GraphicCluster<'a>> {
    let mut sorted: Vec<&&GraphicObj> = objs.iter().collect();
    sorted.sort_by(|a, b| a.bbox().bottom.partial_cmp(&b.bbox().bottom).unwrap());

    let mut vregions: Vec<Region<&'a GraphicObj>> = Vec::new();
    for &&obj in &sorted {
        let b = obj.bbox();
        let mut placed = false;
        for region in &mut vregions {
            if Region::<()>::overlaps(b.bottom, b.top, region.v0, region.v1, atol) {
                region.extend(b.bottom, b.top);
                region.objs.push(obj);
                placed = true;
                break;
            }
        }
        if !placed {
            let mut region = Region::new(b.bottom, b.top);
            region.objs.push(obj);
            vregions.push(region);
        }
    }

    let mut out = Vec::new();
    for vregion in &vregions {
        let mut by_x: Vec<&&GraphicObj> = vregion.objs.iter().collect();
        by_x.sort_by(|a, b| a.bbox().left.partial_cmp(&b.bbox().left).unwrap());

        let mut hregions: Vec<Region<&'a GraphicObj>> = Vec::new();
        for &&obj in &by_x {
            let b = obj.bbox();
            let mut placed = false;
            for region in &mut hregions {
                if Region::<()>::overlaps(b.left, b.right, region.v0, region.v1, atol) {
                    region.extend(b.left, b.right);
                    region.objs.push(obj);
                    placed = true;
                    break;
                }
            }
            if !placed {
                let mut region = Region::new(b.left, b.right);
                region.objs.push(obj);
                hregions.push(region);
            }
        }

        let single = hregions.len() == 1;
        for hregion in hregions {
            let (bottom, top) = if single {
                (vregion.v0, vregion.v1)
            } else {
                let bottom = hregion.objs.iter().map(|o| o.bbox().bottom).fold(f64::INFINITY, f64::min);
                let top = hregion.objs.iter().map(|o| o.bbox().top).fold(f64::NEG_INFINITY, f64::max);
                (bottom, top)
            };
            let bbox = Rectangle::new(hregion.v0, bottom, hregion.v1, top);
            out.push(GraphicCluster { bbox, objs: hregion.objs });
        }
    }

    out.sort_by(|a, b| {
        (-a.bbox.top).partial_cmp(&-b.bbox.top).unwrap().then(a.bbox.left.partial_cmp(&b.bbox.left).unwrap())
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Image, Path};
    use crate::primitive::{CapStyle, JoinStyle};

    fn image_at(l: f64, b: f64, r: f64, t: f64) -> GraphicObj {
        GraphicObj::Image(Image { bbox: Rectangle::new(l, b, r, t) })
    }

    #[allow(dead_code)]
    fn empty_path(l: f64, b: f64, r: f64, t: f64) -> GraphicObj {
        GraphicObj::Path(Path {
            points: vec![],
            stroke: 0,
            fill: 0,
            stroke_width: 0.1,
            cap: CapStyle::Butt,
            join: JoinStyle::Miter,
            bbox: Rectangle::new(l, b, r, t),
        })
    }

    #[test]
    fn nearby_objects_cluster_together() {
        let a = image_at(0.0, 0.0, 10.0, 10.0);
        let b = image_at(11.0, 0.0, 20.0, 10.0);
        let objs = vec![&a, &b];
        let clusters = graphic_clusters(&objs, 2.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].objs.len(), 2);
    }

    #[test]
    fn far_apart_objects_split_into_separate_clusters() {
        let a = image_at(0.0, 0.0, 10.0, 10.0);
        let b = image_at(0.0, 100.0, 10.0, 110.0);
        let objs = vec![&a, &b];
        let clusters = graphic_clusters(&objs, 1.0);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn results_sorted_top_to_bottom_then_left_to_right() {
        let a = image_at(0.0, 0.0, 10.0, 10.0);
        let b = image_at(0.0, 100.0, 10.0, 110.0);
        let objs = vec![&a, &b];
        let clusters = graphic_clusters(&objs, 1.0);
        assert!(clusters[0].bbox.top > clusters[1].bbox.top);
    }
}
