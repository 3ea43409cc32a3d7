use serde::Serialize;

use super::geometry::Anchor;
use super::layout::CoordinateTable;
use super::types::FragmentNode;
use crate::config::LayoutConfig;
use crate::error::LayoutError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FragmentBounds {
    pub left: f32,
    pub right: f32,
    pub width: f32,
    /// How far the fragment reaches left of the origin's occurrence edge.
    pub offset_x: f32,
    /// From the fragment's left side to the leftmost lifeline it spans.
    pub padding_left: f32,
    pub min_width: f32,
}

/// Horizontal extent of a fragment.
///
/// The box spans the leftmost to the rightmost participant referenced anywhere inside it,
/// plus one `fragment_padding_x` border for itself and for each level of fragments nested in
/// it, so nested boxes stay visibly inside their parents.
pub fn fragment_bounds(
    fragment: &FragmentNode,
    table: &CoordinateTable,
    origin_depth: usize,
    config: &LayoutConfig,
) -> Result<FragmentBounds, LayoutError> {
    let mut indices: Vec<usize> = fragment
        .participants
        .iter()
        .filter_map(|name| table.index_of(name))
        .collect();
    indices.sort_unstable();

    let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
        return Err(LayoutError::empty_fragment(fragment.kind.as_str(), fragment.source));
    };
    let (Some((_, leftmost)), Some((_, rightmost))) = (table.get_index(first), table.get_index(last))
    else {
        return Err(LayoutError::empty_fragment(fragment.kind.as_str(), fragment.source));
    };

    let border = config.fragment_padding_x * (fragment.nesting_levels() + 1) as f32;
    let left = leftmost.center - leftmost.width / 2.0 - border;
    let right = (rightmost.center + rightmost.width / 2.0 + border)
        .max(left + config.fragment_min_width);

    let origin = Anchor::new(table.center(&fragment.origin)?, origin_depth);
    let offset_x = origin.edge(-1.0, config) - left;

    Ok(FragmentBounds {
        left,
        right,
        width: right - left,
        offset_x,
        padding_left: leftmost.center - left,
        min_width: config.fragment_min_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::ApproximateMeasure;
    use crate::sequence::depth::DepthCalculator;
    use crate::sequence::layout::CoordinateEngine;
    use crate::sequence::order::order_participants;
    use crate::sequence::parser::parse;
    use crate::sequence::participants::collect_participants;
    use crate::sequence::transform::transform;
    use crate::sequence::types::DocumentNode;

    fn prepare(src: &str) -> (DocumentNode, CoordinateTable) {
        let config = LayoutConfig::default();
        let program = parse(src);
        let ctx = collect_participants(&program, None);
        let order = order_participants(&ctx);
        let document = transform(&program, None).ast;
        let mut measure = ApproximateMeasure::default();
        let mut depths = DepthCalculator::new();
        let table = CoordinateEngine::new(&mut measure, &config).layout(
            &order,
            &ctx.participants,
            &document,
            &mut depths,
        );
        (document, table)
    }

    #[test]
    fn bounds_span_outermost_participants() {
        let config = LayoutConfig::default();
        let (doc, table) = prepare("A B C D\nA->B.m\nopt { B->D: x }");
        let opt = doc.fragments()[0];
        let bounds = fragment_bounds(opt, &table, 0, &config).unwrap();
        let b = table.get("B").unwrap();
        let d = table.get("D").unwrap();
        assert_eq!(bounds.left, b.center - b.width / 2.0 - config.fragment_padding_x);
        assert_eq!(bounds.right, d.center + d.width / 2.0 + config.fragment_padding_x);
        assert_eq!(bounds.padding_left, b.center - bounds.left);
        assert_eq!(bounds.min_width, config.fragment_min_width);
    }

    #[test]
    fn outer_fragments_grow_a_border_per_nested_level() {
        let config = LayoutConfig::default();
        let (doc, table) = prepare("A B\nloop (x) { if (y) { A->B: m } }");
        let fragments = doc.fragments();
        let outer = fragment_bounds(fragments[0], &table, 0, &config).unwrap();
        let inner = fragment_bounds(fragments[1], &table, 0, &config).unwrap();
        assert_eq!(inner.left - outer.left, config.fragment_padding_x);
        assert_eq!(outer.right - inner.right, config.fragment_padding_x);
    }

    #[test]
    fn width_never_drops_below_the_minimum() {
        let config = LayoutConfig {
            fragment_min_width: 500.0,
            ..LayoutConfig::default()
        };
        let (doc, table) = prepare("A\nopt { A->A: think }");
        let bounds = fragment_bounds(doc.fragments()[0], &table, 0, &config).unwrap();
        assert_eq!(bounds.width, 500.0);
        assert_eq!(bounds.right - bounds.left, 500.0);
    }

    #[test]
    fn fragment_without_participants_is_an_error() {
        let config = LayoutConfig::default();
        let (doc, table) = prepare("A.m\nopt { }");
        let opt = doc.fragments()[0];
        assert!(opt.participants.is_empty());
        let err = fragment_bounds(opt, &table, 0, &config).unwrap_err();
        assert_eq!(err, LayoutError::empty_fragment("opt", opt.source));
        assert!(err.to_string().contains("references no participants"));
    }

    #[test]
    fn offset_is_measured_from_the_origin_edge() {
        let config = LayoutConfig::default();
        let (doc, table) = prepare("A B\nA->B.m { opt { B->A: back } }");
        let opt = doc.fragments()[0];
        assert_eq!(opt.origin, "B");
        let bounds = fragment_bounds(opt, &table, 1, &config).unwrap();
        let b = table.center("B").unwrap();
        assert_eq!(bounds.offset_x, (b - 7.5) - bounds.left);
        assert!(bounds.offset_x > 0.0);
    }
}
