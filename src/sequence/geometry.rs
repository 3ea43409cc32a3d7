use serde::Serialize;

use super::depth::DepthCalculator;
use super::layout::CoordinateTable;
use super::types::{Diagnostic, DocumentNode, MessageKind, MessageNode, NodeId};
use crate::config::LayoutConfig;
use crate::error::LayoutError;

/// A point on a lifeline: its center and the number of occurrence bars open there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub center: f32,
    pub depth: usize,
}

impl Anchor {
    pub fn new(center: f32, depth: usize) -> Self {
        Self { center, depth }
    }

    /// X of the outermost bar edge on the side facing `direction` (`1.0` right, `-1.0` left).
    /// Without bars this is the lifeline itself.
    pub fn edge(self, direction: f32, config: &LayoutConfig) -> f32 {
        if self.depth == 0 {
            return self.center;
        }
        let extent = config.occurrence_width / 2.0 + (self.depth - 1) as f32 * config.layer_offset;
        self.center + direction * extent
    }

    /// Side of `self` that faces `other`; zero when both share a lifeline position.
    fn facing(self, other: Anchor) -> f32 {
        if other.center > self.center {
            1.0
        } else if other.center < self.center {
            -1.0
        } else {
            0.0
        }
    }

    /// Signed distance between the facing edges of two anchors.
    pub fn edge_offset(self, other: Anchor, config: &LayoutConfig) -> f32 {
        if self.facing(other) == 0.0 {
            return 0.0;
        }
        other.edge(other.facing(self), config) - self.edge(self.facing(other), config)
    }

    /// Offset from this anchor's center to `edge`.
    pub fn center_to(self, edge: f32) -> f32 {
        edge - self.center
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArrowLayout {
    pub is_self: bool,
    pub right_to_left: bool,
    pub interaction_width: f32,
    /// From the origin's lifeline to the left end of the arrow.
    pub translate_x: f32,
    pub origin_layers: usize,
    pub source_layers: usize,
    pub target_layers: usize,
}

/// Lays out one arrow between `source` and `target`, drawn inside `origin`'s frame.
#[allow(clippy::too_many_arguments)]
pub fn layout_arrow(
    table: &CoordinateTable,
    config: &LayoutConfig,
    origin: &str,
    source: &str,
    target: &str,
    origin_depth: usize,
    source_depth: usize,
    target_depth: usize,
) -> Result<ArrowLayout, LayoutError> {
    let origin_anchor = Anchor::new(table.center(origin)?, origin_depth);
    let source_anchor = Anchor::new(table.center(source)?, source_depth);
    let target_anchor = Anchor::new(table.center(target)?, target_depth);

    let is_self = source == target;
    let right_to_left = !is_self && target_anchor.center - source_anchor.center < 0.0;
    let interaction_width = if is_self {
        0.0
    } else {
        source_anchor.edge_offset(target_anchor, config).abs()
    };

    let left_end = if is_self {
        source_anchor.edge(1.0, config)
    } else if right_to_left {
        target_anchor.edge(1.0, config)
    } else {
        source_anchor.edge(1.0, config)
    };

    Ok(ArrowLayout {
        is_self,
        right_to_left,
        interaction_width,
        translate_x: origin_anchor.center_to(left_end),
        origin_layers: origin_depth,
        source_layers: source_depth,
        target_layers: target_depth,
    })
}

/// Bar opened on the receiving lifeline by a sync call or creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Occurrence {
    pub layer: usize,
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageGeometry {
    pub id: NodeId,
    pub kind: MessageKind,
    pub from: String,
    pub to: String,
    pub signature: String,
    pub arrow: ArrowLayout,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<Occurrence>,
}

impl MessageGeometry {
    /// Geometry for every message in the document. A message whose endpoints cannot be
    /// placed is left out and reported.
    pub fn build(
        document: &DocumentNode,
        table: &CoordinateTable,
        depths: &mut DepthCalculator,
        config: &LayoutConfig,
    ) -> (Vec<MessageGeometry>, Vec<Diagnostic>) {
        let mut geometry = Vec::new();
        let mut diagnostics = Vec::new();
        for msg in document.messages() {
            match Self::message(document, msg, table, depths, config) {
                Ok(g) => geometry.push(g),
                Err(err) => {
                    tracing::warn!(id = msg.id, "{}", err);
                    diagnostics.push(Diagnostic::at(msg.source, &err));
                }
            }
        }
        (geometry, diagnostics)
    }

    fn message(
        document: &DocumentNode,
        msg: &MessageNode,
        table: &CoordinateTable,
        depths: &mut DepthCalculator,
        config: &LayoutConfig,
    ) -> Result<MessageGeometry, LayoutError> {
        let origin_depth = depths.depth(document, msg.id, &msg.origin);
        let source_depth = depths.depth(document, msg.id, &msg.from);
        let mut target_depth = depths.depth(document, msg.id, &msg.owner);
        if msg.kind.activates() {
            target_depth += 1;
        }

        let arrow = layout_arrow(
            table,
            config,
            &msg.origin,
            &msg.from,
            &msg.owner,
            origin_depth,
            source_depth,
            target_depth,
        )?;

        let occurrence = if msg.kind.activates() {
            let anchor = Anchor::new(table.center(&msg.owner)?, target_depth);
            Some(Occurrence {
                layer: target_depth,
                left: anchor.edge(-1.0, config),
                right: anchor.edge(1.0, config),
            })
        } else {
            None
        };

        Ok(MessageGeometry {
            id: msg.id,
            kind: msg.kind,
            from: msg.from.clone(),
            to: msg.owner.clone(),
            signature: msg.signature.clone(),
            arrow,
            occurrence,
        })
    }
}
