//! End-to-end layout of one document, and a session that publishes the newest result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::depth::DepthCalculator;
use super::fragment::{FragmentBounds, fragment_bounds};
use super::geometry::MessageGeometry;
use super::layout::{CoordinateEngine, CoordinateTable};
use super::order::{OrderedParticipant, order_participants};
use super::parser::parse;
use super::participants::collect_participants;
use super::transform::transform;
use super::types::{Diagnostic, DocumentNode, FragmentKind, NodeId};
use crate::config::LayoutConfig;
use crate::fonts::{CachedMeasure, TextMeasure, TextStyle};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentGeometry {
    pub id: NodeId,
    pub kind: FragmentKind,
    pub origin: String,
    /// Measured width of the first section's condition, zero when there is none.
    pub condition_width: f32,
    pub bounds: FragmentBounds,
}

/// Everything the renderer needs for one document version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramLayout {
    pub version: u64,
    pub participants: Vec<OrderedParticipant>,
    pub coordinates: CoordinateTable,
    pub messages: Vec<MessageGeometry>,
    pub fragments: Vec<FragmentGeometry>,
    /// Elements that could not be placed.
    pub diagnostics: Vec<Diagnostic>,
    /// Statements that could not be interpreted, as `"line:column message"`.
    pub errors: Vec<String>,
    pub success: bool,
}

/// Runs every stage on `source`.
pub fn compute_layout<T: TextMeasure>(
    source: &str,
    version: u64,
    starter_override: Option<&str>,
    config: &LayoutConfig,
    measure: &mut T,
    depths: &mut DepthCalculator,
) -> DiagramLayout {
    let program = parse(source);
    let context = collect_participants(&program, starter_override);
    let participants = order_participants(&context);
    let transformed = transform(&program, starter_override);
    let document = transformed.ast.with_version(version);
    depths.reset();

    let coordinates = CoordinateEngine::new(&mut *measure, config).layout(
        &participants,
        &context.participants,
        &document,
        depths,
    );
    let (messages, mut diagnostics) =
        MessageGeometry::build(&document, &coordinates, depths, config);
    let fragments =
        layout_fragments(&document, &coordinates, depths, config, measure, &mut diagnostics);

    tracing::debug!(
        version,
        participants = participants.len(),
        messages = messages.len(),
        fragments = fragments.len(),
        diagnostics = diagnostics.len(),
        errors = transformed.errors.len(),
        "computed layout"
    );

    DiagramLayout {
        version,
        participants,
        coordinates,
        messages,
        fragments,
        success: transformed.success && diagnostics.is_empty(),
        diagnostics,
        errors: transformed.errors,
    }
}

fn layout_fragments<T: TextMeasure>(
    document: &DocumentNode,
    coordinates: &CoordinateTable,
    depths: &mut DepthCalculator,
    config: &LayoutConfig,
    measure: &mut T,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<FragmentGeometry> {
    let mut out = Vec::new();
    for fragment in document.fragments() {
        let origin_depth = depths.depth(document, fragment.id, &fragment.origin);
        match fragment_bounds(fragment, coordinates, origin_depth, config) {
            Ok(bounds) => {
                let condition_width = fragment
                    .sections
                    .first()
                    .and_then(|s| s.condition.as_deref())
                    .map(|c| measure.measure_text_width(c, TextStyle::FragmentCondition))
                    .unwrap_or(0.0);
                out.push(FragmentGeometry {
                    id: fragment.id,
                    kind: fragment.kind,
                    origin: fragment.origin.clone(),
                    condition_width,
                    bounds,
                });
            }
            Err(err) => {
                tracing::warn!(id = fragment.id, "{}", err);
                diagnostics.push(Diagnostic::at(fragment.source, &err));
            }
        }
    }
    out
}

/// Long-lived layout state for an editor.
///
/// Every edit takes a new version from [`LayoutSession::next_version`]. A result is published
/// only if no newer one is already visible, so a slow computation for an old edit never
/// replaces the layout of a later edit. Readers see either the previous layout or the new one.
pub struct LayoutSession<M: TextMeasure> {
    config: LayoutConfig,
    version: AtomicU64,
    measure: Mutex<CachedMeasure<M>>,
    depths: Mutex<DepthCalculator>,
    published: RwLock<Option<Arc<DiagramLayout>>>,
}

impl<M: TextMeasure> LayoutSession<M> {
    pub fn new(config: LayoutConfig, measure: M) -> Self {
        let capacity = config.measure_cache_capacity;
        Self {
            config,
            version: AtomicU64::new(0),
            measure: Mutex::new(CachedMeasure::new(measure, capacity)),
            depths: Mutex::new(DepthCalculator::new()),
            published: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Registers an edit and returns its version.
    pub fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Computes the layout of `source` as `version` without publishing it.
    pub fn compute(
        &self,
        source: &str,
        version: u64,
        starter_override: Option<&str>,
    ) -> Arc<DiagramLayout> {
        let mut measure = self.measure.lock();
        let mut depths = self.depths.lock();
        Arc::new(compute_layout(
            source,
            version,
            starter_override,
            &self.config,
            &mut *measure,
            &mut depths,
        ))
    }

    /// Makes `layout` visible unless a newer version already is. Returns whether it was
    /// published.
    pub fn publish(&self, layout: Arc<DiagramLayout>) -> bool {
        let mut published = self.published.write();
        if let Some(current) = published.as_ref() {
            if current.version > layout.version {
                tracing::debug!(
                    stale = layout.version,
                    current = current.version,
                    "dropping stale layout"
                );
                return false;
            }
        }
        *published = Some(layout);
        true
    }

    /// Registers an edit, lays it out and publishes it.
    pub fn update(&self, source: &str, starter_override: Option<&str>) -> Arc<DiagramLayout> {
        let version = self.next_version();
        let layout = self.compute(source, version, starter_override);
        self.publish(Arc::clone(&layout));
        layout
    }

    pub fn current(&self) -> Option<Arc<DiagramLayout>> {
        self.published.read().clone()
    }

    /// Measurements that missed the cache so far.
    pub fn measure_misses(&self) -> u64 {
        self.measure.lock().misses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::ApproximateMeasure;
    use crate::sequence::participants::STARTER;

    fn session() -> LayoutSession<ApproximateMeasure> {
        LayoutSession::new(LayoutConfig::default(), ApproximateMeasure::default())
    }

    #[test]
    fn compute_layout_runs_every_stage() {
        let mut measure = ApproximateMeasure::default();
        let mut depths = DepthCalculator::new();
        let layout = compute_layout(
            "A B\nA.m { B.n }\nopt { B->A: x }",
            7,
            None,
            &LayoutConfig::default(),
            &mut measure,
            &mut depths,
        );
        assert_eq!(layout.version, 7);
        let names: Vec<&str> = layout.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![STARTER, "A", "B"]);
        assert_eq!(layout.coordinates.len(), 3);
        assert_eq!(layout.messages.len(), 3);
        assert_eq!(layout.fragments.len(), 1);
        assert!(layout.success);
    }

    #[test]
    fn errors_and_diagnostics_do_not_abort_the_document() {
        let mut measure = ApproximateMeasure::default();
        let mut depths = DepthCalculator::new();
        let layout = compute_layout(
            "A.m\nm()\nopt { }",
            1,
            None,
            &LayoutConfig::default(),
            &mut measure,
            &mut depths,
        );
        assert!(!layout.success);
        assert_eq!(layout.errors.len(), 1);
        assert_eq!(layout.diagnostics.len(), 1);
        assert_eq!(layout.diagnostics[0].line, 3);
        assert_eq!(layout.messages.len(), 1);
        assert!(layout.fragments.is_empty());
    }

    #[test]
    fn session_publishes_newest_and_drops_stale_results() {
        let session = session();
        let old = session.next_version();
        let new = session.next_version();
        assert!(new > old);

        let fresh = session.compute("A B\nA->B.m", new, None);
        let stale = session.compute("A\nA.m", old, None);
        assert!(session.publish(fresh));
        assert!(!session.publish(stale));
        assert_eq!(session.current().unwrap().version, new);
    }

    #[test]
    fn session_update_is_visible_to_readers() {
        let session = session();
        assert!(session.current().is_none());
        let layout = session.update("A.m", None);
        assert_eq!(layout.version, 1);
        assert_eq!(session.latest_version(), 1);
        assert!(Arc::ptr_eq(&layout, &session.current().unwrap()));
    }

    #[test]
    fn repeated_updates_hit_the_measure_cache() {
        let session = session();
        session.update("A B\nA->B.call(x)", None);
        let misses = session.measure_misses();
        session.update("A B\nA->B.call(x)", None);
        assert_eq!(session.measure_misses(), misses);
    }

    #[test]
    fn reused_version_does_not_reuse_depths_of_another_tree() {
        let session = session();
        let layers = |layout: &DiagramLayout| -> Vec<(String, usize)> {
            layout
                .messages
                .iter()
                .filter(|m| m.to == "A")
                .map(|m| (m.signature.clone(), m.arrow.target_layers))
                .collect()
        };
        let first = session.compute("A.m { A->A.n { A->A.o } }", 5, None);
        let expected = vec![("m".to_string(), 1), ("n".to_string(), 2), ("o".to_string(), 3)];
        assert_eq!(layers(&first), expected);

        let second = session.compute("B.x\nA.m { A->A.n { A->A.o } }", 5, None);
        assert_eq!(layers(&second), expected);
    }

    #[test]
    fn identical_sources_give_identical_layouts() {
        let session = session();
        let src = "A B\nA->B.m { C.n { return r } }\nif (c) { B->A: ok } else { A->A.self() }";
        let first = session.compute(src, 3, None);
        let second = session.compute(src, 3, None);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&*first).unwrap(),
            serde_json::to_string(&*second).unwrap()
        );
    }
}
