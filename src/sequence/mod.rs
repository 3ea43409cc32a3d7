pub mod depth;
pub mod fragment;
pub mod geometry;
pub mod layout;
pub mod order;
pub mod parser;
pub mod participants;
pub mod pipeline;
pub mod syntax;
pub mod transform;
pub mod types;

pub use depth::DepthCalculator;
pub use fragment::{FragmentBounds, fragment_bounds};
pub use geometry::{Anchor, ArrowLayout, MessageGeometry, layout_arrow};
pub use layout::{CoordinateEngine, CoordinateTable, ParticipantCoordinate};
pub use order::{OrderedParticipant, order_participants};
pub use parser::parse;
pub use participants::{ParticipantContext, Participants, STARTER, collect_participants};
pub use pipeline::{DiagramLayout, LayoutSession, compute_layout};
pub use transform::{TransformResult, transform};
pub use types::{Diagnostic, DocumentNode, MessageKind, Statement};
