//! Semantic model and horizontal layout for ZenUML-style sequence diagrams.
//!
//! Text goes through [`sequence::parse`], then the participant ledger and orderer, the
//! transformer, and the coordinate and geometry stages. [`sequence::compute_layout`] runs them
//! all; [`sequence::LayoutSession`] adds versioning and a shared measurement cache.

pub mod config;
pub mod error;
pub mod fonts;
pub mod sequence;
pub mod text;

pub use config::LayoutConfig;
pub use error::{Error, Result};
