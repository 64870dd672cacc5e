//! Classboard Core Library
//!
//! Shared-state synchronization and interactive-manipulation engine for the
//! Classboard collaborative class-diagram editor. The replicated document is a
//! Loro CRDT; drawing goes through the [`Scene`] trait so the engine stays
//! independent of any rendering backend.

pub mod board;
pub mod camera;
pub mod config;
pub mod crdt;
pub mod error;
pub mod event;
pub mod geometry;
pub mod input;
pub mod presence;
pub mod scene;
pub mod schema;
pub mod shapes;

pub use board::{AnchorCandidate, Board, SelectionChanged};
pub use camera::Camera;
pub use config::BoardConfig;
pub use crdt::{Change, ChangeBatch, CrdtDocument, Origin};
pub use error::{BoardError, Result};
pub use event::{Event, ListenerId};
pub use geometry::Edge;
pub use input::{Modifiers, MouseButton};
pub use presence::{
    Awareness, AwarenessChange, AwarenessState, CursorPosition, InMemoryAwareness, PeerId,
};
pub use scene::{Layer, NodeId, Primitive, RecordingScene, Scene};
pub use schema::{Anchor, AssociationRecord, ClassRecord, ShapeId, ShapeRecord};
pub use shapes::{AssociationShape, ClassShape, ShapeAdapter, ShapeTrait};
