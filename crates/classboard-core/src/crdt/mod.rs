//! CRDT integration using Loro for collaborative editing.
//!
//! # Schema
//!
//! ```text
//! LoroDoc
//! └── "elements": LoroList<LoroMap> (shape records, creation order)
//! ```
//!
//! Each record is a LoroMap with:
//! - "key": String (16 hex chars, never reused)
//! - "kind": String ("class" or "association")
//! - "properties": LoroText (property mini-language)
//! - class: "position": LoroMap { x, y }
//! - association: "points": LoroList<LoroMap { x, y }>, optional
//!   "anchor1"/"anchor2": LoroMap { key, position }

mod changes;
mod document;

pub use changes::{Change, ChangeBatch, Origin};
pub use document::{CrdtDocument, ELEMENTS_KEY};

pub use loro::{ContainerID, VersionVector};
