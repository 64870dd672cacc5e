//! Presence ("awareness") channel: ephemeral per-collaborator state.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use kurbo::{Point, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::scene::{Layer, NodeId, Primitive, Scene, StrokeStyle, white};

/// Identifier of a collaborator on the awareness channel.
pub type PeerId = u64;

/// Cursor position in logical canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl From<Point> for CursorPosition {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<CursorPosition> for Point {
    fn from(c: CursorPosition) -> Self {
        Point::new(c.x, c.y)
    }
}

/// Awareness state for a peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwarenessState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

/// Peers that appeared, changed or left since the last poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwarenessChange {
    pub added: Vec<PeerId>,
    pub updated: Vec<PeerId>,
    pub removed: Vec<PeerId>,
}

impl AwarenessChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Wire message of the in-memory awareness channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AwarenessMessage {
    Update {
        peer_id: PeerId,
        #[serde(flatten)]
        state: AwarenessState,
    },
    Leave {
        peer_id: PeerId,
    },
}

/// Access to the awareness channel.
pub trait Awareness {
    /// Identifier of the local client.
    fn client_id(&self) -> PeerId;
    fn local_state(&self) -> AwarenessState;
    /// Publish the local cursor.
    fn set_local_cursor(&mut self, cursor: Option<CursorPosition>);
    /// State of a remote peer.
    fn peer_state(&self, peer: PeerId) -> Option<AwarenessState>;
    /// Remote peers currently present.
    fn peers(&self) -> Vec<PeerId>;
    /// Peer changes accumulated since the last call.
    fn take_changes(&mut self) -> AwarenessChange;
}

/// Awareness backed by local maps; remote state is fed in as JSON messages.
#[derive(Debug, Clone)]
pub struct InMemoryAwareness {
    client_id: PeerId,
    local: AwarenessState,
    peers: BTreeMap<PeerId, AwarenessState>,
    added: BTreeSet<PeerId>,
    updated: BTreeSet<PeerId>,
    removed: BTreeSet<PeerId>,
}

impl InMemoryAwareness {
    pub fn new(client_id: PeerId) -> Self {
        Self {
            client_id,
            local: AwarenessState::default(),
            peers: BTreeMap::new(),
            added: BTreeSet::new(),
            updated: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Encode the local state for broadcast.
    pub fn encode_local(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&AwarenessMessage::Update {
            peer_id: self.client_id,
            state: self.local.clone(),
        })
    }

    /// Encode a leave message for the local client.
    pub fn encode_leave(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&AwarenessMessage::Leave {
            peer_id: self.client_id,
        })
    }

    /// Apply a message received from another client.
    pub fn apply_remote(&mut self, json: &str) -> Result<(), serde_json::Error> {
        match serde_json::from_str::<AwarenessMessage>(json)? {
            AwarenessMessage::Update { peer_id, state } => self.apply_state(peer_id, state),
            AwarenessMessage::Leave { peer_id } => self.remove_peer(peer_id),
        }
        Ok(())
    }

    pub fn apply_state(&mut self, peer: PeerId, state: AwarenessState) {
        if peer == self.client_id {
            return;
        }
        match self.peers.insert(peer, state) {
            None => {
                self.removed.remove(&peer);
                self.added.insert(peer);
            }
            Some(_) => {
                if !self.added.contains(&peer) {
                    self.updated.insert(peer);
                }
            }
        }
    }

    pub fn remove_peer(&mut self, peer: PeerId) {
        if self.peers.remove(&peer).is_none() {
            return;
        }
        let was_new = self.added.remove(&peer);
        self.updated.remove(&peer);
        if !was_new {
            self.removed.insert(peer);
        }
    }
}

impl Awareness for InMemoryAwareness {
    fn client_id(&self) -> PeerId {
        self.client_id
    }

    fn local_state(&self) -> AwarenessState {
        self.local.clone()
    }

    fn set_local_cursor(&mut self, cursor: Option<CursorPosition>) {
        self.local.cursor = cursor;
    }

    fn peer_state(&self, peer: PeerId) -> Option<AwarenessState> {
        self.peers.get(&peer).cloned()
    }

    fn peers(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    fn take_changes(&mut self) -> AwarenessChange {
        AwarenessChange {
            added: std::mem::take(&mut self.added).into_iter().collect(),
            updated: std::mem::take(&mut self.updated).into_iter().collect(),
            removed: std::mem::take(&mut self.removed).into_iter().collect(),
        }
    }
}

impl<A: Awareness> Awareness for Rc<RefCell<A>> {
    fn client_id(&self) -> PeerId {
        self.borrow().client_id()
    }

    fn local_state(&self) -> AwarenessState {
        self.borrow().local_state()
    }

    fn set_local_cursor(&mut self, cursor: Option<CursorPosition>) {
        self.borrow_mut().set_local_cursor(cursor)
    }

    fn peer_state(&self, peer: PeerId) -> Option<AwarenessState> {
        self.borrow().peer_state(peer)
    }

    fn peers(&self) -> Vec<PeerId> {
        self.borrow().peers()
    }

    fn take_changes(&mut self) -> AwarenessChange {
        self.borrow_mut().take_changes()
    }
}

/// Marker colour for a peer.
pub fn peer_color(peer: PeerId) -> Color {
    let rgb = peer % 0xFF_FFFF;
    Color::from_rgba8((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, 255)
}

fn cursor_glyph(at: Point, color: Color) -> Vec<Primitive> {
    let outline = [
        Vec2::new(0.0, 0.0),
        Vec2::new(0.0, 16.0),
        Vec2::new(4.5, 12.0),
        Vec2::new(11.0, 11.0),
    ];
    vec![Primitive::Polygon {
        points: outline.iter().map(|v| at + *v).collect(),
        fill: Some(color),
        stroke: Some(StrokeStyle::solid(white(), 1.0)),
    }]
}

/// Cursor markers of remote peers, one node per peer on [`Layer::Awareness`].
#[derive(Debug, Default)]
pub struct PresenceLayer {
    markers: HashMap<PeerId, NodeId>,
}

impl PresenceLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, peer: PeerId) -> Option<NodeId> {
        self.markers.get(&peer).copied()
    }

    /// Apply pending peer changes to the markers.
    pub fn sync(&mut self, awareness: &mut dyn Awareness, scene: &mut dyn Scene, camera: &Camera) {
        let change = awareness.take_changes();
        if change.is_empty() {
            return;
        }
        log::trace!("Awareness change: {change:?}");
        for peer in &change.removed {
            if let Some(node) = self.markers.remove(peer) {
                scene.remove_node(node);
            }
        }
        for peer in change.added.iter().chain(&change.updated) {
            let node = *self
                .markers
                .entry(*peer)
                .or_insert_with(|| scene.add_node(Layer::Awareness));
            draw_marker(node, *peer, &*awareness, scene, camera);
        }
    }

    /// Redraw every marker, used after the camera moved.
    pub fn refresh(&self, awareness: &dyn Awareness, scene: &mut dyn Scene, camera: &Camera) {
        for (peer, node) in &self.markers {
            draw_marker(*node, *peer, awareness, scene, camera);
        }
    }
}

fn draw_marker(node: NodeId, peer: PeerId, awareness: &dyn Awareness, scene: &mut dyn Scene, camera: &Camera) {
    let primitives = awareness
        .peer_state(peer)
        .and_then(|state| state.cursor)
        .map(|cursor| cursor_glyph(camera.from_canvas_coordinates(cursor.into()), peer_color(peer)))
        .unwrap_or_default();
    scene.draw(node, primitives);
}
