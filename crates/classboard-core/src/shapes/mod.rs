//! Shape adapters: the local visual objects mirroring shape records.

mod association;
mod class;

pub use association::{
    Arrowhead, AssociationProperties, AssociationShape, LineType, PointDrag, multiplicity_placement,
};
pub use class::{ClassProperties, ClassShape, HANDLE_POSITIONS, perimeter_point};

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use kurbo::{Point, Rect, Vec2};

use crate::config::BoardConfig;
use crate::crdt::CrdtDocument;
use crate::error::Result;
use crate::geometry::Edge;
use crate::scene::Scene;
use crate::schema::{Anchor, ShapeId, ShapeRecord};

/// Everything a shape needs to read, write and draw itself.
pub struct ShapeContext {
    pub doc: CrdtDocument,
    pub scene: Box<dyn Scene>,
    pub config: BoardConfig,
    pending_bounds: Vec<ShapeId>,
}

impl std::fmt::Debug for ShapeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeContext")
            .field("doc", &self.doc)
            .field("pending_bounds", &self.pending_bounds)
            .finish()
    }
}

impl ShapeContext {
    pub fn new(doc: CrdtDocument, scene: Box<dyn Scene>, config: BoardConfig) -> Self {
        Self {
            doc,
            scene,
            config,
            pending_bounds: Vec::new(),
        }
    }

    /// Queue a bounds-changed broadcast for `id`.
    pub fn notify_bounds_changed(&mut self, id: ShapeId) {
        if !self.pending_bounds.contains(&id) {
            self.pending_bounds.push(id);
        }
    }

    /// Take the queued bounds-changed notifications.
    pub fn take_bounds_changed(&mut self) -> Vec<ShapeId> {
        std::mem::take(&mut self.pending_bounds)
    }
}

/// A structured value parsed from a shape's raw property text.
pub trait Properties: Sized {
    fn parse(raw: &str) -> Self;
}

/// Lazily parsed property text.
///
/// Holds the raw text the cached value was parsed from; the value is
/// reparsed only when the text it is given differs.
#[derive(Debug)]
pub struct PropertiesCache<P> {
    raw: Option<String>,
    parsed: Option<Rc<P>>,
}

impl<P> Default for PropertiesCache<P> {
    fn default() -> Self {
        Self {
            raw: None,
            parsed: None,
        }
    }
}

impl<P: Properties> PropertiesCache<P> {
    /// Parsed value for `raw`, plus whether it had to be reparsed.
    pub fn get(&mut self, raw: String) -> (Rc<P>, bool) {
        if let (Some(cached), Some(parsed)) = (&self.raw, &self.parsed) {
            if *cached == raw {
                return (parsed.clone(), false);
            }
        }
        let parsed = Rc::new(P::parse(&raw));
        self.raw = Some(raw);
        self.parsed = Some(parsed.clone());
        (parsed, true)
    }

    pub fn invalidate(&mut self) {
        self.raw = None;
        self.parsed = None;
    }
}

/// Local state common to every shape.
#[derive(Debug)]
pub struct ShapeBase<P> {
    pub record: ShapeRecord,
    pub key: String,
    pub selected: bool,
    pub focused: bool,
    properties: RefCell<PropertiesCache<P>>,
}

impl<P: Properties> ShapeBase<P> {
    pub fn new(record: ShapeRecord) -> Self {
        let key = record.key();
        Self {
            record,
            key,
            selected: false,
            focused: false,
            properties: RefCell::new(PropertiesCache::default()),
        }
    }

    /// Current parsed properties, reparsed if the raw text changed.
    pub fn properties(&self) -> Rc<P> {
        self.properties.borrow_mut().get(self.record.properties_text()).0
    }

    /// Re-read the raw text. Returns true when the parsed value changed.
    pub fn refresh_properties(&self) -> bool {
        self.properties.borrow_mut().get(self.record.properties_text()).1
    }
}

/// Where a pointer press landed on a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTarget {
    Body,
    /// Perimeter handle of a class, carrying its perimeter parameter.
    ClassHandle(f64),
    /// Handle of the association point at this index.
    PointHandle(usize),
    /// Midpoint handle; pressing it inserts a point at this index.
    MidpointHandle(usize),
}

/// A shape whose bounds just changed, as seen by its listeners.
#[derive(Debug, Clone)]
pub struct AnchorSource {
    pub id: ShapeId,
    pub key: String,
    /// Box the anchor parameters address, for shapes that have one.
    pub perimeter: Option<Rect>,
}

impl AnchorSource {
    pub fn anchor_point(&self, position: f64) -> Option<Point> {
        self.perimeter.map(|rect| perimeter_point(rect, position))
    }
}

/// A shape perimeter position under the pointer that an endpoint can bind to.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorCandidate {
    pub shape: ShapeId,
    pub anchor: Anchor,
    /// Logical point the anchor addresses.
    pub point: Point,
}

/// Contract every shape adapter honours.
pub trait ShapeTrait {
    fn id(&self) -> ShapeId;
    fn key(&self) -> &str;
    fn record(&self) -> &ShapeRecord;
    /// Bounding box in logical coordinates.
    fn bounds(&self) -> Rect;
    fn is_selected(&self) -> bool;
    fn is_focused(&self) -> bool;

    fn select(&mut self, ctx: &mut ShapeContext);
    fn deselect(&mut self, ctx: &mut ShapeContext);
    fn focus(&mut self, ctx: &mut ShapeContext);
    fn blur(&mut self, ctx: &mut ShapeContext);

    /// Re-synchronize the visual from the record.
    fn update(&mut self, ctx: &mut ShapeContext);

    /// Move so that `edge` lies on `value`. Returns whether the shape moved.
    fn align(&mut self, ctx: &mut ShapeContext, edge: Edge, value: f64) -> Result<bool>;

    /// Begin dragging as part of a selection whose keys are `selection`.
    fn start_interactive_move(&mut self, ctx: &mut ShapeContext, selection: &HashSet<String>);
    /// Apply one drag step, in logical units.
    fn interactive_move(&mut self, ctx: &mut ShapeContext, delta: Vec2) -> Result<()>;
    fn end_interactive_move(&mut self, ctx: &mut ShapeContext);

    /// Point addressed by a perimeter parameter, for shapes with a perimeter.
    fn get_anchor_point(&self, position: f64) -> Option<Point>;
    /// Perimeter parameter for a point on or near the perimeter.
    fn get_snap_position(&self, point: Point) -> Option<f64>;

    /// Hit test against visible handles only.
    fn hit_test_handles(&self, point: Point) -> Option<HitTarget>;
    /// Hit test against the shape body.
    fn hit_test(&self, point: Point, tolerance: f64) -> bool;

    /// React to another shape's bounds change.
    fn on_shape_bounds_changed(&mut self, ctx: &mut ShapeContext, source: &AnchorSource) -> Result<()>;

    /// Tear down every scene node owned by the shape.
    fn remove(&mut self, ctx: &mut ShapeContext);
}

/// Adapter for one record, discriminated by kind.
#[derive(Debug)]
pub enum ShapeAdapter {
    Class(ClassShape),
    Association(AssociationShape),
}

impl ShapeAdapter {
    /// Build the adapter for `record` and draw it.
    pub fn adapt(ctx: &mut ShapeContext, record: ShapeRecord) -> Self {
        match record {
            ShapeRecord::Class(r) => ShapeAdapter::Class(ClassShape::new(ctx, r)),
            ShapeRecord::Association(r) => ShapeAdapter::Association(AssociationShape::new(ctx, r)),
        }
    }

    pub fn as_shape(&self) -> &dyn ShapeTrait {
        match self {
            ShapeAdapter::Class(s) => s,
            ShapeAdapter::Association(s) => s,
        }
    }

    pub fn as_shape_mut(&mut self) -> &mut dyn ShapeTrait {
        match self {
            ShapeAdapter::Class(s) => s,
            ShapeAdapter::Association(s) => s,
        }
    }

    pub fn as_class(&self) -> Option<&ClassShape> {
        match self {
            ShapeAdapter::Class(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_association(&self) -> Option<&AssociationShape> {
        match self {
            ShapeAdapter::Association(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_association_mut(&mut self) -> Option<&mut AssociationShape> {
        match self {
            ShapeAdapter::Association(s) => Some(s),
            _ => None,
        }
    }

    pub fn id(&self) -> ShapeId {
        self.as_shape().id()
    }

    pub fn key(&self) -> &str {
        self.as_shape().key()
    }

    pub fn bounds(&self) -> Rect {
        self.as_shape().bounds()
    }

    /// Snapshot used to broadcast a bounds change from this shape.
    pub fn anchor_source(&self) -> AnchorSource {
        AnchorSource {
            id: self.id(),
            key: self.key().to_string(),
            perimeter: match self {
                ShapeAdapter::Class(s) => Some(s.bounds()),
                ShapeAdapter::Association(_) => None,
            },
        }
    }

    /// Whether any of `ids` is a container on this shape's record.
    pub fn owns_path(&self, path: &[ShapeId]) -> bool {
        let id = self.id();
        path.iter().any(|p| *p == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Lines(usize);

    impl Properties for Lines {
        fn parse(raw: &str) -> Self {
            Lines(raw.lines().count())
        }
    }

    #[test]
    fn test_properties_cache_reparses_on_change() {
        let mut cache = PropertiesCache::<Lines>::default();
        let (first, reparsed) = cache.get("a\nb".to_string());
        assert!(reparsed);
        assert_eq!(*first, Lines(2));

        let (second, reparsed) = cache.get("a\nb".to_string());
        assert!(!reparsed);
        assert!(Rc::ptr_eq(&first, &second));

        let (third, reparsed) = cache.get("a".to_string());
        assert!(reparsed);
        assert_eq!(*third, Lines(1));

        cache.invalidate();
        assert!(cache.get("a".to_string()).1);
    }

    #[test]
    fn test_anchor_source_without_perimeter() {
        let doc = CrdtDocument::default();
        let record = doc
            .transact(|list| crate::schema::create_class_record(list, Point::ZERO, "A"))
            .expect("create");
        let source = AnchorSource {
            id: record.id(),
            key: record.key(),
            perimeter: None,
        };
        assert_eq!(source.anchor_point(1.5), None);

        let boxed = AnchorSource {
            perimeter: Some(Rect::new(0.0, 0.0, 100.0, 40.0)),
            ..source
        };
        assert_eq!(boxed.anchor_point(1.5), Some(Point::new(50.0, 0.0)));
    }
}
