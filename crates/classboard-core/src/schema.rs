//! Shape records stored in the canonical sequence.
//!
//! Records are thin typed views over `LoroMap` containers. Reads go straight
//! to the document; writes do not commit, callers wrap them in
//! [`CrdtDocument::transact`](crate::crdt::CrdtDocument::transact).

use kurbo::{Point, Vec2};
use loro::{
    Container, ContainerID, ContainerTrait, LoroList, LoroMap, LoroResult, LoroText, LoroValue,
    ValueOrContainer,
};
use uuid::Uuid;

/// Identity of a shape: the container id of its record.
pub type ShapeId = ContainerID;

// Record kinds
pub const KIND_CLASS: &str = "class";
pub const KIND_ASSOCIATION: &str = "association";

// Common keys
const KEY_KEY: &str = "key";
const KEY_KIND: &str = "kind";
const KEY_PROPERTIES: &str = "properties";

// Class keys
const KEY_POSITION: &str = "position";

// Association keys
const KEY_POINTS: &str = "points";
const KEY_ANCHOR1: &str = "anchor1";
const KEY_ANCHOR2: &str = "anchor2";

// Point keys
const KEY_X: &str = "x";
const KEY_Y: &str = "y";

/// Generate a fresh record key: 16 hex chars from a v4 UUID.
pub fn new_shape_key() -> String {
    let mut key = Uuid::new_v4().simple().to_string();
    key.truncate(16);
    key
}

fn get_double(map: &LoroMap, key: &str) -> Option<f64> {
    match map.get(key)? {
        ValueOrContainer::Value(LoroValue::Double(d)) => Some(d),
        ValueOrContainer::Value(LoroValue::I64(i)) => Some(i as f64),
        _ => None,
    }
}

fn get_string(map: &LoroMap, key: &str) -> Option<String> {
    match map.get(key)? {
        ValueOrContainer::Value(LoroValue::String(s)) => Some(s.to_string()),
        _ => None,
    }
}

fn get_map(map: &LoroMap, key: &str) -> Option<LoroMap> {
    match map.get(key)? {
        ValueOrContainer::Container(Container::Map(m)) => Some(m),
        _ => None,
    }
}

fn get_list(map: &LoroMap, key: &str) -> Option<LoroList> {
    match map.get(key)? {
        ValueOrContainer::Container(Container::List(l)) => Some(l),
        _ => None,
    }
}

fn get_text(map: &LoroMap, key: &str) -> Option<LoroText> {
    match map.get(key)? {
        ValueOrContainer::Container(Container::Text(t)) => Some(t),
        _ => None,
    }
}

fn list_map(list: &LoroList, index: usize) -> Option<LoroMap> {
    match list.get(index)? {
        ValueOrContainer::Container(Container::Map(m)) => Some(m),
        _ => None,
    }
}

fn replace_text(text: &LoroText, value: &str) -> LoroResult<()> {
    if text.to_string() == value {
        return Ok(());
    }
    let len = text.len_unicode();
    if len > 0 {
        text.delete(0, len)?;
    }
    text.insert(0, value)
}

/// A `{x, y}` map.
#[derive(Debug, Clone)]
pub struct PointRecord {
    map: LoroMap,
}

impl PointRecord {
    pub fn get(&self) -> Point {
        Point::new(
            get_double(&self.map, KEY_X).unwrap_or(0.0),
            get_double(&self.map, KEY_Y).unwrap_or(0.0),
        )
    }

    pub fn set(&self, point: Point) -> LoroResult<()> {
        self.map.insert(KEY_X, point.x)?;
        self.map.insert(KEY_Y, point.y)
    }

    fn create_in_map(parent: &LoroMap, key: &str, point: Point) -> LoroResult<Self> {
        let map = parent.insert_container(key, LoroMap::new())?;
        let record = Self { map };
        record.set(point)?;
        Ok(record)
    }

    fn create_in_list(list: &LoroList, index: usize, point: Point) -> LoroResult<Self> {
        let map = list.insert_container(index, LoroMap::new())?;
        let record = Self { map };
        record.set(point)?;
        Ok(record)
    }
}

/// Reference from an association endpoint to a perimeter position on another shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    /// Key of the referenced shape.
    pub key: String,
    /// Perimeter parameter in `[0, 4)`.
    pub position: f64,
}

impl Anchor {
    pub fn new(key: impl Into<String>, position: f64) -> Self {
        Self {
            key: key.into(),
            position,
        }
    }
}

/// Which end of an association an anchor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorEnd {
    /// `anchor1`, bound to the first point.
    Start,
    /// `anchor2`, bound to the last point.
    End,
}

impl AnchorEnd {
    fn field(self) -> &'static str {
        match self {
            AnchorEnd::Start => KEY_ANCHOR1,
            AnchorEnd::End => KEY_ANCHOR2,
        }
    }
}

/// Record of a class box.
#[derive(Debug, Clone)]
pub struct ClassRecord {
    map: LoroMap,
}

impl ClassRecord {
    pub fn id(&self) -> ShapeId {
        self.map.id()
    }

    pub fn key(&self) -> String {
        get_string(&self.map, KEY_KEY).unwrap_or_default()
    }

    /// Top-left corner of the box.
    pub fn position(&self) -> Point {
        get_map(&self.map, KEY_POSITION)
            .map(|map| PointRecord { map }.get())
            .unwrap_or(Point::ZERO)
    }

    pub fn set_position(&self, position: Point) -> LoroResult<()> {
        match get_map(&self.map, KEY_POSITION) {
            Some(map) => PointRecord { map }.set(position),
            None => PointRecord::create_in_map(&self.map, KEY_POSITION, position).map(|_| ()),
        }
    }

    pub fn properties(&self) -> Option<LoroText> {
        get_text(&self.map, KEY_PROPERTIES)
    }
}

/// Record of a connector between shapes.
#[derive(Debug, Clone)]
pub struct AssociationRecord {
    map: LoroMap,
}

impl AssociationRecord {
    pub fn id(&self) -> ShapeId {
        self.map.id()
    }

    pub fn key(&self) -> String {
        get_string(&self.map, KEY_KEY).unwrap_or_default()
    }

    fn points_list(&self) -> Option<LoroList> {
        get_list(&self.map, KEY_POINTS)
    }

    pub fn point_count(&self) -> usize {
        self.points_list().map(|l| l.len()).unwrap_or(0)
    }

    pub fn point(&self, index: usize) -> Option<PointRecord> {
        list_map(&self.points_list()?, index).map(|map| PointRecord { map })
    }

    /// All points in order.
    pub fn points(&self) -> Vec<Point> {
        let Some(list) = self.points_list() else {
            return Vec::new();
        };
        (0..list.len())
            .filter_map(|i| list_map(&list, i))
            .map(|map| PointRecord { map }.get())
            .collect()
    }

    pub fn set_point(&self, index: usize, point: Point) -> LoroResult<()> {
        match self.point(index) {
            Some(record) => record.set(point),
            None => Ok(()),
        }
    }

    pub fn insert_point(&self, index: usize, point: Point) -> LoroResult<()> {
        let list = match self.points_list() {
            Some(list) => list,
            None => self.map.insert_container(KEY_POINTS, LoroList::new())?,
        };
        PointRecord::create_in_list(&list, index.min(list.len()), point).map(|_| ())
    }

    pub fn delete_point(&self, index: usize) -> LoroResult<()> {
        match self.points_list() {
            Some(list) if index < list.len() => list.delete(index, 1),
            _ => Ok(()),
        }
    }

    /// Move every point by `delta`.
    pub fn translate(&self, delta: Vec2) -> LoroResult<()> {
        let Some(list) = self.points_list() else {
            return Ok(());
        };
        for i in 0..list.len() {
            if let Some(map) = list_map(&list, i) {
                let record = PointRecord { map };
                record.set(record.get() + delta)?;
            }
        }
        Ok(())
    }

    pub fn anchor(&self, end: AnchorEnd) -> Option<Anchor> {
        let map = get_map(&self.map, end.field())?;
        Some(Anchor {
            key: get_string(&map, KEY_KEY)?,
            position: get_double(&map, KEY_POSITION)?,
        })
    }

    pub fn anchor1(&self) -> Option<Anchor> {
        self.anchor(AnchorEnd::Start)
    }

    pub fn anchor2(&self) -> Option<Anchor> {
        self.anchor(AnchorEnd::End)
    }

    /// Bind or clear an anchor. Writes nothing when the value is unchanged.
    pub fn set_anchor(&self, end: AnchorEnd, anchor: Option<&Anchor>) -> LoroResult<()> {
        if self.anchor(end).as_ref() == anchor {
            return Ok(());
        }
        match anchor {
            Some(anchor) => {
                let map = match get_map(&self.map, end.field()) {
                    Some(map) => map,
                    None => self.map.insert_container(end.field(), LoroMap::new())?,
                };
                map.insert(KEY_KEY, anchor.key.as_str())?;
                map.insert(KEY_POSITION, anchor.position)
            }
            None => self.map.delete(end.field()),
        }
    }

    pub fn properties(&self) -> Option<LoroText> {
        get_text(&self.map, KEY_PROPERTIES)
    }
}

/// A record in the canonical sequence.
#[derive(Debug, Clone)]
pub enum ShapeRecord {
    Class(ClassRecord),
    Association(AssociationRecord),
}

impl ShapeRecord {
    /// Interpret a sequence entry. Entries of unknown kind yield `None`.
    pub fn from_container(value: ValueOrContainer) -> Option<Self> {
        match value {
            ValueOrContainer::Container(Container::Map(map)) => Self::from_map(map),
            _ => None,
        }
    }

    pub fn from_map(map: LoroMap) -> Option<Self> {
        match get_string(&map, KEY_KIND)?.as_str() {
            KIND_CLASS => Some(ShapeRecord::Class(ClassRecord { map })),
            KIND_ASSOCIATION => Some(ShapeRecord::Association(AssociationRecord { map })),
            other => {
                log::debug!("Ignoring record of unknown kind {other:?}");
                None
            }
        }
    }

    pub fn id(&self) -> ShapeId {
        match self {
            ShapeRecord::Class(r) => r.id(),
            ShapeRecord::Association(r) => r.id(),
        }
    }

    pub fn key(&self) -> String {
        match self {
            ShapeRecord::Class(r) => r.key(),
            ShapeRecord::Association(r) => r.key(),
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, ShapeRecord::Class(_))
    }

    pub fn is_association(&self) -> bool {
        matches!(self, ShapeRecord::Association(_))
    }

    pub fn properties(&self) -> Option<LoroText> {
        match self {
            ShapeRecord::Class(r) => r.properties(),
            ShapeRecord::Association(r) => r.properties(),
        }
    }

    /// Current raw property text.
    pub fn properties_text(&self) -> String {
        self.properties().map(|t| t.to_string()).unwrap_or_default()
    }

    /// Replace the raw property text.
    pub fn set_properties_text(&self, value: &str) -> LoroResult<()> {
        match self.properties() {
            Some(text) => replace_text(&text, value),
            None => {
                let map = match self {
                    ShapeRecord::Class(r) => &r.map,
                    ShapeRecord::Association(r) => &r.map,
                };
                let text = map.insert_container(KEY_PROPERTIES, LoroText::new())?;
                text.insert(0, value)
            }
        }
    }
}

/// Per-kind handlers for [`match_shape_record`].
pub struct ShapeCases<'a, R> {
    class: Option<Box<dyn FnOnce(&ClassRecord) -> R + 'a>>,
    association: Option<Box<dyn FnOnce(&AssociationRecord) -> R + 'a>>,
}

impl<R> Default for ShapeCases<'_, R> {
    fn default() -> Self {
        Self {
            class: None,
            association: None,
        }
    }
}

impl<'a, R> ShapeCases<'a, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, handler: impl FnOnce(&ClassRecord) -> R + 'a) -> Self {
        self.class = Some(Box::new(handler));
        self
    }

    pub fn association(mut self, handler: impl FnOnce(&AssociationRecord) -> R + 'a) -> Self {
        self.association = Some(Box::new(handler));
        self
    }
}

/// Dispatch `record` to the handler registered for its kind.
///
/// Returns `None` when no handler is registered for that kind.
pub fn match_shape_record<R>(record: &ShapeRecord, cases: ShapeCases<'_, R>) -> Option<R> {
    match record {
        ShapeRecord::Class(r) => cases.class.map(|f| f(r)),
        ShapeRecord::Association(r) => cases.association.map(|f| f(r)),
    }
}

/// Append a class record at the end of the canonical sequence.
pub fn create_class_record(list: &LoroList, position: Point, title: &str) -> LoroResult<ClassRecord> {
    let map = list.insert_container(list.len(), LoroMap::new())?;
    map.insert(KEY_KEY, new_shape_key())?;
    map.insert(KEY_KIND, KIND_CLASS)?;
    PointRecord::create_in_map(&map, KEY_POSITION, position)?;
    let text = map.insert_container(KEY_PROPERTIES, LoroText::new())?;
    text.insert(0, title)?;
    Ok(ClassRecord { map })
}

/// Append an association record running from `start` to `end`.
pub fn create_association_record(
    list: &LoroList,
    start: Point,
    end: Point,
    anchor1: Option<&Anchor>,
    properties: &str,
) -> LoroResult<AssociationRecord> {
    let map = list.insert_container(list.len(), LoroMap::new())?;
    map.insert(KEY_KEY, new_shape_key())?;
    map.insert(KEY_KIND, KIND_ASSOCIATION)?;
    let points = map.insert_container(KEY_POINTS, LoroList::new())?;
    PointRecord::create_in_list(&points, 0, start)?;
    PointRecord::create_in_list(&points, 1, end)?;
    let text = map.insert_container(KEY_PROPERTIES, LoroText::new())?;
    text.insert(0, properties)?;
    let record = AssociationRecord { map };
    record.set_anchor(AnchorEnd::Start, anchor1)?;
    Ok(record)
}

/// Every known record in sequence order.
pub fn records(list: &LoroList) -> Vec<ShapeRecord> {
    (0..list.len())
        .filter_map(|i| list.get(i))
        .filter_map(ShapeRecord::from_container)
        .collect()
}

/// Index of the record with identity `id`.
pub fn index_of(list: &LoroList, id: &ShapeId) -> Option<usize> {
    (0..list.len()).find(|&i| list_map(list, i).is_some_and(|m| &m.id() == id))
}
