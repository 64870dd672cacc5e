//! Two boards editing one diagram through exported updates.

use classboard_core::input::PointerEvent;
use classboard_core::schema::AnchorEnd;
use classboard_core::{
    Board, BoardConfig, CrdtDocument, InMemoryAwareness, Modifiers, MouseButton, RecordingScene, ShapeId,
};
use kurbo::Point;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn board(client: u64) -> Board {
    Board::new(
        CrdtDocument::default(),
        Box::new(RecordingScene::new()),
        Box::new(InMemoryAwareness::new(client)),
        BoardConfig::default(),
    )
}

/// Push everything `from` has that `to` lacks.
fn sync(from: &Board, to: &mut Board) {
    let bytes = from.doc().export_updates(&to.doc().version());
    to.import_updates(&bytes).expect("import");
}

fn drag(board: &mut Board, from: Point, to: Point) {
    let events = [
        PointerEvent::Down {
            position: from,
            button: MouseButton::Primary,
            modifiers: Modifiers::NONE,
        },
        PointerEvent::Move { position: to },
        PointerEvent::Up {
            position: to,
            button: MouseButton::Primary,
        },
    ];
    for event in events {
        board.handle_pointer_event(event).expect("pointer event");
    }
}

fn class_position(board: &Board, id: &ShapeId) -> Point {
    board
        .shape(id)
        .and_then(|s| s.as_class())
        .expect("class")
        .position()
}

#[test]
fn test_concurrent_edits_converge() {
    init_logging();
    let mut alice = board(1);
    let mut bob = board(2);

    alice
        .handle_pointer_event(PointerEvent::DoubleClick {
            position: Point::new(0.0, 0.0),
        })
        .expect("create");
    sync(&alice, &mut bob);
    let class = bob.shapes()[0].id();

    bob.add_class(Point::new(400.0, 0.0), "Bob").expect("bob class");
    alice.discard_selection();
    drag(&mut alice, Point::new(10.0, 10.0), Point::new(60.0, 30.0));

    sync(&alice, &mut bob);
    sync(&bob, &mut alice);

    assert_eq!(alice.shapes().len(), 2);
    assert_eq!(bob.shapes().len(), 2);
    assert_eq!(class_position(&alice, &class), Point::new(50.0, 20.0));
    assert_eq!(class_position(&bob, &class), Point::new(50.0, 20.0));

    let keys = |b: &Board| b.shapes().iter().map(|s| s.key().to_string()).collect::<Vec<_>>();
    assert_eq!(keys(&alice), keys(&bob));
}

#[test]
fn test_anchored_association_follows_remote_resize() {
    init_logging();
    let mut alice = board(1);
    let mut bob = board(2);

    let class = alice.add_class(Point::new(0.0, 0.0), "Foo").expect("class");
    let key = alice.shape(&class).expect("class").key().to_string();
    let association = alice
        .add_association(
            Point::new(60.0, 35.0),
            Point::new(60.0, 200.0),
            Some(classboard_core::Anchor::new(key, 3.5)),
        )
        .expect("association");
    sync(&alice, &mut bob);

    bob.set_properties(&class, "Foo\n-\nid: u64\nname: String")
        .expect("edit");
    sync(&bob, &mut alice);

    let bounds = alice.shape(&class).expect("class").bounds();
    let shape = alice
        .shape(&association)
        .and_then(|s| s.as_association())
        .expect("association");
    assert!(bounds.y1 > 35.0);
    assert_eq!(shape.points()[0], Point::new(bounds.x0 + 0.5 * bounds.width(), bounds.y1));
    assert!(shape.anchor(AnchorEnd::Start).is_some());
}
