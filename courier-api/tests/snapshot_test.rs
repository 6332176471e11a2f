use courier_api::{ActionId, BoxedPayload, Payload, Snapshot};

#[derive(Clone, Debug, PartialEq)]
struct Viewport {
    zoom: f32,
    origin: (i32, i32),
}

#[test]
fn test_custom_payloads_survive_a_clone() {
    let mut snapshot = Snapshot::new();
    snapshot.insert(ActionId(0), Viewport { zoom: 1.5, origin: (10, -4) });
    snapshot.insert(ActionId(1), vec!["a".to_string(), "b".to_string()]);

    let restored = snapshot.clone();
    assert_eq!(restored, snapshot);
    assert_eq!(
        restored.get::<Viewport>(ActionId(0)),
        Some(&Viewport { zoom: 1.5, origin: (10, -4) })
    );
    assert_eq!(restored.get::<Vec<String>>(ActionId(1)).map(Vec::len), Some(2));
}

#[test]
fn test_insert_replaces_and_returns_previous_input() {
    let mut snapshot = Snapshot::new();
    assert!(snapshot.insert(ActionId(4), 1u8).is_none());

    let previous = snapshot.insert(ActionId(4), 2u8).expect("previous input");
    assert_eq!(previous.downcast_ref::<u8>(), Some(&1));
    assert_eq!(snapshot.get::<u8>(ActionId(4)), Some(&2));
    assert_eq!(snapshot.len(), 1);
}

#[test]
fn test_equality_compares_types_as_well_as_values() {
    let mut numbers = Snapshot::new();
    numbers.insert(ActionId(0), 7u32);

    let mut wider = Snapshot::new();
    wider.insert(ActionId(0), 7u64);

    let mut elsewhere = Snapshot::new();
    elsewhere.insert(ActionId(1), 7u32);

    assert_ne!(numbers, wider);
    assert_ne!(numbers, elsewhere);
    assert_eq!(Snapshot::new(), Snapshot::default());
}

#[test]
fn test_remove_and_clear() {
    let mut snapshot = Snapshot::new();
    snapshot.insert(ActionId(0), ());
    snapshot.insert(ActionId(2), "name".to_string());

    assert!(snapshot.remove(ActionId(0)).is_some());
    assert!(!snapshot.contains(ActionId(0)));
    assert!(snapshot.contains(ActionId(2)));

    snapshot.clear();
    assert!(snapshot.is_empty());
}

#[test]
fn test_collects_from_boxed_entries() {
    let entries: Vec<(ActionId, BoxedPayload)> = vec![
        (ActionId(3), Box::new(3i64) as BoxedPayload),
        (ActionId(1), Box::new("one") as BoxedPayload),
    ];
    let snapshot: Snapshot = entries.into_iter().collect();

    let described: Vec<_> = snapshot
        .iter()
        .map(|(id, input)| format!("{id}={input:?}"))
        .collect();
    assert_eq!(described, vec!["action#1=\"one\"", "action#3=3"]);

    let boxed = snapshot.get_boxed(ActionId(3)).expect("entry");
    assert!(boxed.eq_payload(&3i64));
    assert_eq!(boxed.payload_type(), "i64");
}

#[test]
fn test_debug_lists_entries() {
    let mut snapshot = Snapshot::new();
    snapshot.insert(ActionId(0), 12u16);
    assert_eq!(format!("{snapshot:?}"), "{ActionId(0): 12}");
}
