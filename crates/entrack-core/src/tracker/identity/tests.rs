use super::*;
use proptest::prelude::*;

fn id(n: u32) -> EntityId {
    EntityId(n)
}

#[test]
fn insert_rejects_second_holder() {
    let mut map = IdentityMap::default();
    map.insert("Blog", KeyValue::from(1_i64), id(0)).unwrap();

    assert_eq!(map.insert("Blog", KeyValue::from(1_i64), id(7)), Err(id(0)));
    assert_eq!(map.insert("Blog", KeyValue::from(1_i64), id(0)), Ok(()));
    // Same key on another entity type is a distinct identity.
    assert_eq!(map.insert("Post", KeyValue::from(1_i64), id(7)), Ok(()));
    assert_eq!(map.len(), 2);
}

#[test]
fn remove_only_releases_own_identity() {
    let mut map = IdentityMap::default();
    map.insert("Blog", KeyValue::from(1_i64), id(0)).unwrap();

    assert!(!map.remove("Blog", &KeyValue::from(1_i64), id(3)));
    assert_eq!(map.find("Blog", &KeyValue::from(1_i64)), Some(id(0)));

    assert!(map.remove("Blog", &KeyValue::from(1_i64), id(0)));
    assert_eq!(map.find("Blog", &KeyValue::from(1_i64)), None);
}

#[test]
fn rekey_moves_temporary_identity() {
    let mut map = IdentityMap::default();
    map.insert("Blog", KeyValue::from(-1_i64), id(0)).unwrap();
    map.insert("Blog", KeyValue::from(5_i64), id(1)).unwrap();

    assert_eq!(
        map.rekey("Blog", &KeyValue::from(-1_i64), KeyValue::from(5_i64), id(0)),
        Err(id(1))
    );
    map.rekey("Blog", &KeyValue::from(-1_i64), KeyValue::from(6_i64), id(0))
        .unwrap();

    assert_eq!(map.find("Blog", &KeyValue::from(-1_i64)), None);
    assert_eq!(map.find("Blog", &KeyValue::from(6_i64)), Some(id(0)));
}

proptest! {
    #[test]
    fn every_identity_has_one_holder(claims in prop::collection::vec((0_i64..8, 0_u32..16), 0..64)) {
        let mut map = IdentityMap::default();
        let mut first = BTreeMap::new();

        for (key, holder) in claims {
            let winner = map.get_or_insert("Post", KeyValue::from(key), id(holder));
            let expected = *first.entry(key).or_insert(holder);
            prop_assert_eq!(winner, id(expected));
        }

        prop_assert_eq!(map.len(), first.len());
        for (entity, key, holder) in map.iter() {
            prop_assert_eq!(entity, "Post");
            let key = key.parts()[0].as_int().unwrap();
            prop_assert_eq!(holder, id(first[&key]));
        }
    }
}
