//! Quantified invariants over the engine.

use common::strings::{length_point, make_canonical_object_name, strip_color};
use interp::boolexp::{eval_boolexp, parse_boolexp, BoolExp};
use interp::game::Ctx;
use world::attr::A_USER_START;
use world::{ObjectType, GOD, NOTHING};

use crate::common_setup::{populated_game, run_as};

#[test]
fn test_where_room_always_room_or_nothing() {
    let (mut g, alice, _bob) = populated_game();
    run_as(&mut g, GOD, "@create Sack");
    let sack = g.world.db.db_top() - 1;
    run_as(&mut g, GOD, "@create Marble");
    let marble = g.world.db.db_top() - 1;
    g.world.db.move_object(marble, sack);

    for d in 0..g.world.db.db_top() {
        let room = g.world.db.where_room(d);
        assert!(
            room == NOTHING || g.world.db.kind(room) == ObjectType::Room,
            "where_room(#{}) returned #{}",
            d,
            room
        );
    }
    assert_eq!(g.world.db.where_room(marble), 0);
    let _ = alice;
}

#[test]
fn test_set_get_round_trip_and_list_coupling() {
    let (mut g, _alice, _bob) = populated_game();
    run_as(&mut g, GOD, "@create Slate");
    let slate = g.world.db.db_top() - 1;
    let foo = g.world.attrs.catalog_mut().mkattr("FOO").unwrap();

    g.world.atr_set(GOD, slate, foo, "value one").unwrap();
    assert_eq!(g.world.atr_get(slate, foo).text, "value one");
    assert!(g.world.attrs.iterate(slate).contains(&foo));

    g.world.atr_set(GOD, slate, foo, "").unwrap();
    assert_eq!(g.world.atr_get(slate, foo).text, "");
    assert!(!g.world.attrs.iterate(slate).contains(&foo));

    // a in list(o) iff get(o, a) nonempty, across everything defined.
    for d in 0..g.world.db.db_top() {
        for a in g.world.attrs.iterate(d) {
            assert!(
                !g.world.atr_get(d, a).text.is_empty(),
                "list of #{} holds empty attribute {}",
                d,
                a
            );
        }
    }
}

#[test]
fn test_canonical_object_name_idempotent() {
    for name in ["Widget", "A fine hat", "x"] {
        let once = make_canonical_object_name(name).unwrap();
        let twice = make_canonical_object_name(&once).unwrap();
        assert_eq!(once, twice);
    }
}

#[test]
fn test_strip_color_identity_and_point_length() {
    for s in ["", "plain", "two words", "\u{4e2d}\u{6587} mixed"] {
        assert_eq!(strip_color(s), s);
        assert_eq!(length_point(s), s.chars().count());
    }
}

#[test]
fn test_lock_boolean_algebra() {
    let (mut g, alice, bob) = populated_game();
    run_as(&mut g, alice, "@create Prize");
    let prize = g.world.db.db_top() - 1;
    run_as(&mut g, alice, "drop prize");

    let ctx = Ctx::acting_alone(prize);
    let a = parse_boolexp(&mut g, &ctx, &format!("#{}", alice));
    let b = parse_boolexp(&mut g, &ctx, &format!("#{}", bob));
    let and = BoolExp::And(Box::new(a.clone()), Box::new(b.clone()));
    let not_not = BoolExp::Not(Box::new(BoolExp::Not(Box::new(a.clone()))));

    for player in [alice, bob, GOD] {
        let ea = eval_boolexp(&mut g, player, prize, &a);
        let eb = eval_boolexp(&mut g, player, prize, &b);
        assert_eq!(eval_boolexp(&mut g, player, prize, &and), ea && eb);
        assert_eq!(eval_boolexp(&mut g, player, prize, &not_not), ea);
    }
}

#[test]
fn test_garbage_slots_have_no_attributes_or_membership() {
    let (mut g, _alice, _bob) = populated_game();
    run_as(&mut g, GOD, "@create Ephemeral");
    let e = g.world.db.db_top() - 1;
    let foo = g.world.attrs.catalog_mut().mkattr("EPHFOO").unwrap();
    assert_eq!(foo, A_USER_START);
    g.world.atr_set(GOD, e, foo, "short lived").unwrap();
    run_as(&mut g, GOD, "@destroy ephemeral");

    assert!(!g.world.db.good(e));
    assert!(g.world.attrs.iterate(e).is_empty());
    for d in 0..g.world.db.db_top() {
        if g.world.db.good(d) {
            assert!(
                !g.world.db.member(e, g.world.db.contents(d)),
                "garbage #{} still listed in #{}",
                e,
                d
            );
        }
    }
}
