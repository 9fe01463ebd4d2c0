//! The end-to-end command scenarios.

use interp::command::tick;
use world::attr::A_NAME;
use world::GOD;

use crate::common_setup::{populated_game, run_as, run_keep};

#[test]
fn test_create_widget() {
    let (mut g, _alice, _bob) = populated_game();
    let before = g.world.db.db_top();

    let msgs = run_as(&mut g, GOD, "@create Widget");
    assert!(
        msgs.iter().any(|m| m.contains("created")),
        "got: {:?}",
        msgs
    );

    let new = before;
    assert_eq!(g.world.db.db_top(), before + 1);
    assert_eq!(g.world.atr_get(new, A_NAME).text, "Widget");
    assert_eq!(g.world.db.location(new), g.world.db.owner(new));
    assert_eq!(g.world.db.owner(new), GOD);
}

#[test]
fn test_attr_set_then_think_v() {
    let (mut g, _alice, _bob) = populated_game();
    let msgs = run_as(&mut g, GOD, "&FOO me=bar");
    assert!(msgs.iter().any(|m| m == "Set."), "got: {:?}", msgs);

    let msgs = run_as(&mut g, GOD, "think v(foo)");
    assert_eq!(msgs, vec!["bar".to_string()]);
}

#[test]
fn test_wait_two_ticks_then_say() {
    let (mut g, alice, _bob) = populated_game();
    let t0 = 1_000_000;
    tick(&mut g, t0);
    g.outbox.drain();

    run_keep(&mut g, GOD, "@wait 2=say hi");
    assert_eq!(g.queue.len(), 1);

    tick(&mut g, t0 + 1);
    assert!(
        g.outbox.for_player(alice).is_empty(),
        "fired a tick too early"
    );

    tick(&mut g, t0 + 2);
    let heard = g.outbox.for_player(alice);
    assert!(
        heard.iter().any(|m| *m == "God says, \"hi\""),
        "got: {:?}",
        heard
    );
    assert_eq!(g.queue.len(), 0);
}

#[test]
fn test_lock_blocks_pickup() {
    let (mut g, alice, bob) = populated_game();

    let msgs = run_as(&mut g, alice, "@create Gem");
    assert!(msgs.iter().any(|m| m.contains("created")));
    let gem = g.world.db.db_top() - 1;
    // Put it on the floor where both players can reach it.
    run_as(&mut g, alice, "drop gem");
    assert_eq!(g.world.db.location(gem), 0);

    let msgs = run_as(&mut g, alice, "@lock gem=me");
    assert!(msgs.iter().any(|m| m == "Locked."), "got: {:?}", msgs);

    let msgs = run_as(&mut g, bob, "get gem");
    assert!(
        msgs.iter().any(|m| m == "You can't pick that up."),
        "got: {:?}",
        msgs
    );
    assert_eq!(g.world.db.location(gem), 0);

    let msgs = run_as(&mut g, alice, "get gem");
    assert!(msgs.iter().any(|m| m == "Taken."), "got: {:?}", msgs);
    assert_eq!(g.world.db.location(gem), alice);
}

#[test]
fn test_think_add() {
    let (mut g, _alice, _bob) = populated_game();
    assert_eq!(run_as(&mut g, GOD, "think [add(1,2,3)]"), vec!["6"]);
    assert_eq!(
        run_as(&mut g, GOD, "think [add(1,foo)]"),
        vec!["#-1 ARGUMENTS MUST BE NUMBERS"]
    );
}

#[test]
fn test_wait_zero_chain_overflows() {
    let (mut g, _alice, _bob) = populated_game();
    g.queue = interp::CommandQueue::new(&common::config::LimitsConfig {
        queue_max_depth: 3,
        ..common::config::LimitsConfig::default()
    });

    // Each link enqueues the next at depth + 1.
    run_keep(
        &mut g,
        GOD,
        "@force me={@wait 0=@wait 0=@wait 0=@wait 0=say deep}",
    );

    let mut all: Vec<String> = Vec::new();
    for i in 0..10 {
        tick(&mut g, 1_000_000 + i);
        all.extend(g.outbox.drain().into_iter().map(|(_, m)| m));
    }
    assert!(
        all.iter().any(|m| m == "Queue overflow."),
        "got: {:?}",
        all
    );
    assert!(
        !all.iter().any(|m| m.contains("deep")),
        "the overflowing tail must not run: {:?}",
        all
    );
}

#[test]
fn test_semaphore_wait_and_notify() {
    let (mut g, alice, _bob) = populated_game();
    run_as(&mut g, GOD, "@create Gate");
    let _gate = g.world.db.db_top() - 1;
    run_as(&mut g, GOD, "drop gate");

    run_keep(&mut g, GOD, "@wait gate=say released");
    tick(&mut g, 2_000_000);
    assert!(
        g.outbox.for_player(alice).is_empty(),
        "fired without a notify"
    );
    g.outbox.drain();

    run_keep(&mut g, GOD, "@notify gate");
    tick(&mut g, 2_000_001);
    let heard = g.outbox.for_player(alice);
    assert!(
        heard.iter().any(|m| *m == "God says, \"released\""),
        "got: {:?}",
        heard
    );
}

#[test]
fn test_hook_runs_around_builtin() {
    let (mut g, _alice, _bob) = populated_game();
    run_as(&mut g, GOD, "@create Sentinel");
    run_as(&mut g, GOD, "&PREFACE sentinel=say first");
    run_as(&mut g, GOD, "&CODA sentinel=say last");
    run_as(&mut g, GOD, "@hook/before think=sentinel/preface");
    run_as(&mut g, GOD, "@hook/after think=sentinel/coda");

    run_keep(&mut g, GOD, "think middle");
    let all: Vec<String> = g.outbox.drain().into_iter().map(|(_, m)| m).collect();
    let first = all.iter().position(|m| m.contains("first")).unwrap();
    let middle = all.iter().position(|m| m == "middle").unwrap();
    let last = all.iter().position(|m| m.contains("last")).unwrap();
    assert!(first < middle && middle < last, "got: {:?}", all);

    run_as(&mut g, GOD, "@hook/clear think");
    let msgs = run_as(&mut g, GOD, "think quiet");
    assert_eq!(msgs, vec!["quiet"]);
}

#[test]
fn test_addcommand_binding() {
    let (mut g, _alice, _bob) = populated_game();
    run_as(&mut g, GOD, "@create Gadget");
    run_as(&mut g, GOD, "&ZAPCMD gadget=say zapped %0");
    let msgs = run_as(&mut g, GOD, "@addcommand zap=gadget/zapcmd");
    assert!(msgs.iter().any(|m| m.contains("added")), "got: {:?}", msgs);

    run_keep(&mut g, GOD, "zap wide");
    tick(&mut g, 3_000_000);
    let all: Vec<String> = g.outbox.drain().into_iter().map(|(_, m)| m).collect();
    assert!(
        all.iter().any(|m| m.contains("zapped wide")),
        "got: {:?}",
        all
    );

    run_as(&mut g, GOD, "@delcommand zap");
    let msgs = run_as(&mut g, GOD, "zap again");
    assert!(
        msgs.iter().any(|m| m.starts_with("Huh?")),
        "got: {:?}",
        msgs
    );
}
