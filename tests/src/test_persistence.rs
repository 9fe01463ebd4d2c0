//! Checkpoint and restore across the whole stack, including the paged
//! attribute store.

use common::config::MuxConfig;
use interp::game::Game;
use world::attr::A_NAME;
use world::{flatfile, GOD};

use crate::common_setup::{populated_game, run_as};

fn temp_path(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("mux-it-{}-{}", std::process::id(), name));
    p
}

#[test]
fn test_checkpoint_reload_preserves_world() {
    let (mut g, alice, _bob) = populated_game();
    run_as(&mut g, GOD, "@create Heirloom");
    let heirloom = g.world.db.db_top() - 1;
    run_as(&mut g, GOD, "&HISTORY heirloom=passed down for %r generations");
    run_as(&mut g, GOD, "@lock heirloom=me");

    let dump = temp_path("reload.flat");
    flatfile::dump(&mut g.world, &dump).unwrap();

    let mut g2 = Game::new_in_memory(MuxConfig::default());
    flatfile::load_into(&mut g2.world, &dump).unwrap();

    assert_eq!(g2.world.db.db_top(), g.world.db.db_top());
    assert_eq!(g2.world.atr_get(heirloom, A_NAME).text, "Heirloom");
    assert_eq!(g2.world.db.name(alice), "Alice");
    assert_eq!(g2.world.db.location(heirloom), GOD);

    let history = g2.world.attrs.catalog().atr_str("HISTORY").unwrap().num;
    assert_eq!(
        g2.world.atr_get(heirloom, history).text,
        "passed down for %r generations"
    );

    // The canonical lock text survives and still gates.
    let locked = run_as(&mut g2, GOD, "think [get(heirloom/lock)]");
    assert_eq!(locked, vec![format!("#{}", GOD)]);
    let _ = std::fs::remove_file(&dump);
}

#[test]
fn test_paged_store_full_cycle() {
    let dir = temp_path("paged-home");
    let _ = std::fs::remove_dir_all(&dir);
    let mut cfg = MuxConfig::default();
    cfg.base.data_dir = dir.to_string_lossy().to_string();
    // A tiny cache forces eviction write-through during the run.
    cfg.limits.atr_cache_size = 4;

    let mut g = Game::with_store(cfg.clone()).unwrap();
    g.bootstrap().unwrap();
    for i in 0..20 {
        run_as(&mut g, GOD, &format!("@create Relic{}", i));
        run_as(&mut g, GOD, &format!("&NOTE relic{0}=note number {0}", i));
    }
    let outdb = g.world.cfg.base.outdb_path();
    flatfile::dump(&mut g.world, &outdb).unwrap();
    drop(g);

    let mut g2 = Game::with_store(cfg).unwrap();
    flatfile::load_into(&mut g2.world, &outdb).unwrap();
    let note = g2.world.attrs.catalog().atr_str("NOTE").unwrap().num;
    for i in 0..20 {
        let d = 2 + i * 1; // Relics allocate densely after Limbo and God.
        let text = g2.world.atr_get(d, note).text;
        assert_eq!(text, format!("note number {}", i));
    }
    let _ = std::fs::remove_dir_all(&dir);
}
