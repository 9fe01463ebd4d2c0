use common::config::MuxConfig;
use interp::game::{Ctx, Game};
use world::{Dbref, ObjectType, NOTHING};

/// Limbo (#0), God (#1), and two mortals in Limbo.
pub fn populated_game() -> (Game, Dbref, Dbref) {
    let mut g = Game::new_in_memory(MuxConfig::default());
    g.bootstrap().unwrap();
    let alice = add_player(&mut g, "Alice");
    let bob = add_player(&mut g, "Bob");
    (g, alice, bob)
}

pub fn add_player(g: &mut Game, name: &str) -> Dbref {
    let d = g
        .world
        .create_object(ObjectType::Player, NOTHING, name)
        .unwrap();
    if let Some(o) = g.world.db.fetch_mut(d) {
        o.pennies = 1000;
        o.home = 0;
    }
    g.world.db.add_contents(0, d);
    d
}

/// Run a command and hand back every line queued for `who` since.
pub fn run_as(g: &mut Game, who: Dbref, line: &str) -> Vec<String> {
    let ctx = Ctx::acting_alone(who);
    interp::command::process_command(g, &ctx, line);
    g.outbox
        .drain()
        .into_iter()
        .filter(|(d, _)| *d == who)
        .map(|(_, m)| m)
        .collect()
}

/// Run a command, keeping the outbox for later inspection.
pub fn run_keep(g: &mut Game, who: Dbref, line: &str) {
    let ctx = Ctx::acting_alone(who);
    interp::command::process_command(g, &ctx, line);
}
