//! Message delivery. The session layer is outside this workspace; the
//! outbox holds rendered lines per recipient until the driver drains
//! them to the wire (or to stdout in standalone mode).

use world::Dbref;

use crate::game::Game;

pub const NOPERM_MESSAGE: &str = "Permission denied.";
pub const NOMATCH_MESSAGE: &str = "I don't see that here.";
pub const AMBIGUOUS_MESSAGE: &str = "I don't know which one you mean!";
pub const HUH_MESSAGE: &str = "Huh?  (Type \"help\" for help.)";

#[derive(Debug, Default)]
pub struct Outbox {
    msgs: Vec<(Dbref, String)>,
}

impl Outbox {
    pub fn push(&mut self, player: Dbref, text: impl Into<String>) {
        self.msgs.push((player, text.into()));
    }

    pub fn drain(&mut self) -> Vec<(Dbref, String)> {
        std::mem::take(&mut self.msgs)
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    /// Everything queued for one recipient, in order.
    pub fn for_player(&self, player: Dbref) -> Vec<&str> {
        self.msgs
            .iter()
            .filter(|(d, _)| *d == player)
            .map(|(_, m)| m.as_str())
            .collect()
    }
}

pub fn notify(game: &mut Game, player: Dbref, text: impl Into<String>) {
    game.outbox.push(player, text);
}

/// Deliver to everything in `room`'s contents except the listed dbrefs.
pub fn notify_except(game: &mut Game, room: Dbref, exclude: &[Dbref], text: &str) {
    let members = game.world.db.list_members(game.world.db.contents(room));
    for d in members {
        if !exclude.contains(&d) {
            game.outbox.push(d, text.to_string());
        }
    }
}

/// Deliver to everything in the room, the room itself included when it
/// listens; the plain broadcast used by say/pose.
pub fn notify_all(game: &mut Game, room: Dbref, text: &str) {
    notify_except(game, room, &[], text);
}

#[cfg(test)]
mod test {
    use super::*;
    use common::config::MuxConfig;
    use world::ObjectType;

    #[test]
    fn test_notify_except() {
        let mut g = Game::new_in_memory(MuxConfig::default());
        g.bootstrap().unwrap();
        let alice = g
            .world
            .create_object(ObjectType::Player, world::NOTHING, "Alice")
            .unwrap();
        g.world.db.add_contents(0, alice);

        notify_except(&mut g, 0, &[1], "something happens");
        let msgs = g.outbox.drain();
        assert_eq!(msgs, vec![(alice, "something happens".to_string())]);
    }
}
