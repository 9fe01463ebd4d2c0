//! Object matching: turn the text a user typed into a dbref, looking at
//! self, the local neighborhood, exits, and absolute/player references.

use common::strings::strip_color;
use world::{Dbref, ObjectType, AMBIGUOUS, HOME, NOTHING};

use crate::game::{Ctx, Game};
use crate::wild::wild_match;

/// One exit name matches when any semicolon segment matches.
pub fn exit_name_matches(name: &str, typed: &str) -> bool {
    strip_color(name)
        .split(';')
        .any(|seg| !seg.is_empty() && seg.eq_ignore_ascii_case(typed))
}

/// Exact (case-insensitive) matches outrank prefix matches; two hits
/// at the same rank are ambiguous.
fn match_list(game: &mut Game, head: Dbref, typed: &str) -> Dbref {
    let mut exact = NOTHING;
    let mut partial = NOTHING;
    let mut exact_dup = false;
    let mut partial_dup = false;
    for d in game.world.db.list_members(head) {
        let name = strip_color(game.world.db.name(d));
        if name.eq_ignore_ascii_case(typed) {
            if exact != NOTHING && exact != d {
                exact_dup = true;
            }
            exact = d;
        } else if wild_match(&format!("{}*", typed), &name) {
            if partial != NOTHING && partial != d {
                partial_dup = true;
            }
            partial = d;
        }
    }
    if exact != NOTHING {
        if exact_dup {
            return AMBIGUOUS;
        }
        return exact;
    }
    if partial_dup {
        return AMBIGUOUS;
    }
    partial
}

/// Resolve `typed` relative to `who`: keywords, #dbref, *player, own
/// inventory, then the location's contents and exits.
pub fn match_thing(game: &mut Game, ctx: &Ctx, typed: &str) -> Dbref {
    let typed = typed.trim();
    if typed.is_empty() {
        return NOTHING;
    }
    let who = ctx.executor;

    match typed.to_ascii_lowercase().as_str() {
        "me" => return who,
        "here" => return game.world.db.location(who),
        "home" => return HOME,
        _ => {}
    }

    if let Some(num) = typed.strip_prefix('#') {
        return match num.parse::<Dbref>() {
            Ok(d) if game.world.db.good(d) => d,
            _ => NOTHING,
        };
    }

    if let Some(pname) = typed.strip_prefix('*') {
        return lookup_player(game, pname);
    }

    let inv = match_list(game, game.world.db.contents(who), typed);
    if inv == AMBIGUOUS {
        return AMBIGUOUS;
    }

    let loc = game.world.db.location(who);
    let near = if loc != NOTHING {
        match_list(game, game.world.db.contents(loc), typed)
    } else {
        NOTHING
    };
    if near == AMBIGUOUS {
        return AMBIGUOUS;
    }

    if inv != NOTHING && near != NOTHING && inv != near {
        return AMBIGUOUS;
    }
    if inv != NOTHING {
        return inv;
    }
    if near != NOTHING {
        return near;
    }

    if loc != NOTHING {
        for e in game.world.db.list_members(game.world.db.exits(loc)) {
            if exit_name_matches(game.world.db.name(e), typed) {
                return e;
            }
        }
    }

    NOTHING
}

/// Player lookup by exact name across the table.
pub fn lookup_player(game: &mut Game, name: &str) -> Dbref {
    let name = name.trim();
    for d in 0..game.world.db.db_top() {
        if game.world.db.kind(d) == ObjectType::Player
            && strip_color(game.world.db.name(d)).eq_ignore_ascii_case(name)
        {
            return d;
        }
    }
    NOTHING
}

/// `obj/attr` splitting for @wait, @trigger, locks.
pub fn parse_thing_slash_attr<'a>(typed: &'a str) -> (&'a str, Option<&'a str>) {
    match typed.split_once('/') {
        Some((obj, attr)) => (obj.trim(), Some(attr.trim())),
        None => (typed.trim(), None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::config::MuxConfig;

    fn game() -> (Game, Dbref, Dbref) {
        let mut g = Game::new_in_memory(MuxConfig::default());
        g.bootstrap().unwrap();
        (g, 0, 1)
    }

    #[test]
    fn test_keywords_and_absolute() {
        let (mut g, room, god) = game();
        let ctx = Ctx::acting_alone(god);
        assert_eq!(match_thing(&mut g, &ctx, "me"), god);
        assert_eq!(match_thing(&mut g, &ctx, "here"), room);
        assert_eq!(match_thing(&mut g, &ctx, "home"), HOME);
        assert_eq!(match_thing(&mut g, &ctx, "#0"), room);
        assert_eq!(match_thing(&mut g, &ctx, "#99"), NOTHING);
    }

    #[test]
    fn test_neighborhood_and_inventory() {
        let (mut g, room, god) = game();
        let ctx = Ctx::acting_alone(god);
        let rock = g
            .world
            .create_object(ObjectType::Thing, god, "Rock")
            .unwrap();
        g.world.db.add_contents(room, rock);
        let coin = g
            .world
            .create_object(ObjectType::Thing, god, "Coin")
            .unwrap();
        g.world.db.add_contents(god, coin);

        assert_eq!(match_thing(&mut g, &ctx, "rock"), rock);
        assert_eq!(match_thing(&mut g, &ctx, "coin"), coin);
        assert_eq!(match_thing(&mut g, &ctx, "Ro"), rock);
        assert_eq!(match_thing(&mut g, &ctx, "nothing here"), NOTHING);
    }

    #[test]
    fn test_ambiguous() {
        let (mut g, room, god) = game();
        let ctx = Ctx::acting_alone(god);
        for _ in 0..2 {
            let r = g
                .world
                .create_object(ObjectType::Thing, god, "Rock")
                .unwrap();
            g.world.db.add_contents(room, r);
        }
        assert_eq!(match_thing(&mut g, &ctx, "rock"), AMBIGUOUS);
    }

    #[test]
    fn test_player_star() {
        let (mut g, _room, god) = game();
        let ctx = Ctx::acting_alone(god);
        assert_eq!(match_thing(&mut g, &ctx, "*God"), god);
        assert_eq!(match_thing(&mut g, &ctx, "*Nobody"), NOTHING);
    }

    #[test]
    fn test_exit_segments() {
        assert!(exit_name_matches("North;n;no", "n"));
        assert!(exit_name_matches("North;n;no", "NORTH"));
        assert!(!exit_name_matches("North;n;no", "s"));
    }

    #[test]
    fn test_thing_slash_attr() {
        assert_eq!(parse_thing_slash_attr("obj/attr"), ("obj", Some("attr")));
        assert_eq!(parse_thing_slash_attr("obj"), ("obj", None));
    }
}
