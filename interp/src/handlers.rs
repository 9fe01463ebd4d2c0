//! Built-in command handlers. Each receives the raw invocation pieces
//! and evaluates exactly what its semantics call for.

use tracing::{error, info};

use world::attr::{
    AttrFlags, AttrNum, AttrValue, A_ADROP, A_AFAIL, A_ASUCC, A_DESC, A_DROP, A_FAIL, A_LOCK,
    A_ODROP, A_OFAIL, A_OSUCC, A_SEMAPHORE, A_SUCC,
};
use world::quota::{add_quota, canpayfees, grant_quota, ok_password, FeeShortfall};
use world::{flatfile, Dbref, ObjFlags, ObjectType, AMBIGUOUS, NOTHING};

use crate::boolexp::could_doit;
use crate::command::{parse_action_list, process_command, CmdInvocation};
use crate::eval::{eval_str, EvalFlags, EvalState};
use crate::game::{Ctx, Game};
use crate::matcher::{lookup_player, match_thing, parse_thing_slash_attr};
use crate::notify::{notify, notify_except, AMBIGUOUS_MESSAGE, NOMATCH_MESSAGE, NOPERM_MESSAGE};

// -- shared helpers --------------------------------------------------------

pub fn eval_text(game: &mut Game, ctx: &Ctx, text: &str) -> String {
    let limits = game.world.cfg.limits.clone();
    let regs = game.regs.clone();
    let mut st = EvalState::new(&limits, regs);
    let out = eval_str(
        game,
        ctx,
        &mut st,
        EvalFlags::FCHECK | EvalFlags::EVAL | EvalFlags::TOP,
        text,
        &[],
    );
    game.regs = st.regs;
    out
}

fn match_or_notify(game: &mut Game, ctx: &Ctx, typed: &str) -> Option<Dbref> {
    match match_thing(game, ctx, typed) {
        AMBIGUOUS => {
            notify(game, ctx.executor, AMBIGUOUS_MESSAGE);
            None
        }
        d if !game.world.db.good(d) => {
            notify(game, ctx.executor, NOMATCH_MESSAGE);
            None
        }
        d => Some(d),
    }
}

fn controls_or_notify(game: &mut Game, ctx: &Ctx, thing: Dbref) -> bool {
    if game.world.db.controls(ctx.executor, thing) {
        true
    } else {
        notify(game, ctx.executor, NOPERM_MESSAGE);
        false
    }
}

fn resolve_attr_num(game: &mut Game, name: &str) -> Option<AttrNum> {
    if let Some(def) = game.world.attrs.catalog().atr_str(name) {
        return Some(def.num);
    }
    game.world.attrs.catalog_mut().mkattr(name).ok()
}

/// The attribute-message triple: show `what` to the enactor, `owhat` to
/// bystanders behind the enactor's name, queue `awhat` as an action
/// list on `thing`.
pub fn did_it(
    game: &mut Game,
    ctx: &Ctx,
    thing: Dbref,
    what: AttrNum,
    what_default: Option<&str>,
    owhat: AttrNum,
    awhat: AttrNum,
) {
    let player = ctx.executor;
    let eval_ctx = Ctx {
        executor: thing,
        caller: player,
        enactor: player,
    };

    let (v, _) = game.world.atr_pget(thing, what);
    if !v.text.is_empty() {
        let msg = eval_text(game, &eval_ctx, &v.text);
        notify(game, player, msg);
    } else if let Some(def) = what_default {
        notify(game, player, def.to_string());
    }

    let (ov, _) = game.world.atr_pget(thing, owhat);
    if !ov.text.is_empty() {
        let msg = eval_text(game, &eval_ctx, &ov.text);
        let loc = game.world.db.location(player);
        if loc != NOTHING {
            let line = format!("{} {}", game.world.db.name(player), msg);
            notify_except(game, loc, &[player], &line);
        }
    }

    let (av, _) = game.world.atr_pget(thing, awhat);
    if !av.text.is_empty() {
        let now = game.now;
        let regs = game.regs.clone();
        let owner = game.world.db.owner(thing);
        let _ = game
            .queue
            .enqueue_wait(now, now, eval_ctx, owner, av.text, vec![], regs);
    }
}

// -- speech ----------------------------------------------------------------

pub fn do_say(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let msg = eval_text(game, ctx, &inv.arg);
    let loc = game.world.db.location(ctx.executor);
    notify(game, ctx.executor, format!("You say, \"{}\"", msg));
    if loc != NOTHING {
        let line = format!("{} says, \"{}\"", game.world.db.name(ctx.executor), msg);
        notify_except(game, loc, &[ctx.executor], &line);
    }
}

pub fn do_pose(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let msg = eval_text(game, ctx, &inv.arg);
    let loc = game.world.db.location(ctx.executor);
    let sep = if inv.switches.iter().any(|s| s == "nospace") {
        ""
    } else {
        " "
    };
    let line = format!("{}{}{}", game.world.db.name(ctx.executor), sep, msg);
    if loc != NOTHING {
        notify_except(game, loc, &[], &line);
    } else {
        notify(game, ctx.executor, line);
    }
}

pub fn do_think(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let msg = eval_text(game, ctx, &inv.arg);
    notify(game, ctx.executor, msg);
}

// -- looking ---------------------------------------------------------------

pub fn do_look(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let target = if inv.arg.is_empty() {
        game.world.db.location(ctx.executor)
    } else {
        match match_or_notify(game, ctx, &inv.arg) {
            Some(d) => d,
            None => return,
        }
    };
    if !game.world.db.good(target) {
        notify(game, ctx.executor, NOMATCH_MESSAGE);
        return;
    }

    notify(game, ctx.executor, game.world.db.name(target).to_string());

    let (desc, _) = game.world.atr_pget(target, A_DESC);
    if !desc.text.is_empty() {
        let eval_ctx = Ctx {
            executor: target,
            caller: ctx.executor,
            enactor: ctx.executor,
        };
        let rendered = eval_text(game, &eval_ctx, &desc.text);
        notify(game, ctx.executor, rendered);
    }

    let can_see_loc = !game.world.db.has_flag(target, ObjFlags::DARK);
    let visible: Vec<String> = game
        .world
        .db
        .list_members(game.world.db.contents(target))
        .into_iter()
        .filter(|&c| game.world.db.can_see(ctx.executor, c, can_see_loc))
        .map(|c| game.world.db.name(c).to_string())
        .collect();
    if !visible.is_empty() {
        notify(game, ctx.executor, "Contents:".to_string());
        for name in visible {
            notify(game, ctx.executor, name);
        }
    }

    let exits: Vec<String> = game
        .world
        .db
        .list_members(game.world.db.exits(target))
        .into_iter()
        .map(|e| {
            game.world
                .db
                .name(e)
                .split(';')
                .next()
                .unwrap_or("")
                .to_string()
        })
        .collect();
    if !exits.is_empty() {
        notify(game, ctx.executor, format!("Obvious exits: {}", exits.join("  ")));
    }
}

// -- movement and possession -----------------------------------------------

pub fn do_move_via_exit(game: &mut Game, ctx: &Ctx, exit: Dbref) {
    if could_doit(game, ctx.executor, exit, A_LOCK) {
        did_it(game, ctx, exit, A_SUCC, None, A_OSUCC, A_ASUCC);
        let dest = game.world.db.fetch(exit).map(|o| o.home).unwrap_or(NOTHING);
        if game.world.db.good(dest) {
            game.world.db.move_object(ctx.executor, dest);
            do_look(game, ctx, &CmdInvocation::default());
        } else {
            notify(game, ctx.executor, "That exit doesn't lead anywhere.");
        }
    } else {
        did_it(
            game,
            ctx,
            exit,
            A_FAIL,
            Some("You can't go that way."),
            A_OFAIL,
            A_AFAIL,
        );
    }
}

pub fn do_get(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(thing) = match_or_notify(game, ctx, &inv.arg) else {
        return;
    };
    if game.world.db.location(thing) == ctx.executor {
        notify(game, ctx.executor, "You already have that!");
        return;
    }
    if thing == ctx.executor || !game.world.db.nearby(ctx.executor, thing) {
        notify(game, ctx.executor, NOMATCH_MESSAGE);
        return;
    }
    match game.world.db.kind(thing) {
        ObjectType::Exit | ObjectType::Room => {
            notify(game, ctx.executor, "You can't pick that up.");
            return;
        }
        _ => {}
    }

    if could_doit(game, ctx.executor, thing, A_LOCK) {
        game.world.db.move_object(thing, ctx.executor);
        did_it(game, ctx, thing, A_SUCC, Some("Taken."), A_OSUCC, A_ASUCC);
    } else {
        did_it(
            game,
            ctx,
            thing,
            A_FAIL,
            Some("You can't pick that up."),
            A_OFAIL,
            A_AFAIL,
        );
    }
}

pub fn do_drop(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(thing) = match_or_notify(game, ctx, &inv.arg) else {
        return;
    };
    if game.world.db.location(thing) != ctx.executor {
        notify(game, ctx.executor, "You don't have that!");
        return;
    }
    let loc = game.world.db.location(ctx.executor);
    if loc == NOTHING {
        notify(game, ctx.executor, "You can't drop that here.");
        return;
    }
    game.world.db.move_object(thing, loc);
    did_it(game, ctx, thing, A_DROP, Some("Dropped."), A_ODROP, A_ADROP);
}

pub fn do_give(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(recipient) = match_or_notify(game, ctx, &inv.lhs) else {
        return;
    };
    let amount: i32 = match eval_text(game, ctx, &inv.rhs).trim().parse() {
        Ok(n) if n > 0 => n,
        _ => {
            notify(game, ctx.executor, "You must specify a positive amount.");
            return;
        }
    };
    if !world::quota::payfor(&mut game.world, ctx.executor, amount) {
        notify(game, ctx.executor, "You don't have that much to give!");
        return;
    }
    world::quota::giveto(&mut game.world, recipient, amount);
    notify(game, ctx.executor, "Given.");
    let giver = game.world.db.name(ctx.executor).to_string();
    let owner = game.world.db.owner(recipient);
    notify(
        game,
        owner,
        format!("{} gives you {} pennies.", giver, amount),
    );
}

// -- building --------------------------------------------------------------

fn charge_or_notify(game: &mut Game, ctx: &Ctx, pennies: i32, quota: i32) -> bool {
    match canpayfees(&mut game.world, ctx.executor, pennies, quota) {
        Ok(()) => true,
        Err(FeeShortfall::Money) => {
            notify(game, ctx.executor, "Sorry, you don't have enough money.");
            false
        }
        Err(FeeShortfall::Quota) => {
            notify(game, ctx.executor, "Sorry, your building quota has run out.");
            false
        }
    }
}

pub fn do_create(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    if inv.arg.is_empty() {
        notify(game, ctx.executor, "Create what?");
        return;
    }
    let cost = game.world.cfg.costs.create_cost;
    if !charge_or_notify(game, ctx, cost, 1) {
        return;
    }
    let owner = game.world.db.owner(ctx.executor);
    match game.world.create_object(ObjectType::Thing, owner, &inv.arg) {
        Ok(d) => {
            let home = game.world.db.location(ctx.executor);
            if let Some(o) = game.world.db.fetch_mut(d) {
                o.home = home;
            }
            game.world.db.add_contents(ctx.executor, d);
            info!(dbref = d, by = ctx.executor, "thing created");
            let name = game.world.db.name(d).to_string();
            notify(
                game,
                ctx.executor,
                format!("{} created as object #{}.", name, d),
            );
        }
        Err(msg) => notify(game, ctx.executor, msg),
    }
}

pub fn do_dig(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    if inv.lhs.is_empty() {
        notify(game, ctx.executor, "Dig what?");
        return;
    }
    let cost = game.world.cfg.costs.dig_cost;
    if !charge_or_notify(game, ctx, cost, 1) {
        return;
    }
    let owner = game.world.db.owner(ctx.executor);
    match game.world.create_object(ObjectType::Room, owner, &inv.lhs) {
        Ok(d) => {
            let name = game.world.db.name(d).to_string();
            notify(
                game,
                ctx.executor,
                format!("{} created with room number #{}.", name, d),
            );
        }
        Err(msg) => notify(game, ctx.executor, msg),
    }
}

pub fn do_open(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let room = game.world.db.location(ctx.executor);
    if game.world.db.kind(room) != ObjectType::Room {
        notify(game, ctx.executor, "You can only open exits in rooms.");
        return;
    }
    if !controls_or_notify(game, ctx, room) {
        return;
    }
    if inv.lhs.is_empty() {
        notify(game, ctx.executor, "Open which direction?");
        return;
    }
    let cost = game.world.cfg.costs.open_cost;
    if !charge_or_notify(game, ctx, cost, 1) {
        return;
    }
    let owner = game.world.db.owner(ctx.executor);
    match game.world.create_object(ObjectType::Exit, owner, &inv.lhs) {
        Ok(exit) => {
            game.world.db.add_exit(room, exit);
            if !inv.rhs.is_empty() {
                if let Some(dest) = match_or_notify(game, ctx, &inv.rhs) {
                    if let Some(o) = game.world.db.fetch_mut(exit) {
                        o.home = dest;
                    }
                }
            }
            notify(game, ctx.executor, "Opened.");
        }
        Err(msg) => notify(game, ctx.executor, msg),
    }
}

pub fn do_destroy(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(thing) = match_or_notify(game, ctx, &inv.arg) else {
        return;
    };
    if !controls_or_notify(game, ctx, thing) {
        return;
    }
    if game.world.db.kind(thing) == ObjectType::Player {
        notify(game, ctx.executor, "Players cannot be destroyed this way.");
        return;
    }
    if game.world.db.has_flag(thing, ObjFlags::SAFE) {
        notify(game, ctx.executor, "That object is protected.");
        return;
    }
    game.queue.halt(thing);
    let name = game.world.db.name(thing).to_string();
    game.world.destroy_object(thing);
    add_quota(&mut game.world, ctx.executor, 1);
    notify(game, ctx.executor, format!("{} destroyed.", name));
}

pub fn do_name(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(thing) = match_or_notify(game, ctx, &inv.lhs) else {
        return;
    };
    if !controls_or_notify(game, ctx, thing) {
        return;
    }
    let valid = match game.world.db.kind(thing) {
        ObjectType::Exit => common::strings::make_canonical_exit_name(&inv.rhs),
        ObjectType::Player => {
            let limits = game.world.cfg.limits.player_name_limit;
            let spaces = game.world.cfg.toggles.name_spaces;
            if common::strings::validate_player_name(&inv.rhs, limits, spaces)
                && lookup_player(game, &inv.rhs) == NOTHING
            {
                Some(inv.rhs.clone())
            } else {
                None
            }
        }
        _ => common::strings::make_canonical_object_name(&inv.rhs),
    };
    match valid {
        Some(name) => {
            game.world.set_name(thing, &name);
            notify(game, ctx.executor, "Name set.");
        }
        None => notify(game, ctx.executor, "That's a silly name!"),
    }
}

pub fn do_set(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(thing) = match_or_notify(game, ctx, &inv.lhs) else {
        return;
    };
    if !controls_or_notify(game, ctx, thing) {
        return;
    }
    let (clear, flag_name) = match inv.rhs.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, inv.rhs.as_str()),
    };
    let Some(flag) = ObjFlags::by_name(flag_name) else {
        notify(game, ctx.executor, "I don't understand that flag.");
        return;
    };
    if flag == ObjFlags::WIZARD && !game.world.db.is_god(ctx.executor) {
        notify(game, ctx.executor, NOPERM_MESSAGE);
        return;
    }
    game.world.db.set_flag(thing, flag, !clear);
    notify(game, ctx.executor, if clear { "Cleared." } else { "Set." });
}

/// `&ATTR obj=value`. The value is stored raw; evaluation happens on
/// read.
pub fn do_attr_set(game: &mut Game, ctx: &Ctx, rest: &str) {
    let (attr_name, remainder) = match rest.split_once(char::is_whitespace) {
        Some((a, r)) => (a, r),
        None => {
            notify(game, ctx.executor, "Set what attribute?");
            return;
        }
    };
    let (obj_part, value) = match remainder.split_once('=') {
        Some((o, v)) => (o.trim(), v),
        None => {
            notify(game, ctx.executor, "Set it on what?");
            return;
        }
    };
    let Some(thing) = match_or_notify(game, ctx, obj_part) else {
        return;
    };
    let Some(num) = resolve_attr_num(game, attr_name) else {
        notify(game, ctx.executor, "That's not a valid attribute name.");
        return;
    };
    match game.world.atr_set(ctx.executor, thing, num, value) {
        Ok(()) => notify(
            game,
            ctx.executor,
            if value.is_empty() { "Cleared." } else { "Set." },
        ),
        Err(_) => notify(game, ctx.executor, NOPERM_MESSAGE),
    }
}

// -- locks -----------------------------------------------------------------

pub fn do_lock(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let (obj_part, attr_part) = parse_thing_slash_attr(&inv.lhs);
    let Some(thing) = match_or_notify(game, ctx, obj_part) else {
        return;
    };

    if let Some(attr_name) = attr_part {
        // @lock obj/attr: protect the attribute value itself.
        let Some(num) = resolve_attr_num(game, attr_name) else {
            notify(game, ctx.executor, "No such attribute.");
            return;
        };
        if !game.world.can_lock_attr(ctx.executor, thing, num) {
            notify(game, ctx.executor, NOPERM_MESSAGE);
            return;
        }
        let mut v = game.world.atr_get(thing, num);
        v.flags |= AttrFlags::LOCKED;
        game.world.atr_set_raw(thing, num, v);
        notify(game, ctx.executor, "Attribute locked.");
        return;
    }

    if !controls_or_notify(game, ctx, thing) {
        return;
    }
    if inv.rhs.is_empty() {
        notify(game, ctx.executor, "Lock against what?");
        return;
    }
    // References in the key resolve relative to the locker, here and
    // now; the stored form is canonical #dbref text.
    let Some(exp) = crate::boolexp::parse_boolexp_strict(game, ctx, &inv.rhs) else {
        notify(game, ctx.executor, "I don't understand that key.");
        return;
    };
    let canonical = crate::boolexp::unparse_boolexp(game, &exp);
    let owner = game.world.db.owner(ctx.executor);
    game.world.atr_set_raw(
        thing,
        A_LOCK,
        AttrValue::new(canonical, owner, AttrFlags::IS_LOCK),
    );
    notify(game, ctx.executor, "Locked.");
}

pub fn do_unlock(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let (obj_part, attr_part) = parse_thing_slash_attr(&inv.arg);
    let Some(thing) = match_or_notify(game, ctx, obj_part) else {
        return;
    };

    if let Some(attr_name) = attr_part {
        let Some(num) = resolve_attr_num(game, attr_name) else {
            notify(game, ctx.executor, "No such attribute.");
            return;
        };
        if !game.world.can_lock_attr(ctx.executor, thing, num) {
            notify(game, ctx.executor, NOPERM_MESSAGE);
            return;
        }
        let mut v = game.world.atr_get(thing, num);
        v.flags.remove(AttrFlags::LOCKED);
        game.world.atr_set_raw(thing, num, v);
        notify(game, ctx.executor, "Attribute unlocked.");
        return;
    }

    if !controls_or_notify(game, ctx, thing) {
        return;
    }
    game.world.atr_set_raw(thing, A_LOCK, AttrValue::empty());
    notify(game, ctx.executor, "Unlocked.");
}

// -- relationships ---------------------------------------------------------

pub fn do_parent(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(thing) = match_or_notify(game, ctx, &inv.lhs) else {
        return;
    };
    if !controls_or_notify(game, ctx, thing) {
        return;
    }
    let parent = if inv.rhs.is_empty() {
        NOTHING
    } else {
        match match_or_notify(game, ctx, &inv.rhs) {
            Some(d) => d,
            None => return,
        }
    };
    match game.world.db.set_parent(thing, parent) {
        Ok(()) => notify(
            game,
            ctx.executor,
            if parent == NOTHING {
                "Parent cleared."
            } else {
                "Parent set."
            },
        ),
        Err(()) => notify(game, ctx.executor, "Unreasonable parent."),
    }
}

pub fn do_chown(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(thing) = match_or_notify(game, ctx, &inv.lhs) else {
        return;
    };
    let Some(new_owner) = match_or_notify(game, ctx, &inv.rhs) else {
        return;
    };
    if game.world.db.kind(new_owner) != ObjectType::Player {
        notify(game, ctx.executor, "Owners must be players.");
        return;
    }
    if !game.world.db.wizard(ctx.executor) && !game.world.db.controls(ctx.executor, thing) {
        notify(game, ctx.executor, NOPERM_MESSAGE);
        return;
    }
    if let Some(o) = game.world.db.fetch_mut(thing) {
        o.owner = new_owner;
    }
    game.world.db.touch(thing);
    notify(game, ctx.executor, "Owner changed.");
}

// -- the queue -------------------------------------------------------------

fn sem_count(game: &mut Game, obj: Dbref, attr: AttrNum) -> i64 {
    game.world.atr_get(obj, attr).text.trim().parse().unwrap_or(0)
}

fn set_sem_count(game: &mut Game, obj: Dbref, attr: AttrNum, count: i64) {
    let owner = game.world.db.owner(obj);
    let value = if count == 0 {
        AttrValue::empty()
    } else {
        AttrValue::new(count.to_string(), owner, AttrFlags::empty())
    };
    game.world.atr_set_raw(obj, attr, value);
}

pub fn do_wait(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    if inv.rhs.is_empty() {
        notify(game, ctx.executor, "Wait for what?");
        return;
    }
    let owner = game.world.db.owner(ctx.executor);
    let regs = game.regs.clone();
    let now = game.now;

    let head = eval_text(game, ctx, &inv.lhs);
    if let Ok(secs) = head.trim().parse::<i64>() {
        let result = game.queue.enqueue_wait(
            now,
            now + secs.max(0),
            *ctx,
            owner,
            inv.rhs.clone(),
            vec![],
            regs,
        );
        if result.is_err() {
            notify(game, ctx.executor, "Queue overflow.");
        }
        return;
    }

    // Semaphore form: @wait obj[/attr]=command.
    let (obj_part, attr_part) = parse_thing_slash_attr(&inv.lhs);
    let Some(obj) = match_or_notify(game, ctx, obj_part) else {
        return;
    };
    let attr = match attr_part {
        Some(name) => match resolve_attr_num(game, name) {
            Some(n) => n,
            None => {
                notify(game, ctx.executor, "That's not a valid attribute name.");
                return;
            }
        },
        None => A_SEMAPHORE,
    };

    let count = sem_count(game, obj, attr);
    set_sem_count(game, obj, attr, count - 1);
    let result = if count > 0 {
        // A notify is already pending; fire immediately.
        game.queue
            .enqueue_wait(now, now, *ctx, owner, inv.rhs.clone(), vec![], regs)
    } else {
        game.queue
            .enqueue_sem(obj, attr, *ctx, owner, inv.rhs.clone(), vec![], regs)
    };
    if result.is_err() {
        set_sem_count(game, obj, attr, count);
        notify(game, ctx.executor, "Queue overflow.");
    }
}

pub fn do_trigger(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let (obj_part, attr_part) = parse_thing_slash_attr(&inv.lhs);
    let Some(attr_name) = attr_part else {
        notify(game, ctx.executor, "Usage: @trigger obj/attr[=args].");
        return;
    };
    let Some(thing) = match_or_notify(game, ctx, obj_part) else {
        return;
    };
    if !controls_or_notify(game, ctx, thing) {
        return;
    }
    let Some(num) = game.world.attrs.catalog().atr_str(attr_name).map(|d| d.num) else {
        notify(game, ctx.executor, "No such attribute.");
        return;
    };
    let text = game.world.atr_get(thing, num).text;
    if text.is_empty() {
        notify(game, ctx.executor, "No such attribute.");
        return;
    }

    let args: Vec<String> = if inv.rhs.is_empty() {
        vec![]
    } else {
        inv.rhs
            .split(',')
            .map(|a| {
                let trimmed = a.trim().to_string();
                eval_text(game, ctx, &trimmed)
            })
            .collect()
    };

    let tctx = Ctx {
        executor: thing,
        caller: ctx.executor,
        enactor: ctx.executor,
    };
    let now = game.now;
    let regs = game.regs.clone();
    let owner = game.world.db.owner(thing);
    match game.queue.enqueue_wait(now, now, tctx, owner, text, args, regs) {
        Ok(_) => {
            if !game.world.db.has_flag(ctx.executor, ObjFlags::QUIET) {
                notify(game, ctx.executor, "Triggered.");
            }
        }
        Err(_) => notify(game, ctx.executor, "Queue overflow."),
    }
}

pub fn do_notify(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let (obj_part, attr_part) = parse_thing_slash_attr(&inv.lhs);
    let Some(obj) = match_or_notify(game, ctx, obj_part) else {
        return;
    };
    if !controls_or_notify(game, ctx, obj) {
        return;
    }
    let attr = match attr_part {
        Some(name) => match game.world.attrs.catalog().atr_str(name).map(|d| d.num) {
            Some(n) => n,
            None => {
                notify(game, ctx.executor, "No such attribute.");
                return;
            }
        },
        None => A_SEMAPHORE,
    };

    let all = inv.switches.iter().any(|s| s == "all");
    let count = sem_count(game, obj, attr);
    if all {
        game.queue.notify_sem(obj, attr, true);
        set_sem_count(game, obj, attr, 0);
    } else {
        // Releasing a waiter and banking a pending notify both raise
        // the stored count by one.
        game.queue.notify_sem(obj, attr, false);
        set_sem_count(game, obj, attr, count + 1);
    }
    if !inv.switches.iter().any(|s| s == "quiet") {
        notify(game, ctx.executor, "Notified.");
    }
}

pub fn do_drain(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let (obj_part, attr_part) = parse_thing_slash_attr(&inv.arg);
    let Some(obj) = match_or_notify(game, ctx, obj_part) else {
        return;
    };
    if !controls_or_notify(game, ctx, obj) {
        return;
    }
    let attr = match attr_part {
        Some(name) => match game.world.attrs.catalog().atr_str(name).map(|d| d.num) {
            Some(n) => n,
            None => {
                notify(game, ctx.executor, "No such attribute.");
                return;
            }
        },
        None => A_SEMAPHORE,
    };
    let n = game.queue.drain_sem(obj, attr);
    set_sem_count(game, obj, attr, 0);
    notify(game, ctx.executor, format!("Drained {} entries.", n));
}

pub fn do_halt(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let target = if inv.arg.is_empty() {
        ctx.executor
    } else {
        match match_or_notify(game, ctx, &inv.arg) {
            Some(d) => d,
            None => return,
        }
    };
    if target != ctx.executor && !controls_or_notify(game, ctx, target) {
        return;
    }
    let n = game.queue.halt(target);
    notify(game, ctx.executor, format!("Halted {} queue entries.", n));
}

pub fn do_ps(game: &mut Game, ctx: &Ctx, _inv: &CmdInvocation) {
    let privileged = game.world.db.wizard(ctx.executor)
        || game.world.db.has_power(ctx.executor, world::Powers::SEE_QUEUE);
    let own = game.world.db.owner(ctx.executor);
    let now = game.now;
    let lines: Vec<String> = game
        .queue
        .ps()
        .into_iter()
        .filter(|l| privileged || game.world.db.owner(l.executor) == own)
        .map(|l| {
            let who = game.world.db.name(l.executor).to_string();
            match l.state {
                crate::queue::PsState::Immediate => {
                    format!("[{}] {}: {}", l.seq, who, l.text)
                }
                crate::queue::PsState::Timed => {
                    format!("[{}] {}: {} (in {}s)", l.seq, who, l.text, l.ready - now)
                }
                crate::queue::PsState::Semaphore(obj, attr) => {
                    format!("[{}] {}: {} (semaphore #{}/{})", l.seq, who, l.text, obj, attr)
                }
            }
        })
        .collect();
    let total = lines.len();
    for line in lines {
        notify(game, ctx.executor, line);
    }
    notify(game, ctx.executor, format!("{} queue entries.", total));
}

pub fn do_force(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let Some(victim) = match_or_notify(game, ctx, &inv.lhs) else {
        return;
    };
    if !controls_or_notify(game, ctx, victim) {
        return;
    }
    let fctx = Ctx {
        executor: victim,
        caller: ctx.executor,
        enactor: ctx.executor,
    };
    for cmd in parse_action_list(&inv.rhs) {
        process_command(game, &fctx, &cmd);
    }
}

// -- user-added commands ---------------------------------------------------

pub fn do_addcommand(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    let (obj_part, attr_part) = parse_thing_slash_attr(&inv.rhs);
    let Some(attr_name) = attr_part else {
        notify(game, ctx.executor, "Usage: @addcommand name=obj/attr.");
        return;
    };
    if inv.lhs.is_empty() {
        notify(game, ctx.executor, "Add which command?");
        return;
    }
    let Some(thing) = match_or_notify(game, ctx, obj_part) else {
        return;
    };
    let Some(num) = resolve_attr_num(game, attr_name) else {
        notify(game, ctx.executor, "That's not a valid attribute name.");
        return;
    };
    game.commands.add_command(&inv.lhs, thing, num);
    notify(
        game,
        ctx.executor,
        format!("Command {} added.", inv.lhs.to_ascii_lowercase()),
    );
}

pub fn do_delcommand(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    if inv.lhs.is_empty() {
        notify(game, ctx.executor, "Delete which command?");
        return;
    }
    let pair = if inv.rhs.is_empty() {
        None
    } else {
        let (obj_part, attr_part) = parse_thing_slash_attr(&inv.rhs);
        let Some(attr_name) = attr_part else {
            notify(game, ctx.executor, "Usage: @delcommand name[=obj/attr].");
            return;
        };
        let Some(thing) = match_or_notify(game, ctx, obj_part) else {
            return;
        };
        let Some(num) = game.world.attrs.catalog().atr_str(attr_name).map(|d| d.num) else {
            notify(game, ctx.executor, "No such attribute.");
            return;
        };
        Some((thing, num))
    };
    let removed = game.commands.del_command(&inv.lhs, pair);
    if removed > 0 {
        notify(game, ctx.executor, "Command removed.");
    } else {
        notify(game, ctx.executor, "No matching added command.");
    }
}

pub fn do_listcommands(game: &mut Game, ctx: &Ctx, _inv: &CmdInvocation) {
    let mut lines = Vec::new();
    for name in game.commands.names() {
        if let Some(entry) = game.commands.get(&name) {
            if entry.added.is_empty() {
                continue;
            }
            let bindings: Vec<String> = entry
                .added
                .iter()
                .map(|a| format!("#{}/{}", a.thing, a.attr))
                .collect();
            lines.push(format!("{}: {}", name, bindings.join(" ")));
        }
    }
    if lines.is_empty() {
        notify(game, ctx.executor, "No added commands.");
        return;
    }
    for line in lines {
        notify(game, ctx.executor, line);
    }
}

/// `@hook/before|after cmd=obj/attr` arms a hook point on a builtin;
/// `@hook/clear cmd` disarms both.
pub fn do_hook(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    use crate::command::CmdHook;

    let name = inv.lhs.to_ascii_lowercase();
    if game.commands.get(&name).is_none() {
        notify(game, ctx.executor, "No such command.");
        return;
    }

    if inv.switches.iter().any(|s| s == "clear") {
        if let Some(entry) = game.commands.get_mut(&name) {
            entry.hook_mask = CmdHook::empty();
            entry.hook_before = None;
            entry.hook_after = None;
        }
        notify(game, ctx.executor, "Hooks cleared.");
        return;
    }

    let before = inv.switches.iter().any(|s| s == "before");
    let after = inv.switches.iter().any(|s| s == "after");
    if !before && !after {
        notify(game, ctx.executor, "Specify /before, /after, or /clear.");
        return;
    }

    let (obj_part, attr_part) = parse_thing_slash_attr(&inv.rhs);
    let Some(attr_name) = attr_part else {
        notify(game, ctx.executor, "Usage: @hook/before command=obj/attr.");
        return;
    };
    let Some(thing) = match_or_notify(game, ctx, obj_part) else {
        return;
    };
    let Some(num) = resolve_attr_num(game, attr_name) else {
        notify(game, ctx.executor, "That's not a valid attribute name.");
        return;
    };

    let binding = crate::command::AddedCommand { thing, attr: num };
    if let Some(entry) = game.commands.get_mut(&name) {
        if before {
            entry.hook_mask |= CmdHook::BEFORE;
            entry.hook_before = Some(binding);
        }
        if after {
            entry.hook_mask |= CmdHook::AFTER;
            entry.hook_after = Some(binding);
        }
    }
    notify(game, ctx.executor, "Hooked.");
}

// -- administration --------------------------------------------------------

pub fn do_pcreate(game: &mut Game, ctx: &Ctx, inv: &CmdInvocation) {
    if let Err(msg) = ok_password(&inv.rhs) {
        notify(game, ctx.executor, msg);
        return;
    }
    if lookup_player(game, &inv.lhs) != NOTHING {
        notify(game, ctx.executor, "That name is already taken.");
        return;
    }
    match game.world.create_object(ObjectType::Player, NOTHING, &inv.lhs) {
        Ok(d) => {
            let money = game.world.cfg.costs.starting_money;
            let quota = game.world.cfg.costs.starting_quota;
            let loc = game.world.db.location(ctx.executor);
            if let Some(o) = game.world.db.fetch_mut(d) {
                o.pennies = money;
                o.home = loc;
            }
            if game.world.db.good(loc) {
                game.world.db.add_contents(loc, d);
            }
            grant_quota(&mut game.world, d, quota);
            info!(dbref = d, "player created");
            let name = game.world.db.name(d).to_string();
            notify(game, ctx.executor, format!("{} created as #{}.", name, d));
        }
        Err(msg) => notify(game, ctx.executor, msg),
    }
}

pub fn do_dump(game: &mut Game, ctx: &Ctx, _inv: &CmdInvocation) {
    notify(game, ctx.executor, "Dumping...");
    let path = game.world.cfg.base.outdb_path();
    match flatfile::dump(&mut game.world, &path) {
        Ok(()) => notify(game, ctx.executor, "Done."),
        Err(e) => {
            error!(error = %e, "checkpoint failed");
            notify(game, ctx.executor, format!("Dump failed: {}", e));
        }
    }
}

pub fn do_restart(game: &mut Game, ctx: &Ctx, _inv: &CmdInvocation) {
    notify(game, ctx.executor, "Server restarting...");
    game.restart_requested = true;
    game.running = false;
}

pub fn do_shutdown(game: &mut Game, ctx: &Ctx, _inv: &CmdInvocation) {
    notify(game, ctx.executor, "Shutting down...");
    game.running = false;
}
