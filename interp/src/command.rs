//! Command dispatch: the name-keyed entry table, prefix tokens, switch
//! parsing, user-added command bindings, and the queue execution loop.

use bitflags::bitflags;
use fnv::FnvHashMap;
use tracing::debug;

use world::attr::AttrNum;
use world::{Dbref, NOTHING};

use crate::game::{Ctx, Game};
use crate::handlers;
use crate::matcher::exit_name_matches;
use crate::notify::{notify, HUH_MESSAGE, NOPERM_MESSAGE};
use crate::queue::QueueEntry;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CmdPerm: u32 {
        const WIZARD = 0x1;
        const GOD    = 0x2;
    }
}

bitflags! {
    /// Which hook points are armed on an entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CmdHook: u32 {
        const BEFORE = 0x1;
        const AFTER  = 0x2;
    }
}

/// How the text after the command token is carved up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// No argument expected.
    None,
    /// Everything after the token, unparsed.
    One,
    /// Split once on `=` into lhs and rhs.
    Two,
}

pub type CmdHandler = fn(&mut Game, &Ctx, &CmdInvocation);

/// Parsed pieces handed to a handler. Text arrives raw; handlers
/// evaluate what their semantics call for.
#[derive(Debug, Default, Clone)]
pub struct CmdInvocation {
    pub switches: Vec<String>,
    pub arg: String,
    pub lhs: String,
    pub rhs: String,
}

#[derive(Debug, Clone, Copy)]
pub struct AddedCommand {
    pub thing: Dbref,
    pub attr: AttrNum,
}

#[derive(Debug, Clone)]
pub struct CmdEntry {
    pub name: String,
    pub switches: &'static [&'static str],
    pub perm: CmdPerm,
    pub shape: ArgShape,
    /// None for entries that exist only as user-added bindings.
    pub handler: Option<CmdHandler>,
    pub added: Vec<AddedCommand>,
    pub hook_mask: CmdHook,
    pub hook_before: Option<AddedCommand>,
    pub hook_after: Option<AddedCommand>,
}

#[derive(Debug, Default)]
pub struct CommandTable {
    entries: FnvHashMap<String, CmdEntry>,
}

macro_rules! cmd {
    ($table:expr, $name:literal, $perm:expr, $shape:expr, $handler:path) => {
        cmd!($table, $name, $perm, $shape, $handler, &[]);
    };
    ($table:expr, $name:literal, $perm:expr, $shape:expr, $handler:path, $switches:expr) => {
        $table.entries.insert(
            $name.to_string(),
            CmdEntry {
                name: $name.to_string(),
                switches: $switches,
                perm: $perm,
                shape: $shape,
                handler: Some($handler),
                added: Vec::new(),
                hook_mask: CmdHook::empty(),
                hook_before: ::std::option::Option::None,
                hook_after: ::std::option::Option::None,
            },
        );
    };
}

impl CommandTable {
    pub fn standard() -> Self {
        use ArgShape::*;
        let mut t = CommandTable::default();
        let none = CmdPerm::empty();
        let wiz = CmdPerm::WIZARD;

        cmd!(t, "say", none, One, handlers::do_say);
        cmd!(t, "pose", none, One, handlers::do_pose, &["nospace"]);
        cmd!(t, "think", none, One, handlers::do_think);
        cmd!(t, "look", none, One, handlers::do_look);
        cmd!(t, "get", none, One, handlers::do_get);
        cmd!(t, "take", none, One, handlers::do_get);
        cmd!(t, "drop", none, One, handlers::do_drop);
        cmd!(t, "give", none, Two, handlers::do_give);
        cmd!(t, "@create", none, One, handlers::do_create);
        cmd!(t, "@dig", none, Two, handlers::do_dig);
        cmd!(t, "@open", none, Two, handlers::do_open);
        cmd!(t, "@destroy", none, One, handlers::do_destroy);
        cmd!(t, "@name", none, Two, handlers::do_name);
        cmd!(t, "@set", none, Two, handlers::do_set);
        cmd!(t, "@lock", none, Two, handlers::do_lock);
        cmd!(t, "@unlock", none, One, handlers::do_unlock);
        cmd!(t, "@parent", none, Two, handlers::do_parent);
        cmd!(t, "@chown", none, Two, handlers::do_chown);
        cmd!(t, "@wait", none, Two, handlers::do_wait);
        cmd!(t, "@trigger", none, Two, handlers::do_trigger);
        cmd!(t, "@notify", none, Two, handlers::do_notify, &["all", "quiet"]);
        cmd!(t, "@drain", none, One, handlers::do_drain);
        cmd!(t, "@halt", none, One, handlers::do_halt);
        cmd!(t, "@ps", none, One, handlers::do_ps);
        cmd!(t, "@force", none, Two, handlers::do_force);
        cmd!(t, "@addcommand", wiz, Two, handlers::do_addcommand);
        cmd!(t, "@delcommand", wiz, Two, handlers::do_delcommand);
        cmd!(t, "@hook", wiz, Two, handlers::do_hook, &["before", "after", "clear"]);
        cmd!(t, "@listcommands", none, One, handlers::do_listcommands);
        cmd!(t, "@pcreate", wiz, Two, handlers::do_pcreate);
        cmd!(t, "@dump", wiz, None, handlers::do_dump);
        cmd!(t, "@restart", wiz, None, handlers::do_restart);
        cmd!(t, "@shutdown", wiz, None, handlers::do_shutdown);
        t
    }

    pub fn get(&self, name: &str) -> Option<&CmdEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CmdEntry> {
        self.entries.get_mut(name)
    }

    pub fn insert(&mut self, entry: CmdEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<CmdEntry> {
        self.entries.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Bind `name` to `(thing, attr)`. A shadowed builtin moves aside
    /// under a `__` prefix until the last binding is removed.
    pub fn add_command(&mut self, name: &str, thing: Dbref, attr: AttrNum) {
        let name = name.to_ascii_lowercase();
        match self.entries.get_mut(&name) {
            Some(entry) if entry.handler.is_some() && entry.added.is_empty() => {
                let mut shadowed = entry.clone();
                let hidden = format!("__{}", name);
                shadowed.name = hidden.clone();
                self.entries.insert(hidden, shadowed);
                let entry = self.entries.get_mut(&name).unwrap();
                entry.handler = None;
                entry.added.push(AddedCommand { thing, attr });
            }
            Some(entry) => {
                entry.added.push(AddedCommand { thing, attr });
            }
            None => {
                self.entries.insert(
                    name.clone(),
                    CmdEntry {
                        name,
                        switches: &[],
                        perm: CmdPerm::empty(),
                        shape: ArgShape::One,
                        handler: None,
                        added: vec![AddedCommand { thing, attr }],
                        hook_mask: CmdHook::empty(),
                        hook_before: None,
                        hook_after: None,
                    },
                );
            }
        }
    }

    /// Drop bindings for `name` (all of them, or just one pair) and
    /// restore a shadowed builtin when none remain. Returns how many
    /// bindings went away.
    pub fn del_command(&mut self, name: &str, pair: Option<(Dbref, AttrNum)>) -> usize {
        let name = name.to_ascii_lowercase();
        let Some(entry) = self.entries.get_mut(&name) else {
            return 0;
        };
        let before = entry.added.len();
        match pair {
            Some((thing, attr)) => entry
                .added
                .retain(|a| !(a.thing == thing && a.attr == attr)),
            None => entry.added.clear(),
        }
        let removed = before - entry.added.len();
        if entry.added.is_empty() && entry.handler.is_none() {
            self.entries.remove(&name);
            let hidden = format!("__{}", name);
            if let Some(mut builtin) = self.entries.remove(&hidden) {
                builtin.name = name.clone();
                self.entries.insert(name, builtin);
            }
        }
        removed
    }
}

/// Split outer-brace-protected, `;`-separated commands of an action
/// list. Braces around a whole command are stripped.
pub fn parse_action_list(text: &str) -> Vec<String> {
    let mut cmds = Vec::new();
    let mut cur = String::new();
    let (mut brace, mut brack, mut paren) = (0i32, 0i32, 0i32);
    for ch in text.chars() {
        match ch {
            '{' => brace += 1,
            '}' => brace -= 1,
            '[' => brack += 1,
            ']' => brack -= 1,
            '(' => paren += 1,
            ')' => paren -= 1,
            ';' if brace == 0 && brack == 0 && paren == 0 => {
                cmds.push(std::mem::take(&mut cur));
                continue;
            }
            _ => {}
        }
        cur.push(ch);
    }
    cmds.push(cur);
    cmds.into_iter()
        .map(|c| strip_outer_braces(c.trim()).to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Peel one balanced outer brace pair, if the braces span the whole
/// text.
pub fn strip_outer_braces(s: &str) -> &str {
    let t = s.trim();
    if !(t.starts_with('{') && t.ends_with('}') && t.len() >= 2) {
        return t;
    }
    let mut depth = 0i32;
    for (i, ch) in t.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 && i != t.len() - 1 {
                    return t;
                }
            }
            _ => {}
        }
    }
    t[1..t.len() - 1].trim()
}

fn expand_prefix(line: &str) -> String {
    let mut chars = line.chars();
    match chars.next() {
        Some('"') => format!("say {}", chars.as_str()),
        Some(':') => format!("pose {}", chars.as_str()),
        Some(';') => format!("pose/nospace {}", chars.as_str()),
        Some('&') => format!("@_attrset {}", chars.as_str()),
        _ => line.to_string(),
    }
}

/// Try the room's exits as a movement command.
fn try_exit_move(game: &mut Game, ctx: &Ctx, typed: &str) -> bool {
    let loc = game.world.db.location(ctx.executor);
    if loc == NOTHING {
        return false;
    }
    for e in game.world.db.list_members(game.world.db.exits(loc)) {
        if exit_name_matches(game.world.db.name(e), typed) {
            handlers::do_move_via_exit(game, ctx, e);
            return true;
        }
    }
    false
}

/// Parse and run one command line.
pub fn process_command(game: &mut Game, ctx: &Ctx, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    debug!(executor = ctx.executor, line, "command");
    let line = expand_prefix(line);

    // `&ATTR obj=value` attribute setting.
    if let Some(rest) = line.strip_prefix("@_attrset ") {
        handlers::do_attr_set(game, ctx, rest);
        return;
    }

    let (token, rest) = match line.split_once(char::is_whitespace) {
        Some((t, r)) => (t, r),
        None => (line.as_str(), ""),
    };
    let mut pieces = token.split('/');
    let name = pieces.next().unwrap_or("").to_ascii_lowercase();
    let typed_switches: Vec<String> = pieces.map(|s| s.to_ascii_lowercase()).collect();

    // Copy what we need out of the table before handing the game over.
    let found = game.commands.get(&name).map(|e| {
        (
            e.perm,
            e.shape,
            e.handler,
            e.added.clone(),
            e.switches,
            e.hook_mask,
            e.hook_before,
            e.hook_after,
        )
    });
    let Some((perm, shape, handler, added, known_switches, hook_mask, hook_before, hook_after)) =
        found
    else {
        if !try_exit_move(game, ctx, &name) {
            notify(game, ctx.executor, HUH_MESSAGE);
        }
        return;
    };

    if perm.contains(CmdPerm::WIZARD) && !game.world.db.wizard(ctx.executor) {
        notify(game, ctx.executor, NOPERM_MESSAGE);
        return;
    }
    if perm.contains(CmdPerm::GOD) && !game.world.db.is_god(ctx.executor) {
        notify(game, ctx.executor, NOPERM_MESSAGE);
        return;
    }
    for sw in &typed_switches {
        if !known_switches.contains(&sw.as_str()) {
            notify(game, ctx.executor, format!("Unrecognized switch '{}'.", sw));
            return;
        }
    }

    let mut inv = CmdInvocation {
        switches: typed_switches,
        ..CmdInvocation::default()
    };
    match shape {
        ArgShape::None => {}
        ArgShape::One => inv.arg = rest.trim().to_string(),
        ArgShape::Two => {
            let (lhs, rhs) = match rest.split_once('=') {
                Some((l, r)) => (l.trim().to_string(), r.trim().to_string()),
                None => (rest.trim().to_string(), String::new()),
            };
            inv.lhs = lhs;
            inv.rhs = rhs;
        }
    }

    if hook_mask.contains(CmdHook::BEFORE) {
        run_hook(game, ctx, hook_before);
    }
    if let Some(h) = handler {
        h(game, ctx, &inv);
    }
    // User-added bindings fire like @trigger, %0 carrying the argument
    // text.
    for binding in added {
        let text = game.world.atr_get(binding.thing, binding.attr).text;
        if text.is_empty() {
            continue;
        }
        let args = vec![match shape {
            ArgShape::One => inv.arg.clone(),
            _ => rest.trim().to_string(),
        }];
        let tctx = Ctx {
            executor: binding.thing,
            caller: ctx.executor,
            enactor: ctx.executor,
        };
        let now = game.now;
        let regs = game.regs.clone();
        let owner = game.world.db.owner(binding.thing);
        if game
            .queue
            .enqueue_wait(now, now, tctx, owner, text, args, regs)
            .is_err()
        {
            notify(game, ctx.executor, "Queue overflow.");
        }
    }
    if hook_mask.contains(CmdHook::AFTER) {
        run_hook(game, ctx, hook_after);
    }
}

/// Hooks run inline as the hook object, with the commanding player as
/// enactor.
fn run_hook(game: &mut Game, ctx: &Ctx, hook: Option<AddedCommand>) {
    let Some(h) = hook else {
        return;
    };
    let text = game.world.atr_get(h.thing, h.attr).text;
    if text.is_empty() {
        return;
    }
    let hctx = Ctx {
        executor: h.thing,
        caller: ctx.executor,
        enactor: ctx.executor,
    };
    for cmd in parse_action_list(&text) {
        process_command(game, &hctx, &cmd);
    }
}

/// Run one queue entry: restore its registers, split the action list,
/// and execute each command under the entry's context.
pub fn run_queued_entry(game: &mut Game, entry: QueueEntry) {
    let saved_regs = std::mem::replace(&mut game.regs, entry.regs.clone());
    let saved_depth = game.queue.cur_depth;
    game.queue.cur_depth = entry.depth;
    for cmd in parse_action_list(&entry.text) {
        let expanded = substitute_positional(&cmd, &entry.args);
        process_command(game, &entry.ctx, &expanded);
    }
    game.queue.cur_depth = saved_depth;
    game.regs = saved_regs;
}

/// Queue entries carry positional args referenced as %0..%9; commands
/// re-parse the text, so the substitution happens up front.
fn substitute_positional(text: &str, args: &[String]) -> String {
    if args.is_empty() || !text.contains('%') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '%' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit() {
            let n = chars[i + 1] as usize - '0' as usize;
            if let Some(a) = args.get(n) {
                out.push_str(a);
            }
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// One interpreter tick: ripen timed entries, then drain the FIFO under
/// the per-tick budget.
pub fn tick(game: &mut Game, now: i64) {
    game.now = now;
    game.queue.tick(now);
    let budget = game.queue.chunk();
    for _ in 0..budget {
        let Some(entry) = game.queue.next_runnable() else {
            break;
        };
        run_queued_entry(game, entry);
    }
}
