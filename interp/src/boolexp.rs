//! Lock expressions: small boolean trees parsed from attribute text and
//! evaluated against `(player, thing)`.
//!
//! Grammar: `|` binds loosest, then `&`, then `!`; parens group. Leaves
//! are `@obj` (indirect), `=obj` (is), `+obj` (carry), `$obj` (owner),
//! `flag^name`, `attr:pattern`, `attr/text`, or a plain object
//! reference. Unparseable text reads as unlocked, matching the original
//! server's fail-open parse.

use tracing::trace;

use common::strings::strip_color;
use world::attr::{AttrNum, A_LOCK};
use world::{Dbref, ObjFlags, HOME};

use crate::eval::{eval_str, EvalFlags, EvalState};
use crate::game::{Ctx, Game};
use crate::matcher::match_thing;
use crate::wild::wild_match;

#[derive(Debug, Clone, PartialEq)]
pub enum BoolExp {
    /// The unlocked lock.
    True,
    And(Box<BoolExp>, Box<BoolExp>),
    Or(Box<BoolExp>, Box<BoolExp>),
    Not(Box<BoolExp>),
    /// Pass iff player is, or carries, the object.
    Ref(Dbref),
    Is(Dbref),
    Carry(Dbref),
    Owner(Dbref),
    /// Defer to the target object's own lock.
    Indirect(Dbref),
    Flag(String),
    /// Player attribute compared exactly (case-insensitive).
    AttrEq(AttrNum, String),
    /// Player attribute compared by wildcard.
    AttrMatch(AttrNum, String),
    /// Attribute on the locked thing, evaluated then compared.
    Eval(AttrNum, String),
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    game: &'a mut Game,
    ctx: &'a Ctx,
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] == ' ' {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn parse_expr(&mut self) -> Option<BoolExp> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('|') {
                self.pos += 1;
                let right = self.parse_and()?;
                left = BoolExp::Or(Box::new(left), Box::new(right));
            } else {
                return Some(left);
            }
        }
    }

    fn parse_and(&mut self) -> Option<BoolExp> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('&') {
                self.pos += 1;
                let right = self.parse_unary()?;
                left = BoolExp::And(Box::new(left), Box::new(right));
            } else {
                return Some(left);
            }
        }
    }

    fn parse_unary(&mut self) -> Option<BoolExp> {
        self.skip_ws();
        match self.peek() {
            Some('!') => {
                self.pos += 1;
                Some(BoolExp::Not(Box::new(self.parse_unary()?)))
            }
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return None;
                }
                self.pos += 1;
                Some(inner)
            }
            Some('@') => {
                self.pos += 1;
                self.parse_obj().map(BoolExp::Indirect)
            }
            Some('=') => {
                self.pos += 1;
                self.parse_obj().map(BoolExp::Is)
            }
            Some('+') => {
                self.pos += 1;
                self.parse_obj().map(BoolExp::Carry)
            }
            Some('$') => {
                self.pos += 1;
                self.parse_obj().map(BoolExp::Owner)
            }
            Some(_) => self.parse_leaf(),
            None => None,
        }
    }

    /// Raw leaf text: everything up to an operator at this level.
    fn take_leaf_text(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '&' | '|' | ')') {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn parse_obj(&mut self) -> Option<Dbref> {
        let text = self.take_leaf_text();
        if text.is_empty() {
            return None;
        }
        let d = match_thing(self.game, self.ctx, &text);
        if self.game.world.db.good(d) {
            Some(d)
        } else {
            None
        }
    }

    fn parse_leaf(&mut self) -> Option<BoolExp> {
        let text = self.take_leaf_text();
        if text.is_empty() {
            return None;
        }

        if let Some(rest) = text
            .to_ascii_lowercase()
            .strip_prefix("flag^")
            .map(str::to_string)
        {
            return Some(BoolExp::Flag(rest));
        }

        if let Some((attr, pattern)) = text.split_once(':') {
            let num = self.game.world.attrs.catalog().atr_str(attr.trim())?.num;
            let pattern = pattern.trim().to_string();
            return Some(if pattern.contains('*') || pattern.contains('?') {
                BoolExp::AttrMatch(num, pattern)
            } else {
                BoolExp::AttrEq(num, pattern)
            });
        }

        if let Some((attr, value)) = text.split_once('/') {
            let num = self.game.world.attrs.catalog().atr_str(attr.trim())?.num;
            return Some(BoolExp::Eval(num, value.trim().to_string()));
        }

        let d = match_thing(self.game, self.ctx, &text);
        if self.game.world.db.good(d) {
            Some(BoolExp::Ref(d))
        } else {
            None
        }
    }
}

/// Parse lock text, refusing malformed keys. Used at @lock time, where
/// the references in the key resolve relative to the locker; the
/// canonical stored form from [`unparse_boolexp`] is context-free.
pub fn parse_boolexp_strict(game: &mut Game, ctx: &Ctx, text: &str) -> Option<BoolExp> {
    let stripped = strip_color(text);
    if stripped.trim().is_empty() {
        return Some(BoolExp::True);
    }
    let mut p = Parser {
        chars: stripped.chars().collect(),
        pos: 0,
        game,
        ctx,
    };
    let exp = p.parse_expr()?;
    p.skip_ws();
    if p.pos == p.chars.len() {
        Some(exp)
    } else {
        None
    }
}

/// Canonical lock text: object references as `#dbref`, so the stored
/// form reads the same from any context.
pub fn unparse_boolexp(game: &Game, exp: &BoolExp) -> String {
    fn atom(game: &Game, exp: &BoolExp) -> String {
        match exp {
            BoolExp::And(_, _) | BoolExp::Or(_, _) => {
                format!("({})", unparse_boolexp(game, exp))
            }
            _ => unparse_boolexp(game, exp),
        }
    }
    let attr_name = |a: &AttrNum| {
        game.world
            .attrs
            .catalog()
            .atr_num(*a)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| a.to_string())
    };
    match exp {
        BoolExp::True => String::new(),
        BoolExp::And(a, b) => format!("{}&{}", atom(game, a), atom(game, b)),
        BoolExp::Or(a, b) => format!("{}|{}", atom(game, a), atom(game, b)),
        BoolExp::Not(a) => format!("!{}", atom(game, a)),
        BoolExp::Ref(d) => format!("#{}", d),
        BoolExp::Is(d) => format!("=#{}", d),
        BoolExp::Carry(d) => format!("+#{}", d),
        BoolExp::Owner(d) => format!("$#{}", d),
        BoolExp::Indirect(d) => format!("@#{}", d),
        BoolExp::Flag(name) => format!("flag^{}", name),
        BoolExp::AttrEq(a, v) | BoolExp::AttrMatch(a, v) => {
            format!("{}:{}", attr_name(a), v)
        }
        BoolExp::Eval(a, v) => format!("{}/{}", attr_name(a), v),
    }
}

/// Parse lock text. Empty or malformed text is the unlocked lock.
pub fn parse_boolexp(game: &mut Game, ctx: &Ctx, text: &str) -> BoolExp {
    let stripped = strip_color(text);
    if stripped.trim().is_empty() {
        return BoolExp::True;
    }
    let mut p = Parser {
        chars: stripped.chars().collect(),
        pos: 0,
        game,
        ctx,
    };
    match p.parse_expr() {
        Some(exp) => {
            p.skip_ws();
            if p.pos == p.chars.len() {
                exp
            } else {
                trace!(text, "trailing garbage in lock; treating as unlocked");
                BoolExp::True
            }
        }
        None => {
            trace!(text, "unparseable lock; treating as unlocked");
            BoolExp::True
        }
    }
}

fn attr_text_on(game: &mut Game, on: Dbref, a: AttrNum) -> String {
    let (v, _) = game.world.atr_pget(on, a);
    v.text
}

/// Evaluate an expression attribute under the thing's ownership, per
/// the lock contract.
fn eval_lock_attr(game: &mut Game, player: Dbref, thing: Dbref, text: &str) -> String {
    let ctx = Ctx {
        executor: thing,
        caller: player,
        enactor: player,
    };
    let limits = game.world.cfg.limits.clone();
    let mut st = EvalState::new(&limits, game.regs.clone());
    eval_str(
        game,
        &ctx,
        &mut st,
        EvalFlags::FCHECK | EvalFlags::EVAL,
        text,
        &[],
    )
}

pub fn eval_boolexp(game: &mut Game, player: Dbref, thing: Dbref, exp: &BoolExp) -> bool {
    eval_depth(game, player, thing, exp, 0)
}

fn eval_depth(game: &mut Game, player: Dbref, thing: Dbref, exp: &BoolExp, depth: u32) -> bool {
    if depth > game.world.cfg.limits.lock_nest_lim {
        return false;
    }
    match exp {
        BoolExp::True => true,
        BoolExp::And(a, b) => {
            eval_depth(game, player, thing, a, depth + 1)
                && eval_depth(game, player, thing, b, depth + 1)
        }
        BoolExp::Or(a, b) => {
            eval_depth(game, player, thing, a, depth + 1)
                || eval_depth(game, player, thing, b, depth + 1)
        }
        BoolExp::Not(a) => !eval_depth(game, player, thing, a, depth + 1),
        BoolExp::Ref(d) => player == *d || game.world.db.member(*d, game.world.db.contents(player)),
        BoolExp::Is(d) => player == *d,
        BoolExp::Carry(d) => game.world.db.member(*d, game.world.db.contents(player)),
        BoolExp::Owner(d) => game.world.db.owner(player) == game.world.db.owner(*d),
        BoolExp::Indirect(d) => {
            let text = attr_text_on(game, *d, A_LOCK);
            let ctx = Ctx::acting_alone(*d);
            let inner = parse_boolexp(game, &ctx, &text);
            eval_depth(game, player, *d, &inner, depth + 1)
        }
        BoolExp::Flag(name) => match ObjFlags::by_name(name) {
            Some(f) => game.world.db.has_flag(player, f),
            None => false,
        },
        BoolExp::AttrEq(a, want) => {
            let text = attr_text_on(game, player, *a);
            let got = eval_lock_attr(game, player, thing, &text);
            strip_color(&got).eq_ignore_ascii_case(want)
        }
        BoolExp::AttrMatch(a, pattern) => {
            let text = attr_text_on(game, player, *a);
            let got = eval_lock_attr(game, player, thing, &text);
            wild_match(pattern, &strip_color(&got))
        }
        BoolExp::Eval(a, want) => {
            let text = attr_text_on(game, thing, *a);
            let got = eval_lock_attr(game, player, thing, &text);
            strip_color(&got).eq_ignore_ascii_case(want)
        }
    }
}

/// The standard gate: HOME always passes; wizard-grade players pass any
/// lock; otherwise the thing's lock attribute decides. An empty lock is
/// open.
pub fn could_doit(game: &mut Game, player: Dbref, thing: Dbref, lock_attr: AttrNum) -> bool {
    if thing == HOME {
        return true;
    }
    if game.world.db.has_power(player, world::Powers::PASS_LOCKS) {
        return true;
    }
    let key = game.world.atr_get(thing, lock_attr).text;
    if key.trim().is_empty() {
        return true;
    }
    let ctx = Ctx::acting_alone(thing);
    let exp = parse_boolexp(game, &ctx, &key);
    eval_boolexp(game, player, thing, &exp)
}

#[cfg(test)]
mod test {
    use super::*;
    use common::config::MuxConfig;
    use world::attr::{AttrFlags, AttrValue};
    use world::{ObjectType, NOTHING};

    fn game() -> (Game, Dbref, Dbref, Dbref) {
        let mut g = Game::new_in_memory(MuxConfig::default());
        g.bootstrap().unwrap();
        let alice = g
            .world
            .create_object(ObjectType::Player, NOTHING, "Alice")
            .unwrap();
        g.world.db.add_contents(0, alice);
        let bob = g
            .world
            .create_object(ObjectType::Player, NOTHING, "Bob")
            .unwrap();
        g.world.db.add_contents(0, bob);
        (g, 1, alice, bob)
    }

    fn check(g: &mut Game, thing: Dbref, lock: &str, player: Dbref) -> bool {
        let ctx = Ctx::acting_alone(thing);
        let exp = parse_boolexp(g, &ctx, lock);
        eval_boolexp(g, player, thing, &exp)
    }

    #[test]
    fn test_ref_is_carry() {
        let (mut g, _god, alice, bob) = game();
        let toy = g.world.create_object(ObjectType::Thing, alice, "Toy").unwrap();
        g.world.db.add_contents(0, toy);
        let key = g.world.create_object(ObjectType::Thing, alice, "Key").unwrap();
        g.world.db.add_contents(alice, key);

        assert!(check(&mut g, toy, "Alice", alice));
        assert!(!check(&mut g, toy, "Alice", bob));
        // Carrying the named object satisfies a plain reference.
        assert!(check(&mut g, toy, "Key", alice));
        assert!(!check(&mut g, toy, "Key", bob));
        assert!(check(&mut g, toy, "+Key", alice));
        assert!(!check(&mut g, toy, "=Key", alice));
        assert!(check(&mut g, toy, "=Alice", alice));
    }

    #[test]
    fn test_and_or_not_shortcircuit() {
        let (mut g, _god, alice, bob) = game();
        let toy = g.world.create_object(ObjectType::Thing, alice, "Toy").unwrap();
        g.world.db.add_contents(0, toy);

        assert!(check(&mut g, toy, "Alice|Bob", alice));
        assert!(check(&mut g, toy, "Alice|Bob", bob));
        assert!(!check(&mut g, toy, "Alice&Bob", alice));
        assert!(check(&mut g, toy, "!Bob", alice));
        // Involutive NOT.
        assert!(check(&mut g, toy, "!!Alice", alice));
        // AND distributes over its operands.
        assert_eq!(
            check(&mut g, toy, "Alice&!Bob", alice),
            check(&mut g, toy, "Alice", alice) && check(&mut g, toy, "!Bob", alice)
        );
    }

    #[test]
    fn test_owner_lock() {
        let (mut g, _god, alice, bob) = game();
        let toy = g.world.create_object(ObjectType::Thing, alice, "Toy").unwrap();
        g.world.db.add_contents(0, toy);
        assert!(check(&mut g, toy, "$Toy", alice));
        assert!(!check(&mut g, toy, "$Toy", bob));
    }

    #[test]
    fn test_flag_lock() {
        let (mut g, god, alice, _bob) = game();
        let toy = g.world.create_object(ObjectType::Thing, god, "Toy").unwrap();
        g.world.db.add_contents(0, toy);
        assert!(check(&mut g, toy, "flag^wizard", god));
        assert!(!check(&mut g, toy, "flag^wizard", alice));
    }

    #[test]
    fn test_attr_locks() {
        let (mut g, god, alice, bob) = game();
        let toy = g.world.create_object(ObjectType::Thing, god, "Toy").unwrap();
        g.world.db.add_contents(0, toy);
        let sex = g.world.attrs.catalog_mut().mkattr("SEX").unwrap();
        g.world
            .atr_set_raw(alice, sex, AttrValue::new("female", god, AttrFlags::empty()));
        g.world
            .atr_set_raw(bob, sex, AttrValue::new("male", god, AttrFlags::empty()));

        assert!(check(&mut g, toy, "sex:female", alice));
        assert!(!check(&mut g, toy, "sex:female", bob));
        assert!(check(&mut g, toy, "sex:f*", alice));
        assert!(!check(&mut g, toy, "sex:f*", bob));
    }

    #[test]
    fn test_eval_lock() {
        let (mut g, god, alice, bob) = game();
        let toy = g.world.create_object(ObjectType::Thing, god, "Toy").unwrap();
        g.world.db.add_contents(0, toy);
        let test = g.world.attrs.catalog_mut().mkattr("TESTER").unwrap();
        // The attribute echoes the enactor; the lock names Alice.
        g.world
            .atr_set_raw(toy, test, AttrValue::new("%#", god, AttrFlags::empty()));
        let lock = format!("tester/#{}", alice);
        assert!(check(&mut g, toy, &lock, alice));
        assert!(!check(&mut g, toy, &lock, bob));
    }

    #[test]
    fn test_indirect_lock() {
        let (mut g, _god, alice, bob) = game();
        let master = g
            .world
            .create_object(ObjectType::Thing, alice, "Master")
            .unwrap();
        g.world.db.add_contents(0, master);
        g.world.atr_set_raw(
            master,
            A_LOCK,
            AttrValue::new("Alice", alice, AttrFlags::IS_LOCK),
        );
        let toy = g.world.create_object(ObjectType::Thing, alice, "Toy").unwrap();
        g.world.db.add_contents(0, toy);

        assert!(check(&mut g, toy, "@Master", alice));
        assert!(!check(&mut g, toy, "@Master", bob));
    }

    #[test]
    fn test_unparseable_is_unlocked() {
        let (mut g, _god, alice, _bob) = game();
        let toy = g.world.create_object(ObjectType::Thing, alice, "Toy").unwrap();
        g.world.db.add_contents(0, toy);
        assert!(check(&mut g, toy, "((broken", alice));
        assert!(check(&mut g, toy, "no such object", alice));
        assert!(check(&mut g, toy, "", alice));
    }

    #[test]
    fn test_indirect_cycle_bounded() {
        let (mut g, _god, alice, _bob) = game();
        let a = g.world.create_object(ObjectType::Thing, alice, "CycA").unwrap();
        g.world.db.add_contents(0, a);
        let b = g.world.create_object(ObjectType::Thing, alice, "CycB").unwrap();
        g.world.db.add_contents(0, b);
        g.world
            .atr_set_raw(a, A_LOCK, AttrValue::new("@CycB", alice, AttrFlags::IS_LOCK));
        g.world
            .atr_set_raw(b, A_LOCK, AttrValue::new("@CycA", alice, AttrFlags::IS_LOCK));
        // Depth limit turns the cycle into a denial rather than a hang.
        assert!(!check(&mut g, a, "@CycB", alice));
    }

    #[test]
    fn test_could_doit() {
        let (mut g, _god, alice, bob) = game();
        let toy = g.world.create_object(ObjectType::Thing, alice, "Toy").unwrap();
        g.world.db.add_contents(0, toy);
        // Unlocked passes everyone.
        assert!(could_doit(&mut g, bob, toy, A_LOCK));
        g.world
            .atr_set_raw(toy, A_LOCK, AttrValue::new("=Alice", alice, AttrFlags::IS_LOCK));
        assert!(could_doit(&mut g, alice, toy, A_LOCK));
        assert!(!could_doit(&mut g, bob, toy, A_LOCK));
    }
}
