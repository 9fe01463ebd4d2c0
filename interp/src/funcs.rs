//! Builtin softcode functions. The registry is a static name-keyed map;
//! handlers receive evaluated arguments unless the entry is lazy, in
//! which case they evaluate what they need themselves.

use fnv::FnvHashMap;
use once_cell::sync::Lazy;
use rand::Rng;

use common::strings::{length_point, strip_color, LtString};
use world::Dbref;

use crate::eval::{eval_str, EvalFlags, EvalState, E_ARGS_MUST_BE_NUMBERS};
use crate::game::{Ctx, Game, Regs};
use crate::matcher::{match_thing, parse_thing_slash_attr};
use crate::wild::wild_match;

pub type Handler = fn(&mut Game, &Ctx, &mut EvalState, &[String], &[String]) -> String;

pub struct FunEntry {
    pub name: &'static str,
    pub min: usize,
    pub max: usize,
    /// Lazy entries receive raw argument text.
    pub lazy: bool,
    pub handler: Handler,
}

macro_rules! fun {
    ($name:literal, $min:expr, $max:expr, $handler:expr) => {
        FunEntry {
            name: $name,
            min: $min,
            max: $max,
            lazy: false,
            handler: $handler,
        }
    };
    ($name:literal, $min:expr, $max:expr, lazy, $handler:expr) => {
        FunEntry {
            name: $name,
            min: $min,
            max: $max,
            lazy: true,
            handler: $handler,
        }
    };
}

static FUN_TABLE: Lazy<FnvHashMap<&'static str, FunEntry>> = Lazy::new(|| {
    let entries = vec![
        fun!("add", 2, usize::MAX, fun_add),
        fun!("sub", 2, 2, fun_sub),
        fun!("mul", 2, usize::MAX, fun_mul),
        fun!("div", 2, 2, fun_div),
        fun!("mod", 2, 2, fun_mod),
        fun!("eq", 2, 2, fun_eq),
        fun!("gt", 2, 2, fun_gt),
        fun!("lt", 2, 2, fun_lt),
        fun!("and", 2, usize::MAX, fun_and),
        fun!("or", 2, usize::MAX, fun_or),
        fun!("not", 1, 1, fun_not),
        fun!("if", 2, 3, lazy, fun_if),
        fun!("ifelse", 3, 3, lazy, fun_if),
        fun!("cat", 1, usize::MAX, fun_cat),
        fun!("strlen", 1, 1, fun_strlen),
        fun!("mid", 3, 3, fun_mid),
        fun!("ucstr", 1, 1, fun_ucstr),
        fun!("lcstr", 1, 1, fun_lcstr),
        fun!("name", 1, 1, fun_name),
        fun!("num", 1, 1, fun_num),
        fun!("loc", 1, 1, fun_loc),
        fun!("owner", 1, 1, fun_owner),
        fun!("get", 1, 1, fun_get),
        fun!("v", 1, 1, fun_v),
        fun!("u", 1, 11, fun_u),
        fun!("setq", 2, 2, fun_setq),
        fun!("r", 1, 1, fun_r),
        fun!("words", 1, 1, fun_words),
        fun!("first", 1, 1, fun_first),
        fun!("rest", 1, 1, fun_rest),
        fun!("rand", 1, 1, fun_rand),
        fun!("switch", 3, usize::MAX, lazy, fun_switch),
        fun!("iter", 2, 2, lazy, fun_iter),
    ];
    entries.into_iter().map(|e| (e.name, e)).collect()
});

pub fn lookup(name: &str) -> Option<&'static FunEntry> {
    FUN_TABLE.get(name)
}

// -- helpers ---------------------------------------------------------------

fn to_num(s: &str) -> Option<f64> {
    let t = strip_color(s);
    let t = t.trim();
    if t.is_empty() {
        return Some(0.0);
    }
    t.parse::<f64>().ok()
}

fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn nums(args: &[String]) -> Option<Vec<f64>> {
    args.iter().map(|a| to_num(a)).collect()
}

/// Boolean reading of softcode text: numbers by value, `#-1...` tokens
/// false, other non-empty strings true.
pub fn is_true(s: &str) -> bool {
    let t = strip_color(s);
    let t = t.trim();
    if t.is_empty() {
        return false;
    }
    if t.starts_with("#-") {
        return false;
    }
    match t.parse::<f64>() {
        Ok(n) => n != 0.0,
        Err(_) => true,
    }
}

fn eval_arg(game: &mut Game, ctx: &Ctx, st: &mut EvalState, raw: &str, cargs: &[String]) -> String {
    eval_str(
        game,
        ctx,
        st,
        EvalFlags::FCHECK | EvalFlags::EVAL | EvalFlags::STRIP_LS | EvalFlags::STRIP_TS,
        raw,
        cargs,
    )
}

fn resolve_attr_text(game: &mut Game, ctx: &Ctx, spec: &str) -> Option<(Dbref, String)> {
    let (obj_part, attr_part) = parse_thing_slash_attr(spec);
    let (target, attr_name) = match attr_part {
        Some(attr) => (match_thing(game, ctx, obj_part), attr),
        None => (ctx.executor, obj_part),
    };
    if !game.world.db.good(target) {
        return None;
    }
    let num = game.world.attrs.catalog().atr_str(attr_name)?.num;
    let (v, _) = game.world.atr_pget(target, num);
    Some((target, v.text))
}

// -- arithmetic ------------------------------------------------------------

fn fun_add(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match nums(args) {
        Some(ns) => fmt_num(ns.iter().sum()),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

fn fun_sub(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match nums(args) {
        Some(ns) => fmt_num(ns[0] - ns[1]),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

fn fun_mul(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match nums(args) {
        Some(ns) => fmt_num(ns.iter().product()),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

fn fun_div(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match nums(args) {
        Some(ns) if ns[1] == 0.0 => "#-1 DIVIDE BY ZERO".to_string(),
        Some(ns) => fmt_num((ns[0] as i64 / ns[1] as i64) as f64),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

fn fun_mod(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match nums(args) {
        Some(ns) if ns[1] == 0.0 => "#-1 DIVIDE BY ZERO".to_string(),
        Some(ns) => fmt_num((ns[0] as i64 % ns[1] as i64) as f64),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

fn fun_eq(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match nums(args) {
        Some(ns) => if ns[0] == ns[1] { "1" } else { "0" }.to_string(),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

fn fun_gt(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match nums(args) {
        Some(ns) => if ns[0] > ns[1] { "1" } else { "0" }.to_string(),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

fn fun_lt(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match nums(args) {
        Some(ns) => if ns[0] < ns[1] { "1" } else { "0" }.to_string(),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

// -- boolean ---------------------------------------------------------------

fn fun_and(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    if args.iter().all(|a| is_true(a)) { "1" } else { "0" }.to_string()
}

fn fun_or(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    if args.iter().any(|a| is_true(a)) { "1" } else { "0" }.to_string()
}

fn fun_not(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    if is_true(&args[0]) { "0" } else { "1" }.to_string()
}

fn fun_if(game: &mut Game, ctx: &Ctx, st: &mut EvalState, args: &[String], cargs: &[String]) -> String {
    let cond = eval_arg(game, ctx, st, &args[0], cargs);
    if is_true(&cond) {
        eval_arg(game, ctx, st, &args[1], cargs)
    } else if let Some(else_branch) = args.get(2) {
        eval_arg(game, ctx, st, else_branch, cargs)
    } else {
        String::new()
    }
}

// -- strings ---------------------------------------------------------------

fn fun_cat(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    args.join(" ")
}

fn fun_strlen(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    length_point(&args[0]).to_string()
}

fn fun_mid(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    let (Some(start), Some(len)) = (to_num(&args[1]), to_num(&args[2])) else {
        return E_ARGS_MUST_BE_NUMBERS.to_string();
    };
    if start < 0.0 || len < 0.0 {
        return "#-1 OUT OF RANGE".to_string();
    }
    let (start, len) = (start as usize, len as usize);
    let ls = LtString::import(&args[0]);
    if start >= ls.n_points() {
        return String::new();
    }
    let end = (start + len).min(ls.n_points());
    let mut out = String::new();
    let mut state = common::strings::ColorState::PLAIN;
    for (idx, ch) in ls.plain().chars().enumerate().skip(start).take(end - start) {
        let want = ls.color_at(idx);
        if want != state {
            out.push(common::strings::color::COLOR_RESET);
            want.emit_codes(&mut out);
            state = want;
        }
        out.push(ch);
    }
    if !state.is_plain() {
        out.push(common::strings::color::COLOR_RESET);
    }
    out
}

fn fun_ucstr(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    args[0]
        .chars()
        .map(|c| {
            if common::strings::color::is_color_cp(c) {
                c.to_string()
            } else {
                c.to_uppercase().to_string()
            }
        })
        .collect()
}

fn fun_lcstr(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    args[0]
        .chars()
        .map(|c| {
            if common::strings::color::is_color_cp(c) {
                c.to_string()
            } else {
                c.to_lowercase().to_string()
            }
        })
        .collect()
}

// -- database --------------------------------------------------------------

fn fun_name(game: &mut Game, ctx: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    let d = match_thing(game, ctx, &args[0]);
    if game.world.db.good(d) {
        game.world.db.name(d).to_string()
    } else {
        String::new()
    }
}

fn fun_num(game: &mut Game, ctx: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    let d = match_thing(game, ctx, &args[0]);
    if game.world.db.good(d) {
        format!("#{}", d)
    } else {
        "#-1".to_string()
    }
}

fn fun_loc(game: &mut Game, ctx: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    let d = match_thing(game, ctx, &args[0]);
    if game.world.db.good(d) && game.world.db.locatable(ctx.executor, d, ctx.enactor) {
        format!("#{}", game.world.db.location(d))
    } else {
        "#-1".to_string()
    }
}

fn fun_owner(game: &mut Game, ctx: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    let d = match_thing(game, ctx, &args[0]);
    if game.world.db.good(d) {
        format!("#{}", game.world.db.owner(d))
    } else {
        "#-1".to_string()
    }
}

fn fun_get(game: &mut Game, ctx: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    let (obj_part, attr_part) = parse_thing_slash_attr(&args[0]);
    let Some(attr_name) = attr_part else {
        return "#-1 BAD ARGUMENT FORMAT".to_string();
    };
    let target = match_thing(game, ctx, obj_part);
    if !game.world.db.good(target) {
        return "#-1 NO MATCH".to_string();
    }
    let Some(def) = game.world.attrs.catalog().atr_str(attr_name) else {
        return String::new();
    };
    let num = def.num;
    if !game.world.can_read_attr(ctx.executor, target, num, false) {
        return "#-1 PERMISSION DENIED".to_string();
    }
    game.world.atr_get(target, num).text
}

fn fun_v(game: &mut Game, ctx: &Ctx, st: &mut EvalState, args: &[String], _: &[String]) -> String {
    let name = strip_color(&args[0]);
    // Single characters reach the register file, the way %q does.
    if name.chars().count() == 1 {
        if let Some(idx) = Regs::index_of(name.chars().next().unwrap_or(' ')) {
            if !st.regs.get(idx).is_empty() {
                return st.regs.get(idx).to_string();
            }
        }
    }
    let Some(def) = game.world.attrs.catalog().atr_str(&name) else {
        return String::new();
    };
    let num = def.num;
    let (v, _) = game.world.atr_pget(ctx.executor, num);
    v.text
}

fn fun_u(game: &mut Game, ctx: &Ctx, st: &mut EvalState, args: &[String], _: &[String]) -> String {
    let Some((target, text)) = resolve_attr_text(game, ctx, &args[0]) else {
        return "#-1 NO MATCH".to_string();
    };
    let uargs: Vec<String> = args[1..].to_vec();
    let uctx = ctx.with_executor(target);
    eval_str(
        game,
        &uctx,
        st,
        EvalFlags::FCHECK | EvalFlags::EVAL,
        &text,
        &uargs,
    )
}

fn fun_setq(_: &mut Game, _: &Ctx, st: &mut EvalState, args: &[String], _: &[String]) -> String {
    let name = strip_color(&args[0]);
    match name.trim().chars().next().and_then(Regs::index_of) {
        Some(idx) => {
            st.regs.set(idx, args[1].clone());
            String::new()
        }
        None => "#-1 INVALID GLOBAL REGISTER".to_string(),
    }
}

fn fun_r(_: &mut Game, _: &Ctx, st: &mut EvalState, args: &[String], _: &[String]) -> String {
    match strip_color(&args[0]).trim().chars().next().and_then(Regs::index_of) {
        Some(idx) => st.regs.get(idx).to_string(),
        None => "#-1 INVALID GLOBAL REGISTER".to_string(),
    }
}

// -- lists -----------------------------------------------------------------

fn split_words(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}

fn fun_words(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    split_words(&args[0]).len().to_string()
}

fn fun_first(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    split_words(&args[0]).first().copied().unwrap_or("").to_string()
}

fn fun_rest(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    let words = split_words(&args[0]);
    words.iter().skip(1).copied().collect::<Vec<_>>().join(" ")
}

fn fun_rand(_: &mut Game, _: &Ctx, _: &mut EvalState, args: &[String], _: &[String]) -> String {
    match to_num(&args[0]) {
        Some(n) if n >= 1.0 => {
            let upper = n as i64;
            rand::thread_rng().gen_range(0..upper).to_string()
        }
        Some(_) => "0".to_string(),
        None => E_ARGS_MUST_BE_NUMBERS.to_string(),
    }
}

// -- control ---------------------------------------------------------------

fn fun_switch(game: &mut Game, ctx: &Ctx, st: &mut EvalState, args: &[String], cargs: &[String]) -> String {
    let expr = eval_arg(game, ctx, st, &args[0], cargs);
    let mut i = 1;
    while i + 1 < args.len() {
        let pattern = eval_arg(game, ctx, st, &args[i], cargs);
        if wild_match(&strip_color(&pattern), &strip_color(&expr)) {
            return eval_arg(game, ctx, st, &args[i + 1], cargs);
        }
        i += 2;
    }
    // Trailing unpaired argument is the default branch.
    if i < args.len() {
        eval_arg(game, ctx, st, &args[i], cargs)
    } else {
        String::new()
    }
}

fn fun_iter(game: &mut Game, ctx: &Ctx, st: &mut EvalState, args: &[String], cargs: &[String]) -> String {
    let list = eval_arg(game, ctx, st, &args[0], cargs);
    let mut out = Vec::new();
    for (idx, word) in list.split_whitespace().enumerate() {
        let body = args[1]
            .replace("##", word)
            .replace("#@", &(idx + 1).to_string());
        out.push(eval_arg(game, ctx, st, &body, cargs));
    }
    out.join(" ")
}
