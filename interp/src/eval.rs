//! The expression evaluator: one left-to-right pass over the source
//! text, writing into a bounded LBUF buffer. Functions only fire at the
//! start of an expression segment or inside `[...]`; everything else
//! copies through with `%`-substitutions applied.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use tracing::trace;

use common::config::LimitsConfig;
use common::strings::color::letter_to_code;
use pool::{Buf, BufClass};

use crate::funcs;
use crate::game::{Ctx, Game, Regs};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EvalFlags: u32 {
        /// Look for a function call at the segment start.
        const FCHECK      = 0x0001;
        /// Process `%` and `[` (off = literal copy).
        const EVAL        = 0x0002;
        const STRIP_CURLY = 0x0004;
        const STRIP_TS    = 0x0008;
        const STRIP_LS    = 0x0010;
        const TOP         = 0x0020;
        const NOFCHECK    = 0x0040;
    }
}

pub const E_ARGS_MUST_BE_NUMBERS: &str = "#-1 ARGUMENTS MUST BE NUMBERS";
pub const E_INVOCATION_LIMIT: &str = "#-1 FUNCTION INVOCATION LIMIT EXCEEDED";
pub const E_RECURSION_LIMIT: &str = "#-1 FUNCTION RECURSION LIMIT EXCEEDED";
pub const E_CPU_LIMIT: &str = "#-1 CPU TIME LIMIT EXCEEDED";
pub const E_STRING_TOO_LONG: &str = "#-1 STRING TOO LONG";
pub const E_OUT_OF_MEMORY: &str = "#-1 OUT OF MEMORY";

/// Per-evaluation state: limit counters, the cooperative deadline, and
/// the live register file. Checked at every function boundary, so a
/// runaway expression unwinds without signals.
#[derive(Debug)]
pub struct EvalState {
    pub invocations: u32,
    pub depth: u32,
    pub deadline: Instant,
    pub regs: Regs,
    invk_lim: u32,
    nest_lim: u32,
}

impl EvalState {
    pub fn new(limits: &LimitsConfig, regs: Regs) -> Self {
        EvalState {
            invocations: 0,
            depth: 0,
            deadline: Instant::now() + Duration::from_millis(limits.eval_timeout_ms),
            regs,
            invk_lim: limits.func_invk_lim,
            nest_lim: limits.func_nest_lim,
        }
    }

    /// Which limit, if any, stops the next function call.
    fn breach(&self) -> Option<&'static str> {
        if self.invocations > self.invk_lim {
            Some(E_INVOCATION_LIMIT)
        } else if self.depth > self.nest_lim {
            Some(E_RECURSION_LIMIT)
        } else if Instant::now() >= self.deadline {
            Some(E_CPU_LIMIT)
        } else {
            None
        }
    }
}

/// Evaluate `input` and return the bounded result. Convenience wrapper
/// over [`eval_into`] that owns the LBUF.
pub fn eval_str(
    game: &mut Game,
    ctx: &Ctx,
    st: &mut EvalState,
    flags: EvalFlags,
    input: &str,
    cargs: &[String],
) -> String {
    let pool = game.world.pool.clone();
    let Ok(mut buf) = pool.alloc(BufClass::Lbuf, "eval.out") else {
        // The driver treats pool exhaustion as a restart condition; the
        // expression just sees a bounded error.
        return E_OUT_OF_MEMORY.to_string();
    };
    eval_into(game, ctx, st, flags, input, cargs, &mut buf);
    if buf.overflowed() {
        let keep = buf.capacity() - (E_STRING_TOO_LONG.len() + 1);
        buf.truncate(pool::trim_partial_sequence(buf.as_bytes(), keep));
        buf.append_str(" ");
        buf.append_str(E_STRING_TOO_LONG);
    }
    buf.as_str().to_string()
}

/// The single evaluation pass.
pub fn eval_into(
    game: &mut Game,
    ctx: &Ctx,
    st: &mut EvalState,
    flags: EvalFlags,
    input: &str,
    cargs: &[String],
    buf: &mut Buf,
) {
    trace!(input, executor = ctx.executor, depth = st.depth, "eval");
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0usize;
    let start_len = buf.len();

    if flags.contains(EvalFlags::STRIP_LS) {
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
    }

    // A function call may only open the segment.
    if flags.contains(EvalFlags::FCHECK) && !flags.contains(EvalFlags::NOFCHECK) {
        if let Some((name, args_start)) = scan_call_head(&chars, i) {
            if funcs::lookup(&name).is_some() {
                if let Some((raw_args, next_i)) = split_call_args(&chars, args_start) {
                    dispatch_function(game, ctx, st, &name, &raw_args, cargs, buf);
                    i = next_i;
                }
            }
        }
    }

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '%' if flags.contains(EvalFlags::EVAL) => {
                i = do_subst(game, ctx, st, &chars, i, cargs, buf);
            }
            '[' if flags.contains(EvalFlags::EVAL) => match matching(&chars, i, '[', ']') {
                Some(close) => {
                    let inner: String = chars[i + 1..close].iter().collect();
                    let out = eval_str(
                        game,
                        ctx,
                        st,
                        EvalFlags::FCHECK | EvalFlags::EVAL,
                        &inner,
                        cargs,
                    );
                    buf.append_str(&out);
                    i = close + 1;
                }
                None => {
                    buf.push_ch(ch);
                    i += 1;
                }
            },
            '{' => match matching(&chars, i, '{', '}') {
                Some(close) => {
                    let keep_braces = !flags.contains(EvalFlags::STRIP_CURLY);
                    if keep_braces {
                        buf.push_ch('{');
                    }
                    for &c in &chars[i + 1..close] {
                        buf.push_ch(c);
                    }
                    if keep_braces {
                        buf.push_ch('}');
                    }
                    i = close + 1;
                }
                None => {
                    buf.push_ch(ch);
                    i += 1;
                }
            },
            '\\' if flags.contains(EvalFlags::EVAL) => {
                if i + 1 < chars.len() {
                    buf.push_ch(chars[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => {
                buf.push_ch(ch);
                i += 1;
            }
        }
    }

    if flags.contains(EvalFlags::STRIP_TS) {
        let mut end = buf.len();
        let bytes = buf.as_bytes();
        while end > start_len && bytes[end - 1] == b' ' {
            end -= 1;
        }
        buf.truncate(end);
    }
}

/// `name(` at position `i`? Returns the lowercased name and the index
/// just past the open paren.
fn scan_call_head(chars: &[char], i: usize) -> Option<(String, usize)> {
    let mut j = i;
    while j < chars.len()
        && (chars[j].is_ascii_alphanumeric() || matches!(chars[j], '_' | '@' | '-'))
    {
        j += 1;
    }
    if j == i || j >= chars.len() || chars[j] != '(' {
        return None;
    }
    let name: String = chars[i..j].iter().collect::<String>().to_ascii_lowercase();
    Some((name, j + 1))
}

/// Split a call's raw arguments, honoring nested parens, brackets, and
/// braces. `start` sits just past the opening paren; returns the raw
/// args and the index just past the closing paren.
fn split_call_args(chars: &[char], start: usize) -> Option<(Vec<String>, usize)> {
    let mut args = Vec::new();
    let mut cur = String::new();
    let (mut paren, mut brack, mut brace) = (1i32, 0i32, 0i32);
    let mut i = start;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '(' => paren += 1,
            ')' => {
                paren -= 1;
                if paren == 0 && brack == 0 && brace == 0 {
                    args.push(cur);
                    return Some((args, i + 1));
                }
            }
            '[' => brack += 1,
            ']' => brack -= 1,
            '{' => brace += 1,
            '}' => brace -= 1,
            ',' if paren == 1 && brack == 0 && brace == 0 => {
                args.push(std::mem::take(&mut cur));
                i += 1;
                continue;
            }
            _ => {}
        }
        cur.push(ch);
        i += 1;
    }
    // Unbalanced call: the caller copies the text literally.
    None
}

/// Matching close delimiter for the open one at `i`, or None.
fn matching(chars: &[char], i: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0i32;
    for (j, &ch) in chars.iter().enumerate().skip(i) {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(j);
            }
        }
    }
    None
}

fn dispatch_function(
    game: &mut Game,
    ctx: &Ctx,
    st: &mut EvalState,
    name: &str,
    raw_args: &[String],
    cargs: &[String],
    buf: &mut Buf,
) {
    let Some(entry) = funcs::lookup(name) else {
        buf.append_str(&format!(
            "#-1 FUNCTION ({}) NOT FOUND",
            name.to_ascii_uppercase()
        ));
        return;
    };

    st.invocations += 1;
    st.depth += 1;
    let result = (|| {
        if let Some(err) = st.breach() {
            return err.to_string();
        }

        // `fun()` is an empty argument list, not one empty argument.
        let mut raw: Vec<&str> = raw_args.iter().map(|s| s.as_str()).collect();
        if raw.len() == 1 && raw[0].trim().is_empty() && entry.min == 0 {
            raw.clear();
        }

        if raw.len() < entry.min || raw.len() > entry.max {
            return if entry.min == entry.max {
                format!(
                    "#-1 FUNCTION ({}) EXPECTS {} ARGUMENTS",
                    entry.name.to_ascii_uppercase(),
                    entry.min
                )
            } else {
                format!(
                    "#-1 FUNCTION ({}) EXPECTS BETWEEN {} AND {} ARGUMENTS",
                    entry.name.to_ascii_uppercase(),
                    entry.min,
                    entry.max
                )
            };
        }

        let args: Vec<String> = if entry.lazy {
            raw.iter().map(|s| s.to_string()).collect()
        } else {
            raw.iter()
                .map(|s| {
                    eval_str(
                        game,
                        ctx,
                        st,
                        EvalFlags::FCHECK
                            | EvalFlags::EVAL
                            | EvalFlags::STRIP_LS
                            | EvalFlags::STRIP_TS,
                        s,
                        cargs,
                    )
                })
                .collect()
        };
        (entry.handler)(game, ctx, st, &args, cargs)
    })();
    st.depth -= 1;
    buf.append_str(&result);
}

fn push_dbref(out: &mut String, d: world::Dbref) {
    out.push('#');
    out.push_str(&d.to_string());
}

/// One `%` substitution starting at `chars[i]`; returns the next index.
fn do_subst(
    game: &mut Game,
    ctx: &Ctx,
    st: &mut EvalState,
    chars: &[char],
    i: usize,
    cargs: &[String],
    buf: &mut Buf,
) -> usize {
    let Some(&code) = chars.get(i + 1) else {
        buf.push_ch('%');
        return i + 1;
    };
    let mut consumed = 2;
    let mut out = String::new();
    match code {
        '%' => out.push('%'),
        'b' | 'B' => out.push(' '),
        'r' | 'R' => out.push('\n'),
        't' | 'T' => out.push('\t'),
        '0'..='9' => {
            let n = code as usize - '0' as usize;
            if let Some(arg) = cargs.get(n) {
                out.push_str(arg);
            }
        }
        '#' => push_dbref(&mut out, ctx.enactor),
        '!' => push_dbref(&mut out, ctx.executor),
        '@' => push_dbref(&mut out, ctx.caller),
        'n' => out.push_str(game.world.db.name(ctx.enactor)),
        'N' => {
            let name = game.world.db.name(ctx.enactor).to_string();
            let mut cs = name.chars();
            if let Some(first) = cs.next() {
                out.extend(first.to_uppercase());
                out.push_str(cs.as_str());
            }
        }
        'l' | 'L' => push_dbref(&mut out, game.world.db.location(ctx.executor)),
        'q' | 'Q' => match chars.get(i + 2).copied().and_then(Regs::index_of) {
            Some(idx) => {
                out.push_str(st.regs.get(idx));
                consumed = 3;
            }
            None => {}
        },
        'v' | 'V' => {
            if let Some(&letter) = chars.get(i + 2) {
                consumed = 3;
                let attr_name = format!("V{}", letter.to_ascii_uppercase());
                if let Some(def) = game.world.attrs.catalog().atr_str(&attr_name) {
                    let num = def.num;
                    let (v, _) = game.world.atr_pget(ctx.executor, num);
                    out.push_str(&v.text);
                }
            }
        }
        'x' | 'X' | 'c' | 'C' => {
            if let Some(&letter) = chars.get(i + 2) {
                consumed = 3;
                if let Some(code_cp) = letter_to_code(letter) {
                    out.push(code_cp);
                }
            }
        }
        other => out.push(other),
    }
    buf.append_str(&out);
    i + consumed
}

#[cfg(test)]
mod test {
    use super::*;
    use common::config::MuxConfig;
    use world::attr::AttrFlags;
    use world::attr::AttrValue;

    fn game() -> Game {
        let mut g = Game::new_in_memory(MuxConfig::default());
        g.bootstrap().unwrap();
        g
    }

    fn run(g: &mut Game, input: &str) -> String {
        let ctx = Ctx::acting_alone(1);
        let regs = g.regs.clone();
        let mut st = EvalState::new(&g.world.cfg.limits.clone(), regs);
        eval_str(
            g,
            &ctx,
            &mut st,
            EvalFlags::FCHECK | EvalFlags::EVAL | EvalFlags::TOP,
            input,
            &[],
        )
    }

    #[test]
    fn test_literal_copies_through() {
        let mut g = game();
        assert_eq!(run(&mut g, "hello world"), "hello world");
    }

    #[test]
    fn test_function_at_start_only() {
        let mut g = game();
        assert_eq!(run(&mut g, "add(1,2)"), "3");
        assert_eq!(run(&mut g, "x add(1,2)"), "x add(1,2)");
        assert_eq!(run(&mut g, "x [add(1,2)]"), "x 3");
    }

    #[test]
    fn test_nested_brackets() {
        let mut g = game();
        assert_eq!(run(&mut g, "[add(1,[add(2,3)])]"), "6");
    }

    #[test]
    fn test_substitutions() {
        let mut g = game();
        assert_eq!(run(&mut g, "%!"), "#1");
        assert_eq!(run(&mut g, "%#"), "#1");
        assert_eq!(run(&mut g, "%n"), "God");
        assert_eq!(run(&mut g, "%%"), "%");
        assert_eq!(run(&mut g, "a%bb"), "a b");
        assert_eq!(run(&mut g, "a%rb"), "a\nb");
        assert_eq!(run(&mut g, "a%tb"), "a\tb");
    }

    #[test]
    fn test_registers() {
        let mut g = game();
        assert_eq!(run(&mut g, "[setq(0,hello)]%q0"), "hello");
        assert_eq!(run(&mut g, "[setq(a,world)]%qa"), "world");
    }

    #[test]
    fn test_braces_protect() {
        let mut g = game();
        assert_eq!(run(&mut g, "{add(1,2)}"), "{add(1,2)}");
        assert_eq!(run(&mut g, "{%r}"), "{%r}");
    }

    #[test]
    fn test_escape() {
        let mut g = game();
        assert_eq!(run(&mut g, "\\%n"), "%n");
    }

    #[test]
    fn test_legacy_v_registers() {
        let mut g = game();
        let va = g.world.attrs.catalog_mut().mkattr("VA").unwrap();
        g.world
            .atr_set_raw(1, va, AttrValue::new("stashed", 1, AttrFlags::empty()));
        assert_eq!(run(&mut g, "%va"), "stashed");
    }

    #[test]
    fn test_unknown_function() {
        let mut g = game();
        assert_eq!(
            run(&mut g, "[nosuchfn(1)]"),
            "#-1 FUNCTION (NOSUCHFN) NOT FOUND"
        );
    }

    #[test]
    fn test_arity_error() {
        let mut g = game();
        assert_eq!(
            run(&mut g, "[strlen()]"),
            "#-1 FUNCTION (STRLEN) EXPECTS 1 ARGUMENTS"
        );
    }

    #[test]
    fn test_numbers_error() {
        let mut g = game();
        assert_eq!(run(&mut g, "[add(1,foo)]"), E_ARGS_MUST_BE_NUMBERS);
    }

    #[test]
    fn test_recursion_limit() {
        let mut g = game();
        g.world.cfg.limits.func_nest_lim = 5;
        // u(me/boom) calls itself forever.
        let boom = g.world.attrs.catalog_mut().mkattr("BOOM").unwrap();
        g.world
            .atr_set_raw(1, boom, AttrValue::new("[u(me/boom)]", 1, AttrFlags::empty()));
        let out = run(&mut g, "[u(me/boom)]");
        assert!(out.contains(E_RECURSION_LIMIT), "got: {}", out);
    }

    #[test]
    fn test_invocation_limit() {
        let mut g = game();
        g.world.cfg.limits.func_invk_lim = 2;
        // The third sequential call breaches.
        let out = run(&mut g, "[setq(a,1)][setq(a,2)][add(1,2)]");
        assert!(out.contains(E_INVOCATION_LIMIT), "got: {}", out);
        // A breach nested under add() degrades into its numbers error.
        let out = run(&mut g, "[add(1,add(1,add(1,add(1,1))))]");
        assert!(out.contains(E_ARGS_MUST_BE_NUMBERS), "got: {}", out);
    }

    #[test]
    fn test_output_bounded() {
        let mut g = game();
        // Build something larger than an LBUF by repeated concatenation.
        let big = "x".repeat(4000);
        let out = run(&mut g, &format!("[cat({b},{b},{b})]", b = big));
        assert!(out.len() <= pool::LBUF_SIZE - 1);
        assert!(out.ends_with(E_STRING_TOO_LONG));
    }

    #[test]
    fn test_unbalanced_call_copies_literally() {
        let mut g = game();
        assert_eq!(run(&mut g, "add(1,2"), "add(1,2");
    }
}
