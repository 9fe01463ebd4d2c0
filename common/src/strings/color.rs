//! Internal color representation.
//!
//! Color travels inside text as private-use codepoints so it can never
//! collide with user content: U+F500.. for attribute codes, U+F600.. for
//! foreground, U+F700.. for background. A [`ColorState`] packs the whole
//! rendering state of one codepoint into 16 bits; ANSI SGR sequences are
//! produced only at output sinks.

use bitflags::bitflags;

pub const COLOR_RESET: char = '\u{F500}';
pub const COLOR_INTENSE: char = '\u{F501}';
pub const COLOR_UNDERLINE: char = '\u{F504}';
pub const COLOR_BLINK: char = '\u{F505}';
pub const COLOR_INVERSE: char = '\u{F507}';

pub const COLOR_FG_BLACK: char = '\u{F600}';
pub const COLOR_FG_RED: char = '\u{F601}';
pub const COLOR_FG_GREEN: char = '\u{F602}';
pub const COLOR_FG_YELLOW: char = '\u{F603}';
pub const COLOR_FG_BLUE: char = '\u{F604}';
pub const COLOR_FG_MAGENTA: char = '\u{F605}';
pub const COLOR_FG_CYAN: char = '\u{F606}';
pub const COLOR_FG_WHITE: char = '\u{F607}';

pub const COLOR_BG_BLACK: char = '\u{F700}';
pub const COLOR_BG_RED: char = '\u{F701}';
pub const COLOR_BG_GREEN: char = '\u{F702}';
pub const COLOR_BG_YELLOW: char = '\u{F703}';
pub const COLOR_BG_BLUE: char = '\u{F704}';
pub const COLOR_BG_MAGENTA: char = '\u{F705}';
pub const COLOR_BG_CYAN: char = '\u{F706}';
pub const COLOR_BG_WHITE: char = '\u{F707}';

const FG_BASE: u32 = 0xF600;
const BG_BASE: u32 = 0xF700;
const ATTR_BASE: u32 = 0xF500;

/// Palette index meaning "no explicit color".
pub const COLOR_INDEX_DEFAULT: u8 = 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ColorAttrs: u8 {
        const INTENSE   = 0x1;
        const UNDERLINE = 0x2;
        const BLINK     = 0x4;
        const INVERSE   = 0x8;
    }
}

/// Packed render state: attribute bits in the low nibble, foreground
/// palette index in bits 4..7, background in bits 8..11.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorState(u16);

impl Default for ColorState {
    fn default() -> Self {
        ColorState::PLAIN
    }
}

impl ColorState {
    pub const PLAIN: ColorState =
        ColorState((COLOR_INDEX_DEFAULT as u16) << 4 | (COLOR_INDEX_DEFAULT as u16) << 8);

    #[inline]
    pub fn attrs(self) -> ColorAttrs {
        ColorAttrs::from_bits_truncate((self.0 & 0xF) as u8)
    }

    #[inline]
    pub fn fg(self) -> u8 {
        ((self.0 >> 4) & 0xF) as u8
    }

    #[inline]
    pub fn bg(self) -> u8 {
        ((self.0 >> 8) & 0xF) as u8
    }

    #[inline]
    pub fn is_plain(self) -> bool {
        self == ColorState::PLAIN
    }

    fn with_attrs(self, attrs: ColorAttrs) -> ColorState {
        ColorState((self.0 & !0xF) | attrs.bits() as u16)
    }

    fn with_fg(self, idx: u8) -> ColorState {
        ColorState((self.0 & !0xF0) | ((idx as u16 & 0xF) << 4))
    }

    fn with_bg(self, idx: u8) -> ColorState {
        ColorState((self.0 & !0xF00) | ((idx as u16 & 0xF) << 8))
    }

    /// Fold one in-band color code into the state. Non-color codepoints
    /// leave the state untouched.
    pub fn apply(self, code: char) -> ColorState {
        let cp = code as u32;
        match code {
            COLOR_RESET => ColorState::PLAIN,
            COLOR_INTENSE => self.with_attrs(self.attrs() | ColorAttrs::INTENSE),
            COLOR_UNDERLINE => self.with_attrs(self.attrs() | ColorAttrs::UNDERLINE),
            COLOR_BLINK => self.with_attrs(self.attrs() | ColorAttrs::BLINK),
            COLOR_INVERSE => self.with_attrs(self.attrs() | ColorAttrs::INVERSE),
            _ if (FG_BASE..FG_BASE + 9).contains(&cp) => self.with_fg((cp - FG_BASE) as u8),
            _ if (BG_BASE..BG_BASE + 9).contains(&cp) => self.with_bg((cp - BG_BASE) as u8),
            _ => self,
        }
    }

    /// The shortest code sequence that recreates this state from plain.
    pub fn emit_codes(self, out: &mut String) {
        let attrs = self.attrs();
        if attrs.contains(ColorAttrs::INTENSE) {
            out.push(COLOR_INTENSE);
        }
        if attrs.contains(ColorAttrs::UNDERLINE) {
            out.push(COLOR_UNDERLINE);
        }
        if attrs.contains(ColorAttrs::BLINK) {
            out.push(COLOR_BLINK);
        }
        if attrs.contains(ColorAttrs::INVERSE) {
            out.push(COLOR_INVERSE);
        }
        if self.fg() != COLOR_INDEX_DEFAULT {
            out.push(char::from_u32(FG_BASE + self.fg() as u32).unwrap_or(COLOR_RESET));
        }
        if self.bg() != COLOR_INDEX_DEFAULT {
            out.push(char::from_u32(BG_BASE + self.bg() as u32).unwrap_or(COLOR_RESET));
        }
    }
}

/// True for any in-band color codepoint.
#[inline]
pub fn is_color_cp(ch: char) -> bool {
    let cp = ch as u32;
    (ATTR_BASE..ATTR_BASE + 8).contains(&cp)
        || (FG_BASE..FG_BASE + 9).contains(&cp)
        || (BG_BASE..BG_BASE + 9).contains(&cp)
}

/// Remove all color codes. Identity on color-free text.
pub fn strip_color(s: &str) -> String {
    if !s.chars().any(is_color_cp) {
        return s.to_string();
    }
    s.chars().filter(|&c| !is_color_cp(c)).collect()
}

/// `%x`-style letter to color code. Uppercase letters select backgrounds.
pub fn letter_to_code(c: char) -> Option<char> {
    let code = match c {
        'n' => COLOR_RESET,
        'h' => COLOR_INTENSE,
        'u' => COLOR_UNDERLINE,
        'f' => COLOR_BLINK,
        'i' => COLOR_INVERSE,
        'x' => COLOR_FG_BLACK,
        'r' => COLOR_FG_RED,
        'g' => COLOR_FG_GREEN,
        'y' => COLOR_FG_YELLOW,
        'b' => COLOR_FG_BLUE,
        'm' => COLOR_FG_MAGENTA,
        'c' => COLOR_FG_CYAN,
        'w' => COLOR_FG_WHITE,
        'X' => COLOR_BG_BLACK,
        'R' => COLOR_BG_RED,
        'G' => COLOR_BG_GREEN,
        'Y' => COLOR_BG_YELLOW,
        'B' => COLOR_BG_BLUE,
        'M' => COLOR_BG_MAGENTA,
        'C' => COLOR_BG_CYAN,
        'W' => COLOR_BG_WHITE,
        _ => return None,
    };
    Some(code)
}

fn push_sgr(out: &mut String, params: &[u8]) {
    out.push('\x1b');
    out.push('[');
    for (i, p) in params.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        out.push_str(&p.to_string());
    }
    out.push('m');
}

fn sgr_params(state: ColorState) -> Vec<u8> {
    let mut params = Vec::new();
    let attrs = state.attrs();
    if attrs.contains(ColorAttrs::INTENSE) {
        params.push(1);
    }
    if attrs.contains(ColorAttrs::UNDERLINE) {
        params.push(4);
    }
    if attrs.contains(ColorAttrs::BLINK) {
        params.push(5);
    }
    if attrs.contains(ColorAttrs::INVERSE) {
        params.push(7);
    }
    if state.fg() != COLOR_INDEX_DEFAULT {
        params.push(30 + state.fg());
    }
    if state.bg() != COLOR_INDEX_DEFAULT {
        params.push(40 + state.bg());
    }
    params
}

/// Render internal color codes as ANSI SGR escapes for a color-capable
/// peer. A reset is appended when the text ends colored. The transition
/// strategy mirrors the original: anything that would need a bit cleared
/// is done as full reset plus rebuild.
pub fn render_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut state = ColorState::PLAIN;
    let mut pending = ColorState::PLAIN;
    let mut dirty = false;
    for ch in s.chars() {
        if is_color_cp(ch) {
            pending = pending.apply(ch);
            dirty = true;
            continue;
        }
        if dirty && pending != state {
            let lost_attr = !state.attrs().difference(pending.attrs()).is_empty()
                || (state.fg() != COLOR_INDEX_DEFAULT && pending.fg() == COLOR_INDEX_DEFAULT)
                || (state.bg() != COLOR_INDEX_DEFAULT && pending.bg() == COLOR_INDEX_DEFAULT);
            if pending.is_plain() || lost_attr {
                push_sgr(&mut out, &[0]);
                if !pending.is_plain() {
                    push_sgr(&mut out, &sgr_params(pending));
                }
            } else {
                push_sgr(&mut out, &sgr_params(pending));
            }
            state = pending;
        }
        dirty = false;
        out.push(ch);
    }
    if !state.is_plain() {
        push_sgr(&mut out, &[0]);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_state_packing() {
        let s = ColorState::PLAIN
            .apply(COLOR_INTENSE)
            .apply(COLOR_FG_RED)
            .apply(COLOR_BG_BLUE);
        assert!(s.attrs().contains(ColorAttrs::INTENSE));
        assert_eq!(s.fg(), 1);
        assert_eq!(s.bg(), 4);
        assert_eq!(s.apply(COLOR_RESET), ColorState::PLAIN);
    }

    #[test]
    fn test_strip_color_identity_on_plain() {
        assert_eq!(strip_color("hello world"), "hello world");
    }

    #[test]
    fn test_strip_color() {
        let s = format!("{}red{} plain", COLOR_FG_RED, COLOR_RESET);
        assert_eq!(strip_color(&s), "red plain");
    }

    #[test]
    fn test_render_ansi() {
        let s = format!("{}r{}n", COLOR_FG_RED, COLOR_RESET);
        assert_eq!(render_ansi(&s), "\x1b[31mr\x1b[0mn");
    }

    #[test]
    fn test_render_ansi_trailing_reset() {
        let s = format!("{}red", COLOR_FG_RED);
        assert_eq!(render_ansi(&s), "\x1b[31mred\x1b[0m");
    }

    #[test]
    fn test_emit_codes_round_trip() {
        let s = ColorState::PLAIN.apply(COLOR_UNDERLINE).apply(COLOR_FG_CYAN);
        let mut codes = String::new();
        s.emit_codes(&mut codes);
        let mut back = ColorState::PLAIN;
        for c in codes.chars() {
            back = back.apply(c);
        }
        assert_eq!(back, s);
    }
}
