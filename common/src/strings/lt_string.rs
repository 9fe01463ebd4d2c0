//! Length-tagged string: visible text kept separately from color, with a
//! per-codepoint color state array and cursors that track both byte and
//! codepoint offsets. This is the shape every sizing and truncation
//! decision is made in; raw text with in-band codes is only the transport
//! form.

use super::color::{is_color_cp, ColorState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrCursor {
    pub byte: usize,
    pub point: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LtString {
    /// Visible text only; color codes never appear here.
    text: String,
    points: usize,
    /// One state per codepoint of `text`; empty when the whole string is
    /// plain.
    colors: Vec<ColorState>,
}

impl LtString {
    /// Parse transport text: color codes fold into the running state, and
    /// each visible codepoint records the state in force where it sits.
    pub fn import(src: &str) -> LtString {
        let mut text = String::with_capacity(src.len());
        let mut colors = Vec::new();
        let mut points = 0usize;
        let mut state = ColorState::PLAIN;
        let mut any_color = false;
        for ch in src.chars() {
            if is_color_cp(ch) {
                state = state.apply(ch);
                any_color = true;
                continue;
            }
            text.push(ch);
            colors.push(state);
            points += 1;
        }
        if !any_color && colors.iter().all(|c| c.is_plain()) {
            colors.clear();
        }
        LtString {
            text,
            points,
            colors,
        }
    }

    #[inline]
    pub fn n_bytes(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn n_points(&self) -> usize {
        self.points
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points == 0
    }

    /// The stripped text.
    #[inline]
    pub fn plain(&self) -> &str {
        &self.text
    }

    pub fn color_at(&self, point: usize) -> ColorState {
        self.colors.get(point).copied().unwrap_or(ColorState::PLAIN)
    }

    pub fn cursor_start(&self) -> StrCursor {
        StrCursor::default()
    }

    pub fn cursor_end(&self) -> StrCursor {
        StrCursor {
            byte: self.text.len(),
            point: self.points,
        }
    }

    /// Codepoint under the cursor plus the cursor one step forward.
    pub fn cursor_next(&self, cur: StrCursor) -> Option<(char, StrCursor)> {
        let ch = self.text[cur.byte..].chars().next()?;
        Some((
            ch,
            StrCursor {
                byte: cur.byte + ch.len_utf8(),
                point: cur.point + 1,
            },
        ))
    }

    pub fn cursor_prev(&self, cur: StrCursor) -> Option<(char, StrCursor)> {
        let ch = self.text[..cur.byte].chars().next_back()?;
        Some((
            ch,
            StrCursor {
                byte: cur.byte - ch.len_utf8(),
                point: cur.point - 1,
            },
        ))
    }

    /// Drop everything at and after `points`.
    pub fn truncate(&mut self, points: usize) {
        if points >= self.points {
            return;
        }
        let byte = self
            .text
            .char_indices()
            .nth(points)
            .map(|(b, _)| b)
            .unwrap_or(self.text.len());
        self.text.truncate(byte);
        self.points = points;
        if !self.colors.is_empty() {
            self.colors.truncate(points);
        }
    }

    /// Transport form: minimal color codes re-inserted at state changes,
    /// with a trailing reset when the text ends colored.
    pub fn export(&self) -> String {
        if self.colors.is_empty() {
            return self.text.clone();
        }
        let mut out = String::with_capacity(self.text.len() + 8);
        let mut state = ColorState::PLAIN;
        for (i, ch) in self.text.chars().enumerate() {
            let want = self.color_at(i);
            if want != state {
                // Anything dropped forces a reset-and-rebuild.
                out.push(super::color::COLOR_RESET);
                want.emit_codes(&mut out);
                state = want;
            }
            out.push(ch);
        }
        if !state.is_plain() {
            out.push(super::color::COLOR_RESET);
        }
        out
    }

    pub fn append(&mut self, other: &LtString) {
        if self.colors.is_empty() && !other.colors.is_empty() {
            self.colors = vec![ColorState::PLAIN; self.points];
        }
        self.text.push_str(&other.text);
        self.points += other.points;
        if !self.colors.is_empty() {
            if other.colors.is_empty() {
                self.colors
                    .extend(std::iter::repeat(ColorState::PLAIN).take(other.points));
            } else {
                self.colors.extend_from_slice(&other.colors);
            }
        }
    }
}

/// Truncate transport text to fit both a byte budget and a visual-width
/// budget, keeping codepoints whole and color balanced. Returns the
/// truncated transport text and its visual width.
pub fn truncate_to_field(src: &str, max_bytes: usize, max_points: usize) -> (String, usize) {
    let mut ls = LtString::import(src);
    if ls.n_points() > max_points {
        ls.truncate(max_points);
    }
    let mut out = ls.export();
    while out.len() > max_bytes && ls.n_points() > 0 {
        ls.truncate(ls.n_points() - 1);
        out = ls.export();
    }
    (out, ls.n_points())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::color::{COLOR_FG_RED, COLOR_RESET};

    #[test]
    fn test_import_plain() {
        let ls = LtString::import("abc");
        assert_eq!(ls.n_bytes(), 3);
        assert_eq!(ls.n_points(), 3);
        assert_eq!(ls.plain(), "abc");
        assert_eq!(ls.export(), "abc");
    }

    #[test]
    fn test_import_colored() {
        let src = format!("a{}b{}c", COLOR_FG_RED, COLOR_RESET);
        let ls = LtString::import(&src);
        assert_eq!(ls.n_points(), 3);
        assert!(ls.color_at(0).is_plain());
        assert_eq!(ls.color_at(1).fg(), 1);
        assert!(ls.color_at(2).is_plain());
    }

    #[test]
    fn test_export_round_trip() {
        let src = format!("a{}bc{}d", COLOR_FG_RED, COLOR_RESET);
        let ls = LtString::import(&src);
        let back = LtString::import(&ls.export());
        assert_eq!(back.plain(), ls.plain());
        for i in 0..ls.n_points() {
            assert_eq!(back.color_at(i), ls.color_at(i), "point {}", i);
        }
    }

    #[test]
    fn test_cursor_tracks_bytes_and_points() {
        let ls = LtString::import("a\u{4e2d}b");
        let c0 = ls.cursor_start();
        let (ch, c1) = ls.cursor_next(c0).unwrap();
        assert_eq!(ch, 'a');
        assert_eq!((c1.byte, c1.point), (1, 1));
        let (ch, c2) = ls.cursor_next(c1).unwrap();
        assert_eq!(ch, '\u{4e2d}');
        assert_eq!((c2.byte, c2.point), (4, 2));
        let (ch, _) = ls.cursor_prev(c2).unwrap();
        assert_eq!(ch, '\u{4e2d}');
    }

    #[test]
    fn test_truncate_points() {
        let mut ls = LtString::import("abcdef");
        ls.truncate(2);
        assert_eq!(ls.plain(), "ab");
        assert_eq!(ls.n_points(), 2);
    }

    #[test]
    fn test_truncate_to_field() {
        let (s, vw) = truncate_to_field("hello", 100, 3);
        assert_eq!(s, "hel");
        assert_eq!(vw, 3);

        // Byte budget dominates for multibyte text.
        let (s, vw) = truncate_to_field("\u{4e2d}\u{6587}\u{4e2d}", 6, 10);
        assert_eq!(s, "\u{4e2d}\u{6587}");
        assert_eq!(vw, 2);
    }

    #[test]
    fn test_truncate_to_field_keeps_color_balanced() {
        let src = format!("{}abcdef", COLOR_FG_RED);
        let (s, vw) = truncate_to_field(&src, 100, 3);
        assert_eq!(vw, 3);
        let ls = LtString::import(&s);
        assert_eq!(ls.plain(), "abc");
        assert_eq!(ls.color_at(2).fg(), 1);
        // Exported form ends reset.
        assert!(s.ends_with(COLOR_RESET));
    }
}
