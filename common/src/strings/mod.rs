pub mod classify;
pub mod color;
pub mod lt_string;
pub mod name;

pub use classify::*;
pub use color::{render_ansi, strip_color, ColorState};
pub use lt_string::{LtString, StrCursor};
pub use name::{
    make_canonical_attr_name, make_canonical_exit_name, make_canonical_object_name,
    validate_player_name,
};

/// Codepoint count of the visible text, color codes excluded.
pub fn length_point(s: &str) -> usize {
    s.chars().filter(|&c| !color::is_color_cp(c)).count()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_length_point_plain() {
        assert_eq!(length_point("abc"), 3);
        assert_eq!(length_point("\u{4e2d}\u{6587}!"), 3);
        assert_eq!(length_point(""), 0);
    }

    #[test]
    fn test_length_point_skips_color() {
        let s = format!("{}red{}", color::COLOR_FG_RED, color::COLOR_RESET);
        assert_eq!(length_point(&s), 3);
    }
}
