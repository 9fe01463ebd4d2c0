//! Name canonicalization for objects, exits, players, and attributes.

use pool::MBUF_SIZE;

use super::classify::{
    fold_upper_ascii, is_attrname_cp, is_objectname_cp, is_playername_cp, is_space,
};
use super::color::strip_color;
use super::lt_string::truncate_to_field;

/// Names a user could type that the matcher already owns.
fn is_reserved(stripped: &str) -> bool {
    matches!(stripped, "me" | "home" | "here")
}

fn bad_first_char(ch: char) -> bool {
    matches!(ch, '*' | '!' | '#') || is_space(ch)
}

/// Validate and canonicalize a thing/room name. Color is allowed; the
/// visible part must be non-empty, start and end on legal characters,
/// stay within the object-name class, and avoid the reserved words.
pub fn make_canonical_object_name(name: &str) -> Option<String> {
    let (buf, visual_width) = truncate_to_field(name, MBUF_SIZE - 1, MBUF_SIZE - 1);

    // Pure color with nothing visible is not a name.
    if visual_width == 0 {
        return None;
    }

    let stripped = strip_color(&buf);
    let first = stripped.chars().next()?;
    let last = stripped.chars().next_back()?;
    if bad_first_char(first) || is_space(last) {
        return None;
    }

    if !stripped.chars().all(is_objectname_cp) {
        return None;
    }

    if is_reserved(&stripped) {
        return None;
    }

    Some(buf)
}

/// Validate and canonicalize an exit name: semicolon-separated segments,
/// the first of which supplies the display name and is the only one that
/// may carry color. Invalid later segments are dropped rather than
/// failing the whole name.
pub fn make_canonical_exit_name(name: &str) -> Option<String> {
    let mut out = String::new();
    let mut have_display = false;

    for (i, segment) in name.split(';').enumerate() {
        let candidate = if i == 0 {
            segment.to_string()
        } else {
            // Color only rides in the display segment.
            strip_color(segment)
        };
        let Some(canonical) = make_canonical_object_name(&candidate) else {
            continue;
        };
        if have_display {
            if out.len() + 1 + canonical.len() < MBUF_SIZE {
                out.push(';');
                out.push_str(&canonical);
            }
        } else {
            out.push_str(&canonical);
            have_display = true;
        }
    }

    if have_display {
        Some(out)
    } else {
        None
    }
}

/// Player names carry no color and are bounded by `limit` codepoints;
/// spaces are legal only when `spaces_ok` is configured.
pub fn validate_player_name(name: &str, limit: usize, spaces_ok: bool) -> bool {
    let n = name.chars().count();
    if n == 0 || limit <= n {
        return false;
    }

    let first = match name.chars().next() {
        Some(c) => c,
        None => return false,
    };
    let last = match name.chars().next_back() {
        Some(c) => c,
        None => return false,
    };
    if bad_first_char(first) || is_space(last) {
        return false;
    }

    let body_ok = if spaces_ok {
        name.chars().all(|c| is_playername_cp(c) || c == ' ')
    } else {
        name.chars().all(is_playername_cp)
    };
    if !body_ok {
        return false;
    }

    !is_reserved(name)
}

/// Attribute names fold to uppercase ASCII and must fit the attribute
/// name class throughout.
pub fn make_canonical_attr_name(name: &str) -> Option<String> {
    let stripped = strip_color(name);
    if stripped.is_empty() {
        return None;
    }
    if !stripped.chars().all(is_attrname_cp) {
        return None;
    }
    Some(fold_upper_ascii(&stripped))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::color::{COLOR_FG_RED, COLOR_RESET};

    #[test]
    fn test_object_name_accepts_plain() {
        assert_eq!(
            make_canonical_object_name("Widget").as_deref(),
            Some("Widget")
        );
        assert_eq!(
            make_canonical_object_name("A fine hat").as_deref(),
            Some("A fine hat")
        );
    }

    #[test]
    fn test_object_name_rejects_bad_edges() {
        assert!(make_canonical_object_name("*Widget").is_none());
        assert!(make_canonical_object_name("!Widget").is_none());
        assert!(make_canonical_object_name("#42").is_none());
        assert!(make_canonical_object_name(" Widget").is_none());
        assert!(make_canonical_object_name("Widget ").is_none());
        assert!(make_canonical_object_name("").is_none());
    }

    #[test]
    fn test_object_name_rejects_reserved() {
        assert!(make_canonical_object_name("me").is_none());
        assert!(make_canonical_object_name("home").is_none());
        assert!(make_canonical_object_name("here").is_none());
    }

    #[test]
    fn test_object_name_rejects_tokens() {
        assert!(make_canonical_object_name("a,b").is_none());
        assert!(make_canonical_object_name("a&b").is_none());
        assert!(make_canonical_object_name("a|b").is_none());
    }

    #[test]
    fn test_object_name_rejects_pure_color() {
        let s = format!("{}{}", COLOR_FG_RED, COLOR_RESET);
        assert!(make_canonical_object_name(&s).is_none());
    }

    #[test]
    fn test_object_name_idempotent() {
        let colored = format!("{}Widget{}", COLOR_FG_RED, COLOR_RESET);
        let once = make_canonical_object_name(&colored).unwrap();
        let twice = make_canonical_object_name(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_exit_name_segments() {
        assert_eq!(
            make_canonical_exit_name("North;n;no").as_deref(),
            Some("North;n;no")
        );
        // Invalid segments drop out.
        assert_eq!(
            make_canonical_exit_name("North;;n").as_deref(),
            Some("North;n")
        );
        assert!(make_canonical_exit_name(";;").is_none());
    }

    #[test]
    fn test_exit_name_strips_color_after_first_segment() {
        let src = format!("{}North{};{}n{}", COLOR_FG_RED, COLOR_RESET, COLOR_FG_RED, COLOR_RESET);
        let out = make_canonical_exit_name(&src).unwrap();
        let mut segments = out.split(';');
        let display = segments.next().unwrap();
        let alias = segments.next().unwrap();
        assert!(display.contains(COLOR_FG_RED));
        assert_eq!(alias, "n");
    }

    #[test]
    fn test_player_name() {
        assert!(validate_player_name("Wizard", 22, false));
        assert!(validate_player_name("Two Words", 22, true));
        assert!(!validate_player_name("Two Words", 22, false));
        assert!(!validate_player_name("", 22, true));
        assert!(!validate_player_name("*bad", 22, true));
        assert!(!validate_player_name("bad ", 22, true));
        assert!(!validate_player_name("me", 22, true));
        // Limit is exclusive.
        assert!(!validate_player_name(&"x".repeat(22), 22, false));
        assert!(validate_player_name(&"x".repeat(21), 22, false));
    }

    #[test]
    fn test_attr_name() {
        assert_eq!(make_canonical_attr_name("foo").as_deref(), Some("FOO"));
        assert_eq!(
            make_canonical_attr_name("Launch-Codes_2").as_deref(),
            Some("LAUNCH-CODES_2")
        );
        assert!(make_canonical_attr_name("has space").is_none());
        assert!(make_canonical_attr_name("").is_none());
        assert!(make_canonical_attr_name("a(b)").is_none());
    }
}
