//! Versioned text checkpoint of the whole world.
//!
//! `+V<n>` header, user attribute definitions, then one record per dbref
//! in ascending order: a `!<dbref>` marker, one fixed metadata line, the
//! attribute lines, and a `<` terminator. The file ends with an explicit
//! end-of-dump marker so a truncated checkpoint is detectable.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use common::err::{CResult, MuxError};
use common::strings::strip_color;

use crate::attr::{AttrFlags, AttrNum, AttrValue, A_NAME};
use crate::object::{Dbref, ObjFlags, Object, ObjectType, Powers, NOTHING};
use crate::world::World;

const VERSION: u32 = 1;
const END_MARKER: &str = "***END OF DUMP***";

fn escape_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

/// Serialize the world to `path`. Dirty attribute state is flushed to
/// the store first so the checkpoint and the store agree.
pub fn dump<P: AsRef<Path>>(w: &mut World, path: P) -> CResult<()> {
    w.al_store()?;

    let file = File::create(path.as_ref())?;
    let mut out = BufWriter::new(file);

    writeln!(out, "+V{}", VERSION)?;

    let user_defs: Vec<(AttrNum, u32, String)> = w
        .attrs
        .catalog()
        .user_defs()
        .map(|d| (d.num, d.flags.bits(), d.name.clone()))
        .collect();
    for (num, flags, name) in user_defs {
        writeln!(out, "+A{}:{}", num, flags)?;
        writeln!(out, "{}", name)?;
    }

    for d in 0..w.db.db_top() {
        let Some(o) = w.db.slot(d) else { continue };
        writeln!(out, "!{}", d)?;
        let kind_code: u8 = o.kind.into();
        writeln!(
            out,
            "{} {} {} {} {} {} {} {} {} {} {} {} {} {}",
            kind_code,
            o.owner,
            o.zone,
            o.parent,
            o.location,
            o.contents,
            o.exits,
            o.next,
            o.home,
            o.pennies,
            o.flags.bits(),
            o.powers.bits(),
            o.created,
            o.modified,
        )?;
        if o.kind != ObjectType::Garbage {
            for a in w.attrs.iterate(d) {
                let v = w.attrs.get(d, a);
                writeln!(out, "> {} {} {}", a, v.owner, v.flags.bits())?;
                writeln!(out, "{}", escape_value(&v.text))?;
            }
        }
        writeln!(out, "<")?;
    }

    writeln!(out, "{}", END_MARKER)?;
    out.flush()?;
    info!(path = %path.as_ref().display(), objects = w.db.db_top(), "checkpoint written");
    Ok(())
}

fn parse_fields(line: &str) -> CResult<Vec<i64>> {
    line.split_whitespace()
        .map(|t| {
            t.parse::<i64>()
                .map_err(|_| MuxError::Corrupt(format!("bad metadata field: {}", t)))
        })
        .collect()
}

fn next_line(lines: &mut impl Iterator<Item = std::io::Result<String>>) -> CResult<String> {
    match lines.next() {
        Some(l) => Ok(l?),
        None => Err(MuxError::Corrupt("flatfile truncated".to_string())),
    }
}

/// Load a checkpoint into a fresh world. The attribute backend of `w`
/// receives every stored value, so loading into a paged world rebuilds
/// the store as a side effect.
pub fn load_into<P: AsRef<Path>>(w: &mut World, path: P) -> CResult<()> {
    let file = File::open(path.as_ref())?;
    let mut lines = BufReader::new(file).lines();

    let header = next_line(&mut lines)?;
    let version: u32 = header
        .strip_prefix("+V")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| MuxError::Corrupt(format!("bad flatfile header: {}", header)))?;
    if version != VERSION {
        return Err(MuxError::Corrupt(format!(
            "flatfile version {} unsupported",
            version
        )));
    }

    let mut saw_end = false;
    let mut current: Dbref = NOTHING;
    while let Some(line) = lines.next() {
        let line = line?;
        if line == END_MARKER {
            saw_end = true;
            break;
        }
        if let Some(rest) = line.strip_prefix("+A") {
            let (num, flags) = rest
                .split_once(':')
                .ok_or_else(|| MuxError::Corrupt(format!("bad attribute record: {}", line)))?;
            let num: AttrNum = num
                .parse()
                .map_err(|_| MuxError::Corrupt(format!("bad attribute number: {}", line)))?;
            let flags: u32 = flags
                .parse()
                .map_err(|_| MuxError::Corrupt(format!("bad attribute flags: {}", line)))?;
            let name = next_line(&mut lines)?;
            w.attrs
                .catalog_mut()
                .restore(num, &name, AttrFlags::from_bits_truncate(flags))?;
            continue;
        }
        if let Some(dbref) = line.strip_prefix('!') {
            current = dbref
                .parse()
                .map_err(|_| MuxError::Corrupt(format!("bad object marker: {}", line)))?;
            let meta = next_line(&mut lines)?;
            let f = parse_fields(&meta)?;
            if f.len() != 14 {
                return Err(MuxError::Corrupt(format!(
                    "object {}: expected 14 metadata fields, got {}",
                    current,
                    f.len()
                )));
            }
            let kind = ObjectType::try_from(f[0] as u8)
                .map_err(|_| MuxError::Corrupt(format!("object {}: bad type {}", current, f[0])))?;
            let mut o = Object::new(kind, f[1] as Dbref, f[12]);
            o.zone = f[2] as Dbref;
            o.parent = f[3] as Dbref;
            o.location = f[4] as Dbref;
            o.contents = f[5] as Dbref;
            o.exits = f[6] as Dbref;
            o.next = f[7] as Dbref;
            o.home = f[8] as Dbref;
            o.pennies = f[9] as i32;
            o.flags = ObjFlags::from_bits_truncate(f[10] as u32);
            o.powers = Powers::from_bits_truncate(f[11] as u32);
            o.modified = f[13];
            w.db.install(current, o);
            continue;
        }
        if let Some(rest) = line.strip_prefix("> ") {
            if current == NOTHING {
                return Err(MuxError::Corrupt(
                    "attribute line outside object record".to_string(),
                ));
            }
            let f = parse_fields(rest)?;
            if f.len() != 3 {
                return Err(MuxError::Corrupt(format!("bad attribute line: {}", line)));
            }
            let value_line = next_line(&mut lines)?;
            w.atr_set_raw(
                current,
                f[0] as AttrNum,
                AttrValue::new(
                    unescape_value(&value_line),
                    f[1] as Dbref,
                    AttrFlags::from_bits_truncate(f[2] as u32),
                ),
            );
            continue;
        }
        if line == "<" {
            current = NOTHING;
            continue;
        }
        warn!(line = %line, "unrecognized flatfile line skipped");
    }

    if !saw_end {
        return Err(MuxError::Corrupt("flatfile missing end marker".to_string()));
    }

    // Display names mirror A_NAME; the free chain rebuilds from the
    // GARBAGE slots.
    for d in 0..w.db.db_top() {
        if w.db.good(d) {
            let name = strip_color(&w.attrs.get(d, A_NAME).text);
            if let Some(o) = w.db.fetch_mut(d) {
                o.name = name;
            }
        }
    }
    w.db.relink_free_chain();
    info!(path = %path.as_ref().display(), objects = w.db.db_top(), "flatfile loaded");
    Ok(())
}
