//! Attribute catalog and the logical `(object, attribute) -> value` store.

pub mod cache;
pub mod pager;

use std::collections::BTreeSet;

use bitflags::bitflags;
use fnv::FnvHashMap;
use once_cell::sync::Lazy;

use common::err::{CResult, MuxError};
use common::strings::make_canonical_attr_name;

use crate::object::{Dbref, NOTHING};

use self::cache::AtrCache;

/// Catalog slot number. Small positive integers; zero is never valid.
pub type AttrNum = u16;

pub const A_NAME: AttrNum = 1;
pub const A_DESC: AttrNum = 2;
pub const A_SUCC: AttrNum = 3;
pub const A_FAIL: AttrNum = 4;
pub const A_OSUCC: AttrNum = 5;
pub const A_OFAIL: AttrNum = 6;
pub const A_ASUCC: AttrNum = 7;
pub const A_AFAIL: AttrNum = 8;
pub const A_DROP: AttrNum = 9;
pub const A_ODROP: AttrNum = 10;
pub const A_ADROP: AttrNum = 11;
pub const A_LOCK: AttrNum = 12;
pub const A_SEMAPHORE: AttrNum = 13;
pub const A_QUOTA: AttrNum = 14;
pub const A_RQUOTA: AttrNum = 15;
pub const A_LAST: AttrNum = 16;

/// First number handed to user-defined attributes.
pub const A_USER_START: AttrNum = 256;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttrFlags: u32 {
        /// Server bookkeeping; unreadable except by God.
        const INTERNAL   = 0x0000_0001;
        const CONST      = 0x0000_0002;
        /// Holds a lock expression, settable only through @lock.
        const IS_LOCK    = 0x0000_0004;
        const DARK       = 0x0000_0008;
        const MDARK      = 0x0000_0010;
        const WIZARD     = 0x0000_0020;
        const GOD        = 0x0000_0040;
        const VISUAL     = 0x0000_0080;
        /// Value locked against change with @lock obj/attr.
        const LOCKED     = 0x0000_1000;
        const NO_INHERIT = 0x0000_0100;
        const NO_COMMAND = 0x0000_0200;
        const HTML       = 0x0000_0400;
        const NONAME     = 0x0000_0800;
    }
}

#[derive(Debug, Clone)]
pub struct AttrDef {
    pub num: AttrNum,
    pub name: String,
    pub flags: AttrFlags,
}

static BUILTIN_ATTRS: Lazy<Vec<AttrDef>> = Lazy::new(|| {
    let def = |num, name: &str, flags| AttrDef {
        num,
        name: name.to_string(),
        flags,
    };
    vec![
        def(A_NAME, "NAME", AttrFlags::NO_COMMAND | AttrFlags::VISUAL | AttrFlags::NONAME),
        def(A_DESC, "DESCRIBE", AttrFlags::NO_COMMAND),
        def(A_SUCC, "SUCC", AttrFlags::empty()),
        def(A_FAIL, "FAIL", AttrFlags::empty()),
        def(A_OSUCC, "OSUCC", AttrFlags::empty()),
        def(A_OFAIL, "OFAIL", AttrFlags::empty()),
        def(A_ASUCC, "ASUCC", AttrFlags::empty()),
        def(A_AFAIL, "AFAIL", AttrFlags::empty()),
        def(A_DROP, "DROP", AttrFlags::empty()),
        def(A_ODROP, "ODROP", AttrFlags::empty()),
        def(A_ADROP, "ADROP", AttrFlags::empty()),
        def(
            A_LOCK,
            "LOCK",
            AttrFlags::IS_LOCK | AttrFlags::NO_COMMAND | AttrFlags::NO_INHERIT,
        ),
        def(
            A_SEMAPHORE,
            "SEMAPHORE",
            AttrFlags::NO_COMMAND | AttrFlags::NO_INHERIT,
        ),
        def(
            A_QUOTA,
            "QUOTA",
            AttrFlags::INTERNAL | AttrFlags::NO_COMMAND | AttrFlags::NO_INHERIT | AttrFlags::GOD,
        ),
        def(
            A_RQUOTA,
            "RQUOTA",
            AttrFlags::INTERNAL | AttrFlags::NO_COMMAND | AttrFlags::NO_INHERIT | AttrFlags::GOD,
        ),
    ]
});

/// The numbered attribute catalog: builtins fixed at startup, user
/// definitions allocated above [`A_USER_START`].
#[derive(Debug)]
pub struct AttrCatalog {
    defs: Vec<Option<AttrDef>>,
    by_name: FnvHashMap<String, AttrNum>,
    next_user: AttrNum,
}

impl Default for AttrCatalog {
    fn default() -> Self {
        AttrCatalog::new()
    }
}

impl AttrCatalog {
    pub fn new() -> Self {
        let mut cat = AttrCatalog {
            defs: Vec::new(),
            by_name: FnvHashMap::default(),
            next_user: A_USER_START,
        };
        for d in BUILTIN_ATTRS.iter() {
            cat.install(d.clone());
        }
        cat
    }

    fn install(&mut self, def: AttrDef) {
        let idx = def.num as usize;
        if self.defs.len() <= idx {
            self.defs.resize(idx + 1, None);
        }
        self.by_name.insert(def.name.clone(), def.num);
        self.defs[idx] = Some(def);
    }

    pub fn atr_num(&self, n: AttrNum) -> Option<&AttrDef> {
        self.defs.get(n as usize).and_then(|d| d.as_ref())
    }

    /// Case-insensitive lookup by name.
    pub fn atr_str(&self, name: &str) -> Option<&AttrDef> {
        let canonical = make_canonical_attr_name(name)?;
        let num = *self.by_name.get(&canonical)?;
        self.atr_num(num)
    }

    /// Find or create a user attribute definition.
    pub fn mkattr(&mut self, name: &str) -> CResult<AttrNum> {
        let canonical = make_canonical_attr_name(name)
            .ok_or_else(|| MuxError::Error(format!("bad attribute name: {}", name)))?;
        if let Some(&num) = self.by_name.get(&canonical) {
            return Ok(num);
        }
        let num = self.next_user;
        self.next_user = self
            .next_user
            .checked_add(1)
            .ok_or_else(|| MuxError::Error("attribute catalog full".to_string()))?;
        self.install(AttrDef {
            num,
            name: canonical,
            flags: AttrFlags::empty(),
        });
        Ok(num)
    }

    /// Install a user definition read back from a flatfile.
    pub fn restore(&mut self, num: AttrNum, name: &str, flags: AttrFlags) -> CResult<()> {
        if num < A_USER_START {
            return Err(MuxError::Corrupt(format!(
                "user attribute {} below user range",
                num
            )));
        }
        self.install(AttrDef {
            num,
            name: name.to_string(),
            flags,
        });
        if num >= self.next_user {
            self.next_user = num + 1;
        }
        Ok(())
    }

    pub fn set_flags(&mut self, num: AttrNum, flags: AttrFlags) {
        if let Some(Some(def)) = self.defs.get_mut(num as usize) {
            def.flags = flags;
        }
    }

    /// User-defined entries in numeric order, for the flatfile writer.
    pub fn user_defs(&self) -> impl Iterator<Item = &AttrDef> {
        self.defs
            .iter()
            .filter_map(|d| d.as_ref())
            .filter(|d| d.num >= A_USER_START)
    }
}

/// One stored value with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrValue {
    pub text: String,
    pub owner: Dbref,
    pub flags: AttrFlags,
}

impl AttrValue {
    pub fn new(text: impl Into<String>, owner: Dbref, flags: AttrFlags) -> Self {
        AttrValue {
            text: text.into(),
            owner,
            flags,
        }
    }

    pub fn empty() -> Self {
        AttrValue {
            text: String::new(),
            owner: NOTHING,
            flags: AttrFlags::empty(),
        }
    }
}

#[inline]
pub fn pack_key(o: Dbref, a: AttrNum) -> u64 {
    ((o as u32 as u64) << 32) | a as u64
}

#[inline]
pub fn unpack_key(key: u64) -> (Dbref, AttrNum) {
    ((key >> 32) as u32 as Dbref, (key & 0xFFFF) as AttrNum)
}

#[derive(Debug)]
enum Backend {
    /// Standalone mode: everything stays in memory.
    Mem(FnvHashMap<u64, AttrValue>),
    /// Normal mode: LRU cache over the hash-chained file.
    Paged(AtrCache),
}

/// Catalog plus value store plus the per-object secondary index.
#[derive(Debug)]
pub struct AttrSpace {
    catalog: AttrCatalog,
    backend: Backend,
    /// Which attributes each object defines. Mirrors the store exactly.
    lists: FnvHashMap<Dbref, BTreeSet<AttrNum>>,
}

impl AttrSpace {
    pub fn in_memory() -> Self {
        AttrSpace {
            catalog: AttrCatalog::new(),
            backend: Backend::Mem(FnvHashMap::default()),
            lists: FnvHashMap::default(),
        }
    }

    pub fn paged(cache: AtrCache) -> Self {
        AttrSpace {
            catalog: AttrCatalog::new(),
            backend: Backend::Paged(cache),
            lists: FnvHashMap::default(),
        }
    }

    pub fn catalog(&self) -> &AttrCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut AttrCatalog {
        &mut self.catalog
    }

    /// Fetch a value. Never fails: an absent entry reads as empty.
    pub fn get(&mut self, o: Dbref, a: AttrNum) -> AttrValue {
        let key = pack_key(o, a);
        let found = match &mut self.backend {
            Backend::Mem(map) => map.get(&key).cloned(),
            Backend::Paged(cache) => cache.get(key).unwrap_or_default(),
        };
        found.unwrap_or_else(AttrValue::empty)
    }

    /// Metadata without the text; `None` when the attribute is absent.
    pub fn info(&mut self, o: Dbref, a: AttrNum) -> Option<(Dbref, AttrFlags)> {
        if !self.defines(o, a) {
            return None;
        }
        let v = self.get(o, a);
        Some((v.owner, v.flags))
    }

    /// Store a value. An empty value deletes the entry; both directions
    /// keep the attribute list in step.
    pub fn set(&mut self, o: Dbref, a: AttrNum, value: AttrValue) {
        let key = pack_key(o, a);
        if value.text.is_empty() {
            match &mut self.backend {
                Backend::Mem(map) => {
                    map.remove(&key);
                }
                Backend::Paged(cache) => cache.delete(key),
            }
            if let Some(list) = self.lists.get_mut(&o) {
                list.remove(&a);
                if list.is_empty() {
                    self.lists.remove(&o);
                }
            }
        } else {
            match &mut self.backend {
                Backend::Mem(map) => {
                    map.insert(key, value);
                }
                Backend::Paged(cache) => cache.put(key, value),
            }
            self.lists.entry(o).or_default().insert(a);
        }
    }

    pub fn defines(&self, o: Dbref, a: AttrNum) -> bool {
        self.lists.get(&o).map(|l| l.contains(&a)).unwrap_or(false)
    }

    /// Attribute numbers defined on `o`, ascending.
    pub fn iterate(&self, o: Dbref) -> Vec<AttrNum> {
        self.lists
            .get(&o)
            .map(|l| l.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove every attribute on `o`.
    pub fn wipe(&mut self, o: Dbref) {
        for a in self.iterate(o) {
            self.set(o, a, AttrValue::empty());
        }
    }

    /// Push dirty cache entries to disk. The in-memory backend has
    /// nothing to do.
    pub fn flush(&mut self) -> CResult<()> {
        match &mut self.backend {
            Backend::Mem(_) => Ok(()),
            Backend::Paged(cache) => cache.flush_all(),
        }
    }

    /// Rebuild the secondary index by scanning the backend; used after a
    /// flatfile load populates the store directly.
    pub fn rebuild_lists(&mut self) -> CResult<()> {
        self.lists.clear();
        let keys: Vec<u64> = match &mut self.backend {
            Backend::Mem(map) => map.keys().copied().collect(),
            Backend::Paged(cache) => cache.all_keys()?,
        };
        for key in keys {
            let (o, a) = unpack_key(key);
            self.lists.entry(o).or_default().insert(a);
        }
        Ok(())
    }
}
