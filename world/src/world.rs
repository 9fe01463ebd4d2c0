//! The top-level world value: configuration snapshot, buffer pool,
//! object table, and attribute space, threaded explicitly through every
//! handler. Nothing here is global.

use tracing::{debug, info};

use common::config::MuxConfig;
use common::err::CResult;
use common::strings::{
    make_canonical_exit_name, make_canonical_object_name, strip_color, validate_player_name,
};
use pool::Pool;

use crate::attr::cache::AtrCache;
use crate::attr::pager::AtrPager;
use crate::attr::{AttrDef, AttrFlags, AttrNum, AttrSpace, AttrValue, A_DESC, A_NAME};
use crate::db::Db;
use crate::object::{Dbref, ObjectType, NOTHING};

const ATR_STORE_BUCKETS: u32 = 1024;

#[derive(Debug)]
pub struct World {
    pub cfg: MuxConfig,
    pub pool: Pool,
    pub db: Db,
    pub attrs: AttrSpace,
}

/// Why an attribute write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtrDenied {
    Perm,
    BadAttr,
}

impl World {
    /// Standalone world: attribute values stay in memory.
    pub fn new_in_memory(cfg: MuxConfig) -> Self {
        World {
            pool: Pool::new(),
            db: Db::new(cfg.limits.clone(), cfg.toggles.clone()),
            attrs: AttrSpace::in_memory(),
            cfg,
        }
    }

    /// Normal mode: the LRU-fronted pager backs attribute values.
    pub fn with_store(cfg: MuxConfig) -> CResult<Self> {
        std::fs::create_dir_all(&cfg.base.data_dir)?;
        let pager = AtrPager::open(cfg.base.atr_store_path(), ATR_STORE_BUCKETS)?;
        let cache = AtrCache::new(pager, cfg.limits.atr_cache_size);
        info!(store = %cfg.base.atr_store_path(), "attribute store opened");
        Ok(World {
            pool: Pool::new(),
            db: Db::new(cfg.limits.clone(), cfg.toggles.clone()),
            attrs: AttrSpace::paged(cache),
            cfg,
        })
    }

    // -- naming ------------------------------------------------------------

    /// Set the display name; the canonical copy also lands in A_NAME.
    pub fn set_name(&mut self, d: Dbref, name: &str) {
        let owner = self.db.owner(d);
        if let Some(o) = self.db.fetch_mut(d) {
            o.name = strip_color(name);
            o.modified = crate::db::now_secs();
        }
        self.attrs.set(
            d,
            A_NAME,
            AttrValue::new(name, owner, AttrFlags::empty()),
        );
    }

    // -- attribute reads ---------------------------------------------------

    /// Direct read; absent values are empty.
    pub fn atr_get(&mut self, o: Dbref, a: AttrNum) -> AttrValue {
        if let Some(obj) = self.db.fetch_mut(o) {
            obj.accesses += 1;
        }
        self.attrs.get(o, a)
    }

    /// Read with parent inheritance: the first defining ancestor within
    /// the nest limit supplies the value. Returns the source dbref.
    pub fn atr_pget(&mut self, o: Dbref, a: AttrNum) -> (AttrValue, Dbref) {
        if self.attrs.defines(o, a) {
            return (self.atr_get(o, a), o);
        }
        let no_inherit = self
            .attrs
            .catalog()
            .atr_num(a)
            .map(|d| d.flags.contains(AttrFlags::NO_INHERIT))
            .unwrap_or(false);
        if no_inherit {
            return (AttrValue::empty(), NOTHING);
        }
        for ancestor in self.db.parent_chain(o) {
            if self.attrs.defines(ancestor, a) {
                let v = self.atr_get(ancestor, a);
                if v.flags.contains(AttrFlags::NO_INHERIT) {
                    break;
                }
                return (v, ancestor);
            }
        }
        (AttrValue::empty(), NOTHING)
    }

    fn resolved_info(&mut self, target: Dbref, a: AttrNum, check_parent: bool) -> (Dbref, AttrFlags) {
        let found = if check_parent {
            let (v, src) = self.atr_pget(target, a);
            if src == NOTHING {
                None
            } else {
                Some((v.owner, v.flags))
            }
        } else {
            self.attrs.info(target, a)
        };
        found.unwrap_or((NOTHING, AttrFlags::empty()))
    }

    // -- permission matrix -------------------------------------------------

    pub fn can_read_attr(
        &mut self,
        executor: Dbref,
        target: Dbref,
        a: AttrNum,
        check_parent: bool,
    ) -> bool {
        let Some(def) = self.attrs.catalog().atr_num(a) else {
            return false;
        };
        let def_flags = def.flags;
        let def_num = def.num;
        let (aowner, aflags) = self.resolved_info(target, a, check_parent);

        let m_allow = AttrFlags::VISUAL;
        if def_flags.intersects(m_allow) || aflags.intersects(m_allow) {
            if def_num != A_DESC
                || self.cfg.toggles.read_rem_desc
                || self.db.nearby(executor, target)
            {
                return true;
            }
        }

        if self.db.is_god(executor) {
            return true;
        }
        let m_deny = if self.db.wizroy(executor) {
            AttrFlags::INTERNAL | AttrFlags::DARK
        } else if self.db.owner(executor) == aowner || self.db.examinable(executor, target) {
            AttrFlags::INTERNAL | AttrFlags::DARK | AttrFlags::MDARK
        } else {
            AttrFlags::empty()
        };
        if !m_deny.is_empty() {
            return !def_flags.intersects(m_deny) && !aflags.intersects(m_deny);
        }
        false
    }

    pub fn can_set_attr(&mut self, executor: Dbref, target: Dbref, a: AttrNum) -> bool {
        let Some(def) = self.attrs.catalog().atr_num(a) else {
            return false;
        };
        let def_flags = def.flags;

        let mut m_deny = AttrFlags::INTERNAL | AttrFlags::IS_LOCK | AttrFlags::CONST;
        if !self.db.is_god(executor) {
            if self.db.is_god(target) {
                return false;
            }
            if self.db.wizard(executor) {
                m_deny |= AttrFlags::LOCKED | AttrFlags::GOD;
            } else if self.db.controls(executor, target) {
                m_deny |= AttrFlags::LOCKED | AttrFlags::WIZARD | AttrFlags::GOD;
            } else {
                return false;
            }
        }

        let (_, aflags) = self.resolved_info(target, a, false);
        !def_flags.intersects(m_deny) && !aflags.intersects(m_deny)
    }

    pub fn can_lock_attr(&mut self, executor: Dbref, target: Dbref, a: AttrNum) -> bool {
        let Some(def) = self.attrs.catalog().atr_num(a) else {
            return false;
        };
        let def_flags = def.flags;

        let mut m_deny = AttrFlags::INTERNAL | AttrFlags::IS_LOCK | AttrFlags::CONST;
        if !self.db.is_god(executor) {
            if self.db.is_god(target) {
                return false;
            }
            if self.db.wizard(executor) {
                m_deny |= AttrFlags::GOD;
            } else {
                m_deny |= AttrFlags::WIZARD | AttrFlags::GOD;
            }
        }

        if !self.attrs.defines(target, a) {
            return false;
        }
        let (aowner, aflags) = self.resolved_info(target, a, false);
        if def_flags.intersects(m_deny) || aflags.intersects(m_deny) {
            return false;
        }
        self.db.wizard(executor) || self.db.owner(executor) == aowner
    }

    // -- attribute writes --------------------------------------------------

    /// Permission-checked write. An empty text deletes.
    pub fn atr_set(
        &mut self,
        executor: Dbref,
        target: Dbref,
        a: AttrNum,
        text: &str,
    ) -> Result<(), AtrDenied> {
        if self.attrs.catalog().atr_num(a).is_none() {
            return Err(AtrDenied::BadAttr);
        }
        if !self.can_set_attr(executor, target, a) {
            return Err(AtrDenied::Perm);
        }
        let owner = self.db.owner(executor);
        self.attrs
            .set(target, a, AttrValue::new(text, owner, AttrFlags::empty()));
        self.db.touch(target);
        Ok(())
    }

    /// Unchecked write for the loader and internal bookkeeping.
    pub fn atr_set_raw(&mut self, target: Dbref, a: AttrNum, value: AttrValue) {
        self.attrs.set(target, a, value);
    }

    // -- lifecycles --------------------------------------------------------

    /// Validate the name for the type and allocate the object. The
    /// caller is responsible for costs and placement.
    pub fn create_object(
        &mut self,
        kind: ObjectType,
        owner: Dbref,
        name: &str,
    ) -> Result<Dbref, String> {
        let canonical = match kind {
            ObjectType::Exit => make_canonical_exit_name(name),
            ObjectType::Player => {
                let ok = validate_player_name(
                    name,
                    self.cfg.limits.player_name_limit,
                    self.cfg.toggles.name_spaces,
                );
                if ok {
                    Some(name.to_string())
                } else {
                    None
                }
            }
            _ => make_canonical_object_name(name),
        };
        let Some(canonical) = canonical else {
            return Err("That's a silly name!".to_string());
        };

        let d = self.db.create(kind, owner);
        if kind == ObjectType::Player {
            if let Some(o) = self.db.fetch_mut(d) {
                o.owner = d;
            }
        }
        self.set_name(d, &canonical);
        Ok(d)
    }

    /// Tear an object down: unlink it from its container, relocate its
    /// contents, destroy its exits, wipe attributes, flip to GARBAGE.
    pub fn destroy_object(&mut self, d: Dbref) {
        if !self.db.good(d) {
            return;
        }
        let kind = self.db.kind(d);
        debug!(dbref = d, ?kind, "destroying object");

        // Unlink from wherever it sits.
        let loc = self.db.location(d);
        if loc != NOTHING {
            match kind {
                ObjectType::Exit => {
                    let head = self.db.exits(loc);
                    let new_head = self.db.remove_first(head, d);
                    if let Some(room) = self.db.fetch_mut(loc) {
                        room.exits = new_head;
                    }
                }
                _ => self.db.remove_contents(loc, d),
            }
        }

        // Contents go home; a lost home falls back to the owner.
        for c in self.db.list_members(self.db.contents(d)) {
            let home = self.db.fetch(c).map(|o| o.home).unwrap_or(NOTHING);
            let dest = if self.db.good(home) {
                home
            } else {
                self.db.owner(c)
            };
            self.db.remove_contents(d, c);
            if self.db.good(dest) {
                self.db.add_contents(dest, c);
            }
        }

        // Exits of a dying room die with it.
        for e in self.db.list_members(self.db.exits(d)) {
            self.attrs.wipe(e);
            self.db.free(e);
        }

        self.attrs.wipe(d);
        self.db.free(d);
    }

    /// Flush the attribute-list index and dirty values to the store.
    pub fn al_store(&mut self) -> CResult<()> {
        self.attrs.flush()
    }

    pub fn catalog_def(&self, a: AttrNum) -> Option<&AttrDef> {
        self.attrs.catalog().atr_num(a)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attr::{A_LOCK, A_USER_START};
    use crate::object::{ObjFlags, GOD};

    fn world() -> World {
        World::new_in_memory(MuxConfig::default())
    }

    /// Room #0 and GOD #1 inside it.
    fn seed(w: &mut World) -> (Dbref, Dbref) {
        let room = w
            .create_object(ObjectType::Room, NOTHING, "Limbo")
            .unwrap();
        let god = w.create_object(ObjectType::Player, NOTHING, "God").unwrap();
        if let Some(o) = w.db.fetch_mut(room) {
            o.owner = god;
        }
        w.db.add_contents(room, god);
        (room, god)
    }

    fn mortal(w: &mut World, room: Dbref, name: &str) -> Dbref {
        let p = w.create_object(ObjectType::Player, NOTHING, name).unwrap();
        w.db.add_contents(room, p);
        p
    }

    #[test]
    fn test_set_name_mirrors_attribute() {
        let mut w = world();
        let (_room, god) = seed(&mut w);
        let d = w.create_object(ObjectType::Thing, god, "Widget").unwrap();
        assert_eq!(w.db.name(d), "Widget");
        assert_eq!(w.atr_get(d, A_NAME).text, "Widget");
    }

    #[test]
    fn test_create_object_rejects_bad_names() {
        let mut w = world();
        let (_room, god) = seed(&mut w);
        assert!(w.create_object(ObjectType::Thing, god, "*bad").is_err());
        assert!(w.create_object(ObjectType::Thing, god, "me").is_err());
        assert!(w.create_object(ObjectType::Player, NOTHING, "x y z")
            .is_ok());
    }

    #[test]
    fn test_atr_pget_walks_parents() {
        let mut w = world();
        let (_room, god) = seed(&mut w);
        let parent = w.create_object(ObjectType::Thing, god, "Template").unwrap();
        let child = w.create_object(ObjectType::Thing, god, "Instance").unwrap();
        w.db.set_parent(child, parent).unwrap();

        let foo = w.attrs.catalog_mut().mkattr("FOO").unwrap();
        w.atr_set_raw(parent, foo, AttrValue::new("inherited", god, AttrFlags::empty()));

        let (v, src) = w.atr_pget(child, foo);
        assert_eq!(v.text, "inherited");
        assert_eq!(src, parent);

        // A local value wins.
        w.atr_set_raw(child, foo, AttrValue::new("own", god, AttrFlags::empty()));
        let (v, src) = w.atr_pget(child, foo);
        assert_eq!(v.text, "own");
        assert_eq!(src, child);
    }

    #[test]
    fn test_atr_pget_honors_no_inherit() {
        let mut w = world();
        let (_room, god) = seed(&mut w);
        let parent = w.create_object(ObjectType::Thing, god, "Template").unwrap();
        let child = w.create_object(ObjectType::Thing, god, "Instance").unwrap();
        w.db.set_parent(child, parent).unwrap();

        let foo = w.attrs.catalog_mut().mkattr("FOO").unwrap();
        w.atr_set_raw(
            parent,
            foo,
            AttrValue::new("private", god, AttrFlags::NO_INHERIT),
        );
        let (v, src) = w.atr_pget(child, foo);
        assert_eq!(v.text, "");
        assert_eq!(src, NOTHING);
    }

    #[test]
    fn test_read_permission_matrix() {
        let mut w = world();
        let (room, god) = seed(&mut w);
        let alice = mortal(&mut w, room, "Alice");
        let bob = mortal(&mut w, room, "Bob");
        let toy = w.create_object(ObjectType::Thing, alice, "Toy").unwrap();
        w.db.add_contents(room, toy);

        let secret = w.attrs.catalog_mut().mkattr("SECRET").unwrap();
        w.atr_set_raw(toy, secret, AttrValue::new("hush", alice, AttrFlags::empty()));

        // Owner reads; a stranger does not; wizards do.
        assert!(w.can_read_attr(alice, toy, secret, false));
        assert!(!w.can_read_attr(bob, toy, secret, false));
        assert!(w.can_read_attr(god, toy, secret, false));

        // VISUAL opens it to everyone.
        w.atr_set_raw(toy, secret, AttrValue::new("hush", alice, AttrFlags::VISUAL));
        assert!(w.can_read_attr(bob, toy, secret, false));

        // INTERNAL is closed to all but God.
        w.atr_set_raw(toy, secret, AttrValue::new("hush", alice, AttrFlags::INTERNAL));
        assert!(!w.can_read_attr(alice, toy, secret, false));
        let wiz = mortal(&mut w, room, "Wendy");
        w.db.set_flag(wiz, ObjFlags::WIZARD, true);
        assert!(!w.can_read_attr(wiz, toy, secret, false));
        assert!(w.can_read_attr(GOD, toy, secret, false));
    }

    #[test]
    fn test_set_permission_matrix() {
        let mut w = world();
        let (room, _god) = seed(&mut w);
        let alice = mortal(&mut w, room, "Alice");
        let bob = mortal(&mut w, room, "Bob");
        let toy = w.create_object(ObjectType::Thing, alice, "Toy").unwrap();

        let foo = w.attrs.catalog_mut().mkattr("FOO").unwrap();
        assert!(w.atr_set(alice, toy, foo, "mine").is_ok());
        assert_eq!(w.atr_get(toy, foo).text, "mine");
        assert_eq!(w.atr_set(bob, toy, foo, "stolen"), Err(AtrDenied::Perm));

        // Lock attributes refuse ordinary writes for everyone.
        assert_eq!(w.atr_set(alice, toy, A_LOCK, "x"), Err(AtrDenied::Perm));
        assert_eq!(w.atr_set(GOD, toy, A_LOCK, "x"), Err(AtrDenied::Perm));

        // Wizard-flagged values resist their controller.
        w.atr_set_raw(toy, foo, AttrValue::new("held", alice, AttrFlags::WIZARD));
        assert_eq!(w.atr_set(alice, toy, foo, "no"), Err(AtrDenied::Perm));
        let wiz = mortal(&mut w, room, "Wendy");
        w.db.set_flag(wiz, ObjFlags::WIZARD, true);
        assert!(w.atr_set(wiz, toy, foo, "yes").is_ok());
    }

    #[test]
    fn test_set_then_get_and_delete() {
        let mut w = world();
        let (_room, god) = seed(&mut w);
        let toy = w.create_object(ObjectType::Thing, god, "Toy").unwrap();
        let foo = w.attrs.catalog_mut().mkattr("FOO").unwrap();

        w.atr_set(god, toy, foo, "bar").unwrap();
        assert_eq!(w.atr_get(toy, foo).text, "bar");
        assert!(w.attrs.iterate(toy).contains(&foo));

        w.atr_set(god, toy, foo, "").unwrap();
        assert_eq!(w.atr_get(toy, foo).text, "");
        assert!(!w.attrs.iterate(toy).contains(&foo));
    }

    #[test]
    fn test_destroy_relocates_contents() {
        let mut w = world();
        let (room, god) = seed(&mut w);
        let box_ = w.create_object(ObjectType::Thing, god, "Box").unwrap();
        w.db.add_contents(room, box_);
        let coin = w.create_object(ObjectType::Thing, god, "Coin").unwrap();
        if let Some(o) = w.db.fetch_mut(coin) {
            o.home = room;
        }
        w.db.add_contents(box_, coin);
        let foo = w.attrs.catalog_mut().mkattr("FOO").unwrap();
        w.atr_set(god, box_, foo, "doomed").unwrap();

        w.destroy_object(box_);
        assert!(!w.db.good(box_));
        assert_eq!(w.db.location(coin), room);
        // GARBAGE slots hold no attributes.
        assert!(w.attrs.iterate(box_).is_empty());
        // The slot recycles.
        let fresh = w.create_object(ObjectType::Thing, god, "Fresh").unwrap();
        assert_eq!(fresh, box_);
        assert_eq!(w.atr_get(fresh, foo).text, "");
    }

    #[test]
    fn test_user_start_is_first_user_attr() {
        let mut w = world();
        seed(&mut w);
        let first = w.attrs.catalog_mut().mkattr("ZAP").unwrap();
        assert_eq!(first, A_USER_START);
    }
}
