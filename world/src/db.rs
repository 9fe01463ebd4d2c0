//! Dense object table and the pure containment/visibility predicates
//! that operate over it.

use chrono::Utc;
use tracing::debug;

use common::config::{LimitsConfig, TogglesConfig};

use crate::object::{Dbref, ObjFlags, Object, ObjectType, Powers, GOD, NOTHING};

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug)]
pub struct Db {
    objects: Vec<Object>,
    /// Head of the GARBAGE recycling chain, linked through `next`.
    free_head: Dbref,
    limits: LimitsConfig,
    toggles: TogglesConfig,
}

impl Db {
    pub fn new(limits: LimitsConfig, toggles: TogglesConfig) -> Self {
        Db {
            objects: Vec::new(),
            free_head: NOTHING,
            limits,
            toggles,
        }
    }

    #[inline]
    pub fn db_top(&self) -> Dbref {
        self.objects.len() as Dbref
    }

    #[inline]
    pub fn good(&self, d: Dbref) -> bool {
        0 <= d && (d as usize) < self.objects.len() && !self.objects[d as usize].is_garbage()
    }

    pub fn fetch(&self, d: Dbref) -> Option<&Object> {
        if self.good(d) {
            Some(&self.objects[d as usize])
        } else {
            None
        }
    }

    pub fn fetch_mut(&mut self, d: Dbref) -> Option<&mut Object> {
        if self.good(d) {
            Some(&mut self.objects[d as usize])
        } else {
            None
        }
    }

    /// Raw slot access for the flatfile writer; includes GARBAGE slots.
    pub fn slot(&self, d: Dbref) -> Option<&Object> {
        if 0 <= d {
            self.objects.get(d as usize)
        } else {
            None
        }
    }

    /// Allocate a slot, recycling the GARBAGE chain before growing.
    pub fn create(&mut self, kind: ObjectType, owner: Dbref) -> Dbref {
        let now = now_secs();
        let d = if self.free_head != NOTHING {
            let d = self.free_head;
            self.free_head = self.objects[d as usize].next;
            self.objects[d as usize] = Object::new(kind, owner, now);
            d
        } else {
            self.objects.push(Object::new(kind, owner, now));
            self.objects.len() as Dbref - 1
        };
        debug!(dbref = d, ?kind, owner, "object created");
        d
    }

    /// Flip a slot to GARBAGE and park it on the recycling chain. List
    /// unlinking and attribute wiping are the caller's job.
    pub fn free(&mut self, d: Dbref) {
        if !self.good(d) {
            return;
        }
        let mut g = Object::garbage();
        g.next = self.free_head;
        self.objects[d as usize] = g;
        self.free_head = d;
    }

    /// Install a fully-formed record during flatfile load; slots between
    /// the current top and `d` become GARBAGE.
    pub fn install(&mut self, d: Dbref, obj: Object) {
        let idx = d as usize;
        while self.objects.len() <= idx {
            self.objects.push(Object::garbage());
        }
        self.objects[idx] = obj;
    }

    /// Rebuild the GARBAGE chain after a load.
    pub fn relink_free_chain(&mut self) {
        self.free_head = NOTHING;
        for d in (0..self.objects.len()).rev() {
            if self.objects[d].is_garbage() {
                self.objects[d].next = self.free_head;
                self.free_head = d as Dbref;
            }
        }
    }

    #[inline]
    pub fn touch(&mut self, d: Dbref) {
        if let Some(o) = self.fetch_mut(d) {
            o.modified = now_secs();
        }
    }

    pub fn kind(&self, d: Dbref) -> ObjectType {
        self.fetch(d).map(|o| o.kind).unwrap_or(ObjectType::Garbage)
    }

    pub fn name(&self, d: Dbref) -> &str {
        self.fetch(d).map(|o| o.name.as_str()).unwrap_or("")
    }

    pub fn owner(&self, d: Dbref) -> Dbref {
        self.fetch(d).map(|o| o.owner).unwrap_or(NOTHING)
    }

    pub fn location(&self, d: Dbref) -> Dbref {
        self.fetch(d).map(|o| o.location).unwrap_or(NOTHING)
    }

    pub fn contents(&self, d: Dbref) -> Dbref {
        self.fetch(d).map(|o| o.contents).unwrap_or(NOTHING)
    }

    pub fn exits(&self, d: Dbref) -> Dbref {
        self.fetch(d).map(|o| o.exits).unwrap_or(NOTHING)
    }

    pub fn next(&self, d: Dbref) -> Dbref {
        self.fetch(d).map(|o| o.next).unwrap_or(NOTHING)
    }

    pub fn parent(&self, d: Dbref) -> Dbref {
        self.fetch(d).map(|o| o.parent).unwrap_or(NOTHING)
    }

    pub fn pennies(&self, d: Dbref) -> i32 {
        self.fetch(d).map(|o| o.pennies).unwrap_or(0)
    }

    pub fn has_flag(&self, d: Dbref, f: ObjFlags) -> bool {
        self.fetch(d).map(|o| o.flags.contains(f)).unwrap_or(false)
    }

    pub fn set_flag(&mut self, d: Dbref, f: ObjFlags, on: bool) {
        if let Some(o) = self.fetch_mut(d) {
            o.flags.set(f, on);
            o.modified = now_secs();
        }
    }

    pub fn has_power(&self, d: Dbref, p: Powers) -> bool {
        self.fetch(d).map(|o| o.powers.contains(p)).unwrap_or(false)
    }

    pub fn set_power(&mut self, d: Dbref, p: Powers, on: bool) {
        if let Some(o) = self.fetch_mut(d) {
            o.powers.set(p, on);
            o.modified = now_secs();
        }
    }

    /// Reparent with cycle and depth validation. `Err` carries no detail;
    /// the caller translates to a user message.
    pub fn set_parent(&mut self, d: Dbref, parent: Dbref) -> Result<(), ()> {
        if parent != NOTHING {
            if !self.good(parent) || parent == d {
                return Err(());
            }
            let mut p = parent;
            let mut depth = 0;
            while p != NOTHING {
                if p == d {
                    return Err(());
                }
                depth += 1;
                if depth > self.limits.parent_nest_lim {
                    return Err(());
                }
                p = self.parent(p);
            }
        }
        match self.fetch_mut(d) {
            Some(o) => {
                o.parent = parent;
                o.modified = now_secs();
                Ok(())
            }
            None => Err(()),
        }
    }

    /// Ancestors of `d` starting at its parent, bounded by the nest limit.
    pub fn parent_chain(&self, d: Dbref) -> Vec<Dbref> {
        let mut chain = Vec::new();
        let mut p = self.parent(d);
        while p != NOTHING && self.good(p) && chain.len() < self.limits.parent_nest_lim as usize {
            chain.push(p);
            p = self.parent(p);
        }
        chain
    }

    // -- intrusive sibling lists ------------------------------------------

    pub fn insert_first(&mut self, head: Dbref, thing: Dbref) -> Dbref {
        if let Some(o) = self.fetch_mut(thing) {
            o.next = head;
        }
        thing
    }

    pub fn remove_first(&mut self, head: Dbref, thing: Dbref) -> Dbref {
        if head == thing {
            return self.next(thing);
        }
        let mut prev = head;
        while prev != NOTHING {
            if self.next(prev) == thing {
                let after = self.next(thing);
                if let Some(o) = self.fetch_mut(prev) {
                    o.next = after;
                }
                return head;
            }
            prev = self.next(prev);
        }
        head
    }

    pub fn reverse_list(&mut self, mut list: Dbref) -> Dbref {
        let mut newlist = NOTHING;
        while list != NOTHING {
            let rest = self.next(list);
            if let Some(o) = self.fetch_mut(list) {
                o.next = newlist;
            }
            newlist = list;
            list = rest;
        }
        newlist
    }

    pub fn member(&self, thing: Dbref, mut list: Dbref) -> bool {
        while list != NOTHING {
            if list == thing {
                return true;
            }
            list = self.next(list);
        }
        false
    }

    /// Walk a sibling list into a Vec, bounded by table size against
    /// corrupt links.
    pub fn list_members(&self, head: Dbref) -> Vec<Dbref> {
        let mut out = Vec::new();
        let mut cur = head;
        let limit = self.objects.len() + 1;
        while cur != NOTHING && out.len() < limit {
            out.push(cur);
            cur = self.next(cur);
        }
        out
    }

    /// Put `thing` at the head of `container`'s contents and point its
    /// location there.
    pub fn add_contents(&mut self, container: Dbref, thing: Dbref) {
        let head = self.contents(container);
        let new_head = self.insert_first(head, thing);
        if let Some(c) = self.fetch_mut(container) {
            c.contents = new_head;
        }
        if let Some(t) = self.fetch_mut(thing) {
            t.location = container;
            t.modified = now_secs();
        }
    }

    pub fn remove_contents(&mut self, container: Dbref, thing: Dbref) {
        let head = self.contents(container);
        let new_head = self.remove_first(head, thing);
        if let Some(c) = self.fetch_mut(container) {
            c.contents = new_head;
        }
        if let Some(t) = self.fetch_mut(thing) {
            t.location = NOTHING;
            t.next = NOTHING;
        }
    }

    pub fn add_exit(&mut self, room: Dbref, exit: Dbref) {
        let head = self.exits(room);
        let new_head = self.insert_first(head, exit);
        if let Some(r) = self.fetch_mut(room) {
            r.exits = new_head;
        }
        if let Some(e) = self.fetch_mut(exit) {
            e.location = room;
            e.modified = now_secs();
        }
    }

    /// Move a thing or player between containers.
    pub fn move_object(&mut self, thing: Dbref, dest: Dbref) {
        let src = self.location(thing);
        if src != NOTHING {
            self.remove_contents(src, thing);
        }
        if dest != NOTHING {
            self.add_contents(dest, thing);
        }
    }

    // -- predicates --------------------------------------------------------

    /// Place `what` is linked into: location for players and things,
    /// source for exits, NOTHING for rooms.
    pub fn where_is(&self, what: Dbref) -> Dbref {
        match self.fetch(what) {
            None => NOTHING,
            Some(o) => match o.kind {
                ObjectType::Player | ObjectType::Thing => o.location,
                ObjectType::Exit => o.location,
                _ => NOTHING,
            },
        }
    }

    /// Room containing `what`, itself when a room, NOTHING when the
    /// containment walk dies or exceeds the nest limit.
    pub fn where_room(&self, mut what: Dbref) -> Dbref {
        for _ in 0..self.limits.ntfy_nest_lim {
            if !self.good(what) {
                break;
            }
            if self.kind(what) == ObjectType::Room {
                return what;
            }
            if !self.kind(what).has_location() {
                break;
            }
            what = self.location(what);
        }
        NOTHING
    }

    #[inline]
    pub fn is_god(&self, d: Dbref) -> bool {
        d == GOD
    }

    pub fn wizard(&self, d: Dbref) -> bool {
        self.is_god(d) || self.has_flag(d, ObjFlags::WIZARD)
    }

    pub fn wizroy(&self, d: Dbref) -> bool {
        self.wizard(d) || self.has_flag(d, ObjFlags::ROYALTY)
    }

    pub fn controls(&self, who: Dbref, what: Dbref) -> bool {
        if !self.good(who) || !self.good(what) {
            return false;
        }
        if self.is_god(who) {
            return true;
        }
        if self.is_god(what) {
            return false;
        }
        if self.wizard(who) {
            return true;
        }
        self.owner(who) == self.owner(what)
    }

    pub fn examinable(&self, who: Dbref, what: Dbref) -> bool {
        self.has_flag(what, ObjFlags::VISUAL) || self.wizroy(who) || self.controls(who, what)
    }

    fn myopic_exam(&self, who: Dbref, what: Dbref) -> bool {
        !self.has_flag(who, ObjFlags::MYOPIC) && self.examinable(who, what)
    }

    /// Room-content visibility.
    pub fn can_see(&self, player: Dbref, thing: Dbref, can_see_loc: bool) -> bool {
        // Disconnected players are unseen under dark_sleepers unless
        // they are puppets.
        if self.toggles.dark_sleepers
            && self.kind(thing) == ObjectType::Player
            && !self.has_flag(thing, ObjFlags::CONNECTED)
            && !self.has_flag(thing, ObjFlags::PUPPET)
        {
            return false;
        }

        // You don't see yourself or exits.
        if player == thing || self.kind(thing) == ObjectType::Exit {
            return false;
        }

        let own_dark = self.toggles.see_own_dark && self.myopic_exam(player, thing);
        if can_see_loc {
            !self.has_flag(thing, ObjFlags::DARK) || own_dark
        } else {
            (self.has_flag(thing, ObjFlags::LIGHT) && !self.has_flag(thing, ObjFlags::DARK))
                || own_dark
        }
    }

    fn find_unfindable(&self, d: Dbref) -> bool {
        self.wizard(d) || self.has_power(d, Powers::FIND_UNFIND)
    }

    fn findable(&self, d: Dbref) -> bool {
        !self.has_flag(d, ObjFlags::UNFINDABLE)
    }

    pub fn locatable(&self, player: Dbref, it: Dbref, enactor: Dbref) -> bool {
        if !self.good(it) {
            return false;
        }

        let loc_it = self.where_is(it);

        if self.examinable(player, it)
            || self.find_unfindable(player)
            || loc_it == player
            || (loc_it != NOTHING
                && (self.examinable(player, loc_it) || loc_it == self.where_is(player)))
            || self.wizard(enactor)
            || it == enactor
        {
            return true;
        }

        let room_it = self.where_room(it);
        let findable_room = if self.good(room_it) {
            self.findable(room_it)
        } else {
            true
        };

        (room_it != NOTHING && self.examinable(player, room_it))
            || (self.findable(it) && findable_room)
    }

    /// In inventory, in the same room, or IS the room.
    pub fn nearby(&self, player: Dbref, thing: Dbref) -> bool {
        if !self.good(player) || !self.good(thing) {
            return false;
        }
        if self.has_power(thing, Powers::HIDE)
            && self.has_flag(thing, ObjFlags::DARK)
            && !self.wizard(player)
            && !self.has_power(player, Powers::SEE_HIDDEN)
        {
            return false;
        }
        let thing_loc = self.where_is(thing);
        if thing_loc == player {
            return true;
        }
        let player_loc = self.where_is(player);
        thing_loc == player_loc || thing == player_loc
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn toggles(&self) -> &TogglesConfig {
        &self.toggles
    }
}
