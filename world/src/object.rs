use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Database reference. Non-negative values index the object table;
/// negative values are sentinels.
pub type Dbref = i32;

pub const NOTHING: Dbref = -1;
pub const AMBIGUOUS: Dbref = -2;
pub const NOPERM: Dbref = -3;
pub const HOME: Dbref = -4;
/// The first player, owner of last resort.
pub const GOD: Dbref = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ObjectType {
    Room = 0,
    Thing = 1,
    Exit = 2,
    Player = 3,
    Garbage = 5,
}

impl ObjectType {
    /// Whether objects of this type sit inside a container.
    pub fn has_location(self) -> bool {
        matches!(self, ObjectType::Thing | ObjectType::Player)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjFlags: u32 {
        const WIZARD     = 0x0000_0001;
        const ROYALTY    = 0x0000_0002;
        const DARK       = 0x0000_0004;
        const LIGHT      = 0x0000_0008;
        const GOING      = 0x0000_0010;
        const PUPPET     = 0x0000_0020;
        const HALTED     = 0x0000_0040;
        const QUIET      = 0x0000_0080;
        const STICKY     = 0x0000_0100;
        const MYOPIC     = 0x0000_0200;
        const CONNECTED  = 0x0000_0400;
        const UNFINDABLE = 0x0000_0800;
        const VISUAL     = 0x0000_1000;
        const OPAQUE     = 0x0000_2000;
        const SAFE       = 0x0000_4000;
    }
}

impl ObjFlags {
    /// The names users set and lock against.
    pub fn by_name(name: &str) -> Option<ObjFlags> {
        let f = match name.to_ascii_lowercase().as_str() {
            "wizard" => ObjFlags::WIZARD,
            "royalty" => ObjFlags::ROYALTY,
            "dark" => ObjFlags::DARK,
            "light" => ObjFlags::LIGHT,
            "puppet" => ObjFlags::PUPPET,
            "halted" => ObjFlags::HALTED,
            "quiet" => ObjFlags::QUIET,
            "sticky" => ObjFlags::STICKY,
            "myopic" => ObjFlags::MYOPIC,
            "unfindable" => ObjFlags::UNFINDABLE,
            "visual" => ObjFlags::VISUAL,
            "opaque" => ObjFlags::OPAQUE,
            "safe" => ObjFlags::SAFE,
            "connected" => ObjFlags::CONNECTED,
            _ => return None,
        };
        Some(f)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Powers: u32 {
        const PASS_LOCKS     = 0x0000_0001;
        const SEE_HIDDEN     = 0x0000_0002;
        const FIND_UNFIND    = 0x0000_0004;
        const FREE_MONEY     = 0x0000_0008;
        const FREE_QUOTA     = 0x0000_0010;
        const HIDE           = 0x0000_0020;
        const SEE_QUEUE      = 0x0000_0040;
        const HALT_ANY       = 0x0000_0080;
    }
}

/// One slot of the object table. Sibling membership travels through the
/// intrusive `next` link; `contents`/`exits` are list heads.
#[derive(Debug, Clone)]
pub struct Object {
    pub kind: ObjectType,
    /// Display name; the canonical copy also lives in A_NAME.
    pub name: String,
    pub owner: Dbref,
    pub zone: Dbref,
    pub parent: Dbref,
    /// Container for things/players; source room for exits.
    pub location: Dbref,
    pub contents: Dbref,
    pub exits: Dbref,
    pub next: Dbref,
    pub home: Dbref,
    pub flags: ObjFlags,
    pub powers: Powers,
    pub pennies: i32,
    /// Epoch seconds.
    pub created: i64,
    pub modified: i64,
    /// Attribute reads served for this object.
    pub accesses: u64,
}

impl Object {
    pub fn new(kind: ObjectType, owner: Dbref, now: i64) -> Self {
        Object {
            kind,
            name: String::new(),
            owner,
            zone: NOTHING,
            parent: NOTHING,
            location: NOTHING,
            contents: NOTHING,
            exits: NOTHING,
            next: NOTHING,
            home: NOTHING,
            flags: ObjFlags::default(),
            powers: Powers::default(),
            pennies: 0,
            created: now,
            modified: now,
            accesses: 0,
        }
    }

    pub fn garbage() -> Self {
        Object::new(ObjectType::Garbage, NOTHING, 0)
    }

    #[inline]
    pub fn is_garbage(&self) -> bool {
        self.kind == ObjectType::Garbage
    }

    #[inline]
    pub fn is_player(&self) -> bool {
        self.kind == ObjectType::Player
    }

    #[inline]
    pub fn is_room(&self) -> bool {
        self.kind == ObjectType::Room
    }

    #[inline]
    pub fn is_exit(&self) -> bool {
        self.kind == ObjectType::Exit
    }

    #[inline]
    pub fn wizard(&self) -> bool {
        self.flags.contains(ObjFlags::WIZARD)
    }

    #[inline]
    pub fn dark(&self) -> bool {
        self.flags.contains(ObjFlags::DARK)
    }

    #[inline]
    pub fn light(&self) -> bool {
        self.flags.contains(ObjFlags::LIGHT)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_type_codes_round_trip() {
        for kind in [
            ObjectType::Room,
            ObjectType::Thing,
            ObjectType::Exit,
            ObjectType::Player,
            ObjectType::Garbage,
        ] {
            let code: u8 = kind.into();
            assert_eq!(ObjectType::try_from(code).unwrap(), kind);
        }
        assert!(ObjectType::try_from(4u8).is_err());
    }

    #[test]
    fn test_has_location() {
        assert!(ObjectType::Thing.has_location());
        assert!(ObjectType::Player.has_location());
        assert!(!ObjectType::Room.has_location());
        assert!(!ObjectType::Exit.has_location());
    }
}
