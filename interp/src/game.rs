//! The interpreter's top-level value: world, queue, command table, and
//! pending output, threaded `&mut` through every handler.

use std::rc::Rc;

use common::config::MuxConfig;
use common::err::CResult;
use world::{Dbref, World};

use crate::command::CommandTable;
use crate::notify::Outbox;
use crate::queue::CommandQueue;

pub const MAX_GLOBAL_REGS: usize = 36;

/// Global register file. Snapshots are cheap: entries share their text
/// until written.
#[derive(Debug, Clone)]
pub struct Regs([Rc<String>; MAX_GLOBAL_REGS]);

impl Default for Regs {
    fn default() -> Self {
        let empty = Rc::new(String::new());
        Regs(std::array::from_fn(|_| Rc::clone(&empty)))
    }
}

impl Regs {
    /// Register index for the character following `%q`: 0-9 then a-z.
    pub fn index_of(c: char) -> Option<usize> {
        match c {
            '0'..='9' => Some(c as usize - '0' as usize),
            'a'..='z' => Some(10 + c as usize - 'a' as usize),
            'A'..='Z' => Some(10 + c as usize - 'A' as usize),
            _ => None,
        }
    }

    pub fn get(&self, idx: usize) -> &str {
        self.0.get(idx).map(|r| r.as_str()).unwrap_or("")
    }

    pub fn set(&mut self, idx: usize, value: String) {
        if idx < MAX_GLOBAL_REGS {
            self.0[idx] = Rc::new(value);
        }
    }

    pub fn clear(&mut self) {
        *self = Regs::default();
    }
}

/// Who is acting: the object whose code runs (executor), the object that
/// set things in motion (enactor), and the immediate invoker (caller).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctx {
    pub executor: Dbref,
    pub caller: Dbref,
    pub enactor: Dbref,
}

impl Ctx {
    pub fn acting_alone(who: Dbref) -> Ctx {
        Ctx {
            executor: who,
            caller: who,
            enactor: who,
        }
    }

    pub fn with_executor(self, executor: Dbref) -> Ctx {
        Ctx {
            executor,
            caller: self.executor,
            enactor: self.enactor,
        }
    }
}

#[derive(Debug)]
pub struct Game {
    pub world: World,
    pub queue: CommandQueue,
    pub commands: CommandTable,
    pub outbox: Outbox,
    pub regs: Regs,
    /// Interpreter clock, epoch seconds; the driver advances it.
    pub now: i64,
    pub running: bool,
    pub restart_requested: bool,
}

impl Game {
    pub fn new_in_memory(cfg: MuxConfig) -> Self {
        let queue = CommandQueue::new(&cfg.limits);
        Game {
            world: World::new_in_memory(cfg),
            queue,
            commands: CommandTable::standard(),
            outbox: Outbox::default(),
            regs: Regs::default(),
            now: world::db::now_secs(),
            running: true,
            restart_requested: false,
        }
    }

    pub fn with_store(cfg: MuxConfig) -> CResult<Self> {
        let queue = CommandQueue::new(&cfg.limits);
        Ok(Game {
            world: World::with_store(cfg)?,
            queue,
            commands: CommandTable::standard(),
            outbox: Outbox::default(),
            regs: Regs::default(),
            now: world::db::now_secs(),
            running: true,
            restart_requested: false,
        })
    }

    /// Seed a minimal universe: Limbo and God. Only sensible on an empty
    /// database.
    pub fn bootstrap(&mut self) -> CResult<()> {
        if self.world.db.db_top() > 0 {
            return Ok(());
        }
        let room = self
            .world
            .create_object(world::ObjectType::Room, world::NOTHING, "Limbo")
            .map_err(common::err::MuxError::Error)?;
        let god = self
            .world
            .create_object(world::ObjectType::Player, world::NOTHING, "God")
            .map_err(common::err::MuxError::Error)?;
        if let Some(o) = self.world.db.fetch_mut(room) {
            o.owner = god;
        }
        if let Some(o) = self.world.db.fetch_mut(god) {
            o.flags |= world::ObjFlags::WIZARD;
            o.pennies = self.world.cfg.costs.starting_money;
            o.home = room;
        }
        self.world.db.add_contents(room, god);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reg_index_of() {
        assert_eq!(Regs::index_of('0'), Some(0));
        assert_eq!(Regs::index_of('9'), Some(9));
        assert_eq!(Regs::index_of('a'), Some(10));
        assert_eq!(Regs::index_of('z'), Some(35));
        assert_eq!(Regs::index_of('A'), Some(10));
        assert_eq!(Regs::index_of('~'), None);
    }

    #[test]
    fn test_regs_share_until_written() {
        let mut a = Regs::default();
        a.set(3, "hello".to_string());
        let b = a.clone();
        assert_eq!(b.get(3), "hello");
        let mut c = b.clone();
        c.set(3, "changed".to_string());
        assert_eq!(b.get(3), "hello");
        assert_eq!(a.get(3), "hello");
    }

    #[test]
    fn test_bootstrap() {
        let mut g = Game::new_in_memory(MuxConfig::default());
        g.bootstrap().unwrap();
        assert_eq!(g.world.db.name(0), "Limbo");
        assert_eq!(g.world.db.name(1), "God");
        assert_eq!(g.world.db.location(1), 0);
        // Idempotent on a non-empty db.
        g.bootstrap().unwrap();
        assert_eq!(g.world.db.db_top(), 2);
    }
}
