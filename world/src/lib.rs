pub mod attr;
pub mod db;
pub mod flatfile;
pub mod object;
pub mod quota;
pub mod world;

pub use db::Db;
pub use object::{Dbref, ObjFlags, Object, ObjectType, Powers, AMBIGUOUS, GOD, HOME, NOPERM, NOTHING};
pub use world::World;
