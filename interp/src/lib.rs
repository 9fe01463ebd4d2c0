pub mod boolexp;
pub mod command;
pub mod eval;
pub mod funcs;
pub mod game;
pub mod handlers;
pub mod matcher;
pub mod notify;
pub mod queue;
pub mod wild;

pub use game::{Ctx, Game, Regs, MAX_GLOBAL_REGS};
pub use queue::CommandQueue;
