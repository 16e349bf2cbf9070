//! Execute pass, host built-ins and mission scheduler for linked mission scripts.

#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

pub mod eval;
pub mod host;
pub mod mission;
mod stack;
pub mod value;
