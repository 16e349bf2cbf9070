#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

mod error;
mod linker;
mod resolve;


pub use error::{Arity, LinkError};
pub use linker::{link_expr, link_mission, link_stmt, parse_literal, run_link, Tag};
