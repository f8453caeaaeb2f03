//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` keep working.

pub mod event;
pub mod idea;

pub use self::event::*;
pub use self::idea::*;
