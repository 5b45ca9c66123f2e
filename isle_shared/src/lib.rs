//! `isle_shared`
//!
//! Libraries shared by the client engine and its test harness.
//!
//! Design goals:
//! - One typed message per wire kind, matched exhaustively.
//! - Lenient where the server is sloppy (`null` lists, empty directions).
//! - No client state in this crate.
//! - No `unsafe`.

pub mod config;
pub mod identity;
pub mod map;
pub mod protocol;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::identity::*;
    pub use crate::map::*;
    pub use crate::protocol::*;
}
