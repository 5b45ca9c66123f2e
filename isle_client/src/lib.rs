//! `isle_client`
//!
//! Client-side systems:
//! - Connection management with fixed-delay reconnect
//! - World model reconciled from authoritative server state
//! - Fog of war around the local player
//! - Render interpolation toward grid positions
//! - Fishing mini-game and market transactions
//! - Input key mapping and the single-task runtime

pub mod client;
pub mod connection;
pub mod event;
pub mod fishing;
pub mod input;
pub mod interp;
pub mod market;
pub mod runtime;
pub mod visibility;
pub mod world;

pub use client::GameClient;
pub use event::ClientEvent;
pub use runtime::Runtime;
