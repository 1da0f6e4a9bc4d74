//! Call-control (AGI) gateway for tandem
//!
//! The PBX dialplan opens one TCP connection per call-control event and
//! speaks the AGI protocol: a newline-terminated `key: value` header
//! block, then an exchange of `SET VARIABLE`/`GET VARIABLE` commands,
//! closed out by a single status line. This crate parses that protocol
//! and dispatches each event into the routing engine.

pub mod server;
pub mod session;

pub use server::AgiServer;
