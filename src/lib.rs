//! Inbox Pilot — watch a Gmail inbox, draft replies, send on approval.

pub mod config;
pub mod draft;
pub mod error;
pub mod gmail;
pub mod notify;
pub mod poller;
pub mod server;
pub mod workflow;
