//! gadget-tool - USB gadget lifecycle management
//!
//! This crate creates, configures, binds and removes USB peripheral-mode
//! gadgets through a pluggable descriptor store, with a configfs store for
//! Linux hosts.

pub mod config;
pub mod error;
pub mod gadget;

pub use error::{GadgetError, Result};
