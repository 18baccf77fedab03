//! Application runtime composition modules.

pub(crate) mod context;
pub(crate) mod exit_handler;
pub(crate) mod input;
pub(crate) mod progress;
pub(crate) mod settings;
pub(crate) mod terminal;
