//! Terminal screens.

pub mod console;
pub mod dashboard;
pub mod history;
pub mod session;
pub mod settings;
