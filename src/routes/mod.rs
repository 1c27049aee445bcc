pub(crate) mod chat;
pub(crate) mod completion;
pub(crate) mod folder;
pub mod health_checks;

pub use health_checks::*;
