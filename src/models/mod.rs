mod conversation;
mod folder;
mod message;
mod model;
mod user;

pub use conversation::*;
pub use folder::*;
pub use message::*;
pub use model::*;
pub use user::*;
