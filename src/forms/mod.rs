pub mod chat;
pub mod conversation;
pub mod folder;
pub mod user;

pub use chat::*;
pub use conversation::*;
pub use folder::*;
pub use user::UserForm;
