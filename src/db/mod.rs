pub mod chat;
pub mod folder;
pub mod message;
pub mod model;
