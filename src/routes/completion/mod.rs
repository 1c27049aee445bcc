mod models;
mod relay;

pub use models::*;
pub use relay::*;
