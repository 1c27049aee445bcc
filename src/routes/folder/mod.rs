mod add;
mod delete;
mod update;

pub use add::*;
pub use delete::*;
pub use update::*;
