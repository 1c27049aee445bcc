mod memory_store;
pub mod store;
pub mod title;

pub use memory_store::MemoryConversationStore;
pub use store::{ConversationStore, PgConversationStore, StoreError, WriteOutcome};
pub use title::TitleGenerator;
