pub mod file;
pub mod options;
pub mod schema;

pub use file::FileOptionStore;
pub use options::{MemoryOptionStore, OptionStore};
pub use schema::{FileSchema, MemorySchema, SchemaBackend};
