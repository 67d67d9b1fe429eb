pub mod http;
pub mod memory;
pub mod sqlite;

pub use http::HttpDiagnosisAdapter;
pub use memory::{MemoryOrigin, MemoryStorage};
pub use sqlite::SqliteStorage;
