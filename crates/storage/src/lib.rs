pub mod error;
pub mod live;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use live::LiveRegistry;
pub use sqlite::SqliteStore;
pub use traits::*;
