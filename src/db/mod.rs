pub mod backup;
pub mod schema;

pub use backup::{BackupStore, BackupWriter};
pub use schema::{create_database, initialize_schema, open_database};
