//! Database access shared by bibcur binaries

pub mod init;

pub use init::{create_history_table, init_database, init_memory_database};
