//! SQLite backend for the order repository.

mod sqlite_impl;

pub mod db;

pub use sqlite_impl::SqliteDatabase;
