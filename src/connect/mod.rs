//! Connection resolution and lifecycle

mod connection;
mod resolver;

pub use connection::{SqliteClient, SqliteConnection};
pub use resolver::{ConnectionConfig, SqliteConnectionResolver};
