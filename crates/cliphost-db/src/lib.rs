//! SQLite persistence for the cliphost asset catalog.
//!
//! Only the facts that must survive a restart live here: which assets exist,
//! whether each is still being processed, and a view counter. Live transcode
//! progress is kept in memory by the server.
//!
//! # Example
//!
//! ```
//! use cliphost_common::AssetId;
//! use cliphost_db::pool::{get_conn, init_memory_pool};
//! use cliphost_db::queries::assets;
//!
//! let pool = init_memory_pool().unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let id = AssetId::new();
//! assets::mark_processing(&conn, id).unwrap();
//! assert_eq!(assets::list_processing(&conn).unwrap(), vec![id]);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use models::Asset;
pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
