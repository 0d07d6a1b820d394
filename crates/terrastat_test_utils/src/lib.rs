//! Terrastat Test Utilities
//!
//! PostgreSQL test infrastructure for the project store and the pipeline.
//!
//! Tests that need a live database are compiled only with the
//! `postgres-tests` feature of the crate under test and read the server URL
//! from `TERRASTAT_TEST_DATABASE_URL`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use terrastat_test_utils::{ProjectSchemaGuard, TestPgPool};
//!
//! #[tokio::test]
//! async fn test_dimensions() {
//!     let pool = TestPgPool::from_env().await.unwrap();
//!     let guard = ProjectSchemaGuard::new(&pool).await.unwrap();
//!
//!     // Fresh project schema, created through the real provisioner
//!     let mut db = guard.open().await.unwrap();
//!     // ...
//!
//!     // Schema dropped on Drop, or explicitly with guard.cleanup()
//! }
//! ```

pub mod cleanup;
pub mod config;
pub mod pool;

pub use cleanup::ProjectSchemaGuard;
pub use config::{TestDbConfig, TEST_DATABASE_URL_ENV};
pub use pool::TestPgPool;
