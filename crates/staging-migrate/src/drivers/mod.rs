//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB source connection (SQLx)
//! - [`mssql`]: SQL Server target connection (Tiberius)
//!
//! Each driver implements one of the connection traits from
//! [`crate::core::traits`].

pub mod mssql;
pub mod mysql;

pub use mssql::MssqlTarget;
pub use mysql::MysqlSource;
