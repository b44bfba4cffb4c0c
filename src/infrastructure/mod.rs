// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod csv_export;
pub mod csv_parsers;
pub mod egauge;
pub mod errlog;
pub mod postgres_sink;
pub mod registry;
pub mod state_store;
pub mod webctrl;
