//! proctor-store: Collaborator implementations for proctor.
//!
//! Implements `DefinitionProvider` and `ReportSink` in memory and on the
//! filesystem, and loads the proctor configuration file.

pub mod config;
pub mod json_fs;
pub mod memory;

pub use config::{load_config, load_config_from, ProctorConfig};
pub use json_fs::{DefinitionDirectory, JsonReportStore};
pub use memory::MemoryStore;
