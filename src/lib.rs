pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod gather;
pub mod import;
pub mod metadata;
pub mod munge;
pub mod output;
pub mod queue;
pub mod record;
pub mod resources;
pub mod s3;
pub mod stage;
pub mod translation;
