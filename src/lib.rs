#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub(crate) mod api;
pub mod app;
pub mod assets;
pub mod catalog;
pub mod clients;
pub mod config;
pub mod observability;
pub mod queue;
pub mod store;
pub mod summary;
