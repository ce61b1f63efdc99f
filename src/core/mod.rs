//! Core of the gateway: data model, validation, reliability machinery,
//! streaming, backend adapters, and the provider group.

pub mod group;
pub mod providers;
pub mod recovery;
pub mod streaming;
pub mod types;
pub mod validation;
