//! Infrastructure layer - engine services and store adapters

pub mod events;
pub mod experiment;
pub mod logging;
pub mod services;
