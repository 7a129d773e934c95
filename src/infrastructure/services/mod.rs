//! Infrastructure services

mod assignment_service;
mod engine;
mod metrics_service;
mod monitor_service;
mod registry_service;

pub use assignment_service::AssignmentService;
pub use engine::ExperimentEngine;
pub use metrics_service::MetricsService;
pub use monitor_service::{MonitorHandle, MonitorService};
pub use registry_service::{
    AllocationRequest, CreateExperimentRequest, CreateVariantRequest, RegistryService,
};
