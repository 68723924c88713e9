//! Policy pipeline: registration, ordering and composition.
//!
//! This module provides:
//! - PipelinePhase, the five global ordering buckets
//! - PipelinePolicy and Next, the middleware contract
//! - Pipeline, the registry that orders policies and dispatches requests
//! - create_pipeline_from_options and create_storage_pipeline

mod defaults;
mod ordering;
mod phase;
mod policy;
mod registry;


pub use defaults::{
    create_pipeline_from_options, create_storage_pipeline, BearerTokenOptions, PipelineOptions,
    StorageClientOptions,
};
pub use phase::PipelinePhase;
pub use policy::{Next, PipelinePolicy, PolicyOptions};
pub use registry::{OrderedPolicies, Pipeline, RemovePolicyOptions};
