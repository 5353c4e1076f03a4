//! Built-in workers for taskmesh.
//!
//! # Main entry points
//!
//! - [`register_workers()`]: Add every built-in worker type to a factory table.
//! - [`TextProcessor`]: Extraction, summarization and text statistics.
//! - [`DataTransformer`]: Filtering, projection, sorting and aggregation of JSON records.

/// Data transformation worker.
pub mod data_transform;
/// Text processing worker.
pub mod text_processor;

pub use data_transform::{
    data_transformer, Aggregate, DataTransformer, FilterOp, Predicate, SortOrder,
    DATA_TRANSFORMER_CAPABILITIES, DATA_TRANSFORMER_MAX_CONCURRENT, DATA_TRANSFORMER_TYPE,
};
pub use text_processor::{
    text_processor, TextAnalysis, TextProcessor, TEXT_PROCESSOR_CAPABILITIES,
    TEXT_PROCESSOR_MAX_CONCURRENT, TEXT_PROCESSOR_TYPE,
};

use taskmesh_orchestrator::{FactoryRegistry, WorkerDefaults};

fn defaults(capabilities: &[&str], max_concurrent_tasks: usize) -> WorkerDefaults {
    WorkerDefaults {
        capabilities: capabilities.iter().map(|c| (*c).to_string()).collect(),
        max_concurrent_tasks: Some(max_concurrent_tasks),
    }
}

/// Register the text processor and data transformer types.
pub fn register_workers(registry: &mut FactoryRegistry) {
    registry.register(
        TEXT_PROCESSOR_TYPE,
        defaults(&TEXT_PROCESSOR_CAPABILITIES, TEXT_PROCESSOR_MAX_CONCURRENT),
        text_processor,
    );
    registry.register(
        DATA_TRANSFORMER_TYPE,
        defaults(&DATA_TRANSFORMER_CAPABILITIES, DATA_TRANSFORMER_MAX_CONCURRENT),
        data_transformer,
    );
}

/// A factory table holding every built-in worker type.
pub fn default_registry() -> FactoryRegistry {
    let mut registry = FactoryRegistry::new();
    register_workers(&mut registry);
    registry
}
