//! Standard jober library
//!
//! Collection of built-in jobers and filters for common operations

mod filter;
mod general;
mod http;
mod time;

pub use filter::{ThresholdFilter, ThresholdFilterFactory};
pub use general::{EchoJober, TransformJober};
pub use http::HttpJober;
pub use time::DelayJober;
use waterstream::JoberRegistry;

use std::sync::Arc;

/// Register all standard jobers and filters with a registry
pub fn register_all(registry: &mut JoberRegistry) {
    registry.register(Arc::new(general::EchoJoberFactory));
    registry.register(Arc::new(general::TransformJoberFactory));
    registry.register(Arc::new(http::HttpJoberFactory));
    registry.register(Arc::new(time::DelayJoberFactory));
    registry.register_filter(Arc::new(filter::ThresholdFilterFactory));
}
