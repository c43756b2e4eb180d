pub mod core;
pub mod consumer;
mod errors;
pub mod producer;
pub mod reader;
pub mod record;
pub mod writer;

#[cfg(test)]
mod tests;

pub use crate::core::{Credits, Queue, QueueConfig, DEFAULT_CAPACITY};
pub use errors::{QueueError, Result};
pub use record::Record;
