// Core data models for probe results.

mod response;

pub use response::{ProbeResponse, Version};
