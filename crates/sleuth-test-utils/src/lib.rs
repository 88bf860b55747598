//! Mocks and fixtures shared by the sleuth test suites.

pub mod capability;
pub mod fixtures;
pub mod llm;

pub use capability::MockCapability;
pub use fixtures::*;
pub use llm::MockLlm;
