//! Integration tests: full runs against in-memory collaborators.

mod fakes;
mod pipeline;
