//! Data Transfer Objects for REST request/response serialization.

pub mod common_dto;
pub mod github_dto;

pub use common_dto::*;
pub use github_dto::*;
