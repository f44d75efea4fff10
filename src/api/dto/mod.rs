//! Data Transfer Objects for admin API serialization.

pub mod common_dto;
pub mod relay_dto;

pub use common_dto::*;
pub use relay_dto::*;
