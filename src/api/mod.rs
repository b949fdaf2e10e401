//! Inbound surface called by the (external) presentation layer.

pub mod answer;
pub mod index;
