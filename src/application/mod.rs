//! Application services: the article pipeline and the seams it composes.

pub mod error;
pub mod generator;
pub mod links;
pub mod normalizer;
pub mod repos;
pub mod sanitize;
pub mod stats;
pub mod wiki;
