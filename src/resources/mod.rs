//! Concrete resources built on the generic data service.

pub mod posts;

pub use posts::PostService;
