// src/services/mod.rs - Service layer: the pool manager, the key generator
// interface, and the request pipelines that compose them.
pub mod key_generator;
pub mod pipeline;
pub mod pool;
