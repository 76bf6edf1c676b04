// Core services: naming, sanitization, rendering, persistence, rate limiting

pub mod name_generator;
pub mod rate_limiter;
pub mod renderer;
pub mod sanitizer;
pub mod share_store;
