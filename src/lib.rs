pub mod batch;
pub mod config;
pub mod distribution;
pub mod output;
pub mod stderr_buffer;
