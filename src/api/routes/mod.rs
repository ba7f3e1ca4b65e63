//! API route modules.

pub mod audio;
