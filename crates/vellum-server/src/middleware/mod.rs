//! Middleware layers.

pub(crate) mod headers;
pub(crate) mod hooks;
