//! HTTP routes

pub mod sessions;
