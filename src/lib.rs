//! Sketchguard - per-client rate limiting for a drawing-challenge service
//!
//! This crate implements fixed-window rate limiting keyed by a client
//! identifier derived from request headers. Each named policy (auth, upload,
//! general, like) owns an independent limiter, applied to axum routes
//! through a tower layer.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
