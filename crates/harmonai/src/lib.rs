//! HarmonAI - song generation worker
//!
//! Turns a text description (or a prompt plus lyrics) into a rendered song and
//! matching cover art, stores both, and tags the result with genres.
//!
//! Library exposing the pipeline for the binary and for tests.

pub mod artifact;
pub mod client;
pub mod derive;
pub mod models;
pub mod params;
pub mod pipeline;
pub mod prompts;
pub mod request;
pub mod storage;
pub mod telemetry;
pub mod web;
