//! proctor-core: Timed test sessions, countdown, scoring and submission.
//!
//! This crate defines the data model, the session reducer, the countdown
//! and the single-submission guard that the rest of proctor builds on.
//! Storage lives behind the traits in [`traits`].

pub mod attempt;
pub mod clock;
pub mod countdown;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod session;
pub mod submission;
pub mod traits;
