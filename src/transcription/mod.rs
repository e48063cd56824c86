//! # Transcription Module
//!
//! Runs the external music transcription tool on uploaded audio.
//!
//! ## Key Components:
//! - **Command Template**: the configured command line with `{{INPUT}}`,
//!   `{{OUTPUT}}` and `{{INSTRUMENT}}` placeholders
//! - **Process Runner**: starts the tool, enforces the timeout, classifies the result
//! - **Worker**: ties the two together for one input file
//!
//! ## Error classes:
//! - **Transcribe**: the tool refused the input; the message goes back to the client
//! - **Internal**: launch failures, timeouts and the like; logged, never shown

pub mod runner;      // Child process execution with timeout
pub mod template;    // Placeholder substitution
pub mod worker;      // Conversion orchestration

pub use worker::{output_path_for, ConvertError, Transcriber, Worker};
