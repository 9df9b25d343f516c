//! Prompt module for LLM-based operations.
//!
//! This module provides prompt templates for the summarization call.

pub mod summary;

pub use summary::*;
