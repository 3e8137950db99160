//! Core services for tagtool: a thin orchestration layer between a wiki
//! backend (pages, labels, spaces) and a language-model backend.
//!
//! Everything here is request-scoped and sequential; the only shared state
//! is the immutable [`sections::SectionRegistry`] built at startup.

pub mod config;
pub mod convert;
pub mod llm;
pub mod reset;
pub mod scope;
pub mod sections;
pub mod spaces;
pub mod tagging;
pub mod tags;
pub mod wiki;

#[cfg(test)]
pub(crate) mod testing;
