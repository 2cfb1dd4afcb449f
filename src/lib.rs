//! Annotation resolution for X-Ray entity glossaries and Word Wise glosses.
//!
//! Tagged text units go in; canonical entities, located occurrences and sense
//! groups come out, ready for the positional or inline adapters.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod nlp;
pub mod output;
pub mod pipeline;
pub mod text;
