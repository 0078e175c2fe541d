//! Terminal rendering for interactive sessions

pub mod spinner;
