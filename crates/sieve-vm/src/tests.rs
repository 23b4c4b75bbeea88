//! Integration tests: scripts compiled and run end to end against fake
//! collaborators

mod binary_roundtrip;
mod compile;
mod execution;
mod helpers;
