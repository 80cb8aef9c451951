//! Unit tests for individual components

mod error_test;
mod config_test;
mod protocol_test;
mod serializer_test;
