//! Unit tests for configuration loading
