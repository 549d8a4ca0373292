//! Functional tests exercising the gateway end to end

mod common;
mod gateway_test;
