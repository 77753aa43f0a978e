pub mod booking;
pub mod geo;
pub mod message;
pub mod position;
pub mod pricing;
pub mod tier;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
