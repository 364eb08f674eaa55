//! Integration test suite modules

mod caching;
mod credentials;
mod valuation;
