//! Data structures carried by account and position messages.

pub mod contract;
