//! Fetches posts for a list of users within a date range and saves them to
//! one text file per user, keeping an advisory monthly quota count.

pub mod api;
pub mod batch;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod input;
pub mod output;
pub mod quota;
pub mod storage;
pub mod username;
