//! GoLibre web library.
//!
//! This crate provides the marketplace front end as a library, allowing it
//! to be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod forms;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
pub mod upload;
