//! Visadesk - access control for the visa agency CRM
//!
//! Permission resolution, the admin API over roles, overrides and the
//! permission catalog, and the cached application settings. All modules are
//! public so the integration tests can drive them directly.

pub mod access;
pub mod app_settings;
pub mod entities;
pub mod errors;
pub mod jobs;
pub mod session;
pub mod settings;
pub mod storage;
pub mod web;
