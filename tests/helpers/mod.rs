#![allow(dead_code, unused_imports)]

pub mod builders;
pub mod db;

pub use builders::{GrantBuilder, UserBuilder};
pub use db::{seed_permission, seed_test_user, TestDb};
