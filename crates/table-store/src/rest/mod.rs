pub mod auth;
pub mod client;

pub use client::{AccountCredentials, AzureTableStore};
