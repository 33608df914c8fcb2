pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod scope;
pub mod services;
pub mod state;
