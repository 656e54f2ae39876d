// Common library for shared code across the api and worker

pub mod alerts;
pub mod auth;
pub mod bootstrap;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod errors;
pub mod event;
pub mod mail;
pub mod models;
pub mod phone;
pub mod rate_limit;
pub mod retry;
pub mod signin;
pub mod sms;
pub mod telemetry;
