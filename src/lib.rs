pub mod ack;
pub mod api;
pub mod app;
pub mod callback;
pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod global;
pub mod retry;
pub mod transcript;
pub mod webhook;
