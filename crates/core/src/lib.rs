//! # Rust Margin Core
//!
//! 核心基础设施：配置、数据库、缓存、日志、交易日历

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod logger;
pub mod time;
