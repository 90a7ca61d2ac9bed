//! Expands compact bell schedules into dated alarms and rings them on the
//! minute.

pub mod alarm;
pub mod bell;
pub mod config;
pub mod schedule;
pub mod server;
pub mod service;
pub mod storage;
pub mod sync;
pub mod types;
