pub mod bell;
pub mod schedule;
pub mod status;
