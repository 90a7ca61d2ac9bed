//! Bell output: strike sequencing and the play log.

mod log;
mod player;

pub use log::{BellLog, BellLogEntry, BELL_LOG_CAPACITY};
pub use player::{BellPlayer, LogSink, PlayerConfig, PlayerHandle, Strike, StrikeSink};
