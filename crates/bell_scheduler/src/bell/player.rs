//! Turns fire/stop events into timed strike sequences.

use super::log::{BellLog, BellLogEntry};
use crate::alarm::{EngineEvent, FireOrigin};
use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A single strike of the bell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strike {
    /// 1-based position in the sequence
    pub index: u32,
    pub total: u32,
    /// Gain in `0.0..=1.0`
    pub volume: f32,
    pub origin: FireOrigin,
}

/// Output device for strikes.
pub trait StrikeSink: Send + Sync {
    fn strike(&self, strike: &Strike);
}

/// Sink that only logs each strike. Used when no audio output is configured.
#[derive(Debug, Default)]
pub struct LogSink;

impl StrikeSink for LogSink {
    fn strike(&self, strike: &Strike) {
        info!(
            "[Bell] strike {}/{} ({}, volume {:.2})",
            strike.index, strike.total, strike.origin, strike.volume
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Gap between consecutive strikes
    pub strike_spacing: Duration,
    /// The first strike is softened to this volume
    pub first_strike_volume: f32,
    /// How long the sequence still counts as playing after the last strike
    pub ring_out: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            strike_spacing: Duration::from_millis(11_000),
            first_strike_volume: 0.35,
            ring_out: Duration::from_secs(1),
        }
    }
}

/// Shared view of the player for status reporting.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    playing: Arc<AtomicBool>,
    log: Arc<BellLog>,
}

impl PlayerHandle {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> &BellLog {
        &self.log
    }
}

/// Plays strike sequences in response to [`EngineEvent`]s.
///
/// At most one sequence plays at a time: a new `Fire` cancels whatever is
/// still ringing and `Stop` silences it.
pub struct BellPlayer {
    sink: Arc<dyn StrikeSink>,
    config: PlayerConfig,
    handle: PlayerHandle,
    current: Option<JoinHandle<()>>,
}

impl BellPlayer {
    pub fn new(sink: Arc<dyn StrikeSink>, config: PlayerConfig) -> Self {
        Self {
            sink,
            config,
            handle: PlayerHandle {
                playing: Arc::new(AtomicBool::new(false)),
                log: Arc::new(BellLog::default()),
            },
            current: None,
        }
    }

    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    /// Consumes events until the channel closes.
    pub fn spawn(mut self, mut events: broadcast::Receiver<EngineEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Bell player lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            self.silence();
            debug!("Bell player stopped");
        })
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Fire {
                strike_count,
                origin,
            } => self.play(strike_count, origin),
            EngineEvent::Stop => {
                if self.handle.is_playing() {
                    info!("[Bell] stopped");
                }
                self.silence();
            }
            EngineEvent::ScheduleChanged { .. } | EngineEvent::StatusChanged { .. } => {}
        }
    }

    fn play(&mut self, strike_count: u32, origin: FireOrigin) {
        if strike_count < 1 {
            return;
        }
        self.silence();

        self.handle.log.record(BellLogEntry {
            played_at: Local::now(),
            origin,
            strike_count,
        });
        info!("[Bell] {} play x{}", origin, strike_count);

        self.handle.playing.store(true, Ordering::SeqCst);
        let sink = Arc::clone(&self.sink);
        let config = self.config.clone();
        let playing = Arc::clone(&self.handle.playing);
        self.current = Some(tokio::spawn(async move {
            for index in 1..=strike_count {
                let volume = if index == 1 {
                    config.first_strike_volume
                } else {
                    1.0
                };
                sink.strike(&Strike {
                    index,
                    total: strike_count,
                    volume,
                    origin,
                });
                if index < strike_count {
                    tokio::time::sleep(config.strike_spacing).await;
                }
            }
            tokio::time::sleep(config.ring_out).await;
            playing.store(false, Ordering::SeqCst);
            debug!("[Bell] sequence finished");
        }));
    }

    fn silence(&mut self) {
        if let Some(current) = self.current.take() {
            current.abort();
        }
        self.handle.playing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::EventBus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        strikes: Mutex<Vec<(tokio::time::Instant, Strike)>>,
    }

    impl RecordingSink {
        fn strikes(&self) -> Vec<Strike> {
            self.strikes.lock().unwrap().iter().map(|(_, s)| *s).collect()
        }
    }

    impl StrikeSink for RecordingSink {
        fn strike(&self, strike: &Strike) {
            self.strikes
                .lock()
                .unwrap()
                .push((tokio::time::Instant::now(), *strike));
        }
    }

    fn start() -> (EventBus, Arc<RecordingSink>, PlayerHandle) {
        let bus = EventBus::default();
        let sink = Arc::new(RecordingSink::default());
        let player = BellPlayer::new(sink.clone(), PlayerConfig::default());
        let handle = player.handle();
        player.spawn(bus.subscribe());
        (bus, sink, handle)
    }

    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_spacing_and_volume() {
        let (bus, sink, handle) = start();

        bus.emit(EngineEvent::Fire {
            strike_count: 3,
            origin: FireOrigin::Auto,
        });
        settle(Duration::from_millis(10)).await;
        assert!(handle.is_playing());
        assert_eq!(sink.strikes().len(), 1);

        settle(Duration::from_secs(23)).await;

        let recorded = sink.strikes.lock().unwrap().clone();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[1].0 - recorded[0].0, Duration::from_secs(11));
        assert_eq!(recorded[2].0 - recorded[1].0, Duration::from_secs(11));
        let volumes: Vec<f32> = recorded.iter().map(|(_, s)| s.volume).collect();
        assert_eq!(volumes, vec![0.35, 1.0, 1.0]);
        assert!(!handle.is_playing());
        assert_eq!(handle.log().entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_sequence() {
        let (bus, sink, handle) = start();

        bus.emit(EngineEvent::Fire {
            strike_count: 4,
            origin: FireOrigin::Manual,
        });
        settle(Duration::from_secs(12)).await;
        bus.emit(EngineEvent::Stop);
        settle(Duration::from_secs(60)).await;

        assert_eq!(sink.strikes().len(), 2);
        assert!(!handle.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_fire_replaces_running_sequence() {
        let (bus, sink, handle) = start();

        bus.emit(EngineEvent::Fire {
            strike_count: 4,
            origin: FireOrigin::Auto,
        });
        settle(Duration::from_secs(1)).await;
        bus.emit(EngineEvent::Fire {
            strike_count: 2,
            origin: FireOrigin::Manual,
        });
        settle(Duration::from_secs(60)).await;

        let strikes = sink.strikes();
        assert_eq!(strikes.len(), 3);
        assert_eq!(strikes[0].total, 4);
        assert!(strikes[1..].iter().all(|s| s.total == 2 && s.origin == FireOrigin::Manual));
        assert_eq!(handle.log().entries()[0].origin, FireOrigin::Manual);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_strikes_is_ignored() {
        let (bus, sink, handle) = start();

        bus.emit(EngineEvent::Fire {
            strike_count: 0,
            origin: FireOrigin::Manual,
        });
        settle(Duration::from_secs(1)).await;

        assert!(sink.strikes().is_empty());
        assert!(handle.log().entries().is_empty());
    }
}
