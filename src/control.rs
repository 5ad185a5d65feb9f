//! Operator control surface
//!
//! The API a presentation layer (web UI, CLI) drives the bot through:
//! `start` / `stop` / `stream_logs`. One bot instance at a time; stop is
//! cooperative and lets any in-flight order step finish first.

use std::sync::Mutex;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::BotConfig;
use crate::execution::{PositionController, StartupError};
use crate::logs::{self, LogStream};
use crate::strategy::{SupertrendStrategy, TrendStrategy};
use crate::Result;

struct RunningBot {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<std::result::Result<(), StartupError>>,
    /// Handed out once; the stream is not restartable
    stream: Option<LogStream>,
}

/// Owns at most one running controller task
#[derive(Default)]
pub struct BotSupervisor {
    inner: Mutex<Option<RunningBot>>,
}

impl BotSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a controller with the default Supertrend strategy
    pub fn start(&self, config: BotConfig) -> Result<()> {
        self.start_with_strategy(config, SupertrendStrategy::default())
    }

    /// Start a controller; rejects if one is already running
    pub fn start_with_strategy<S>(&self, config: BotConfig, strategy: S) -> Result<()>
    where
        S: TrendStrategy + 'static,
    {
        let mut inner = self.inner.lock().unwrap();

        if let Some(running) = inner.as_ref() {
            if !running.handle.is_finished() {
                return Err("Bot is already running!".into());
            }
        }

        let (sink, stream) = logs::channel(logs::DEFAULT_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        let controller = PositionController::new(config, strategy, sink);

        let handle = tokio::spawn(async move {
            let result = controller.run(stop_rx).await;
            if let Err(ref e) = result {
                tracing::error!("Bot exited during startup: {}", e);
            }
            result
        });

        *inner = Some(RunningBot {
            stop_tx,
            handle,
            stream: Some(stream),
        });
        Ok(())
    }

    /// Signal cooperative cancellation
    ///
    /// The loop finishes any in-flight cycle before honoring this.
    pub fn stop(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        match inner.as_ref() {
            Some(running) => {
                let _ = running.stop_tx.send(true);
                Ok(())
            }
            None => Err("Bot not running".into()),
        }
    }

    /// Take the log stream; available exactly once per started bot
    pub fn stream_logs(&self) -> Result<LogStream> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .as_mut()
            .ok_or("Bot not running")?
            .stream
            .take()
            .ok_or_else(|| "Log stream already taken".into())
    }

    /// Wait for the running task to finish (after `stop`, or a fatal
    /// startup failure)
    pub async fn join(&self) -> Result<()> {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            match inner.take() {
                Some(running) => running.handle,
                None => return Err("Bot not running".into()),
            }
        };
        handle.await??;
        Ok(())
    }
}
