use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::parse_line;
use super::stream::{EventStream, StreamError};
use crate::config::StreamConfig;
use crate::controller::HeatController;
use crate::domain::{Action, Command};

/// Counters for one ingestion session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines: u64,
    pub events: u64,
    pub skipped: u64,
    pub commands: u64,
}

/// Outcome of a single stream line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Keep-alive, or an id nobody cares about
    Ignored,
    /// Demand update, or a room decision that needed no command
    Applied(Option<Command>),
    /// Malformed line or switch failure; already logged
    Skipped,
}

/// Parses and applies one line. Errors are logged here and never escape.
pub async fn process_line(
    controller: &mut HeatController,
    line: &str,
    now: DateTime<Utc>,
) -> LineOutcome {
    let event = match parse_line(line, |id| controller.is_room(id)) {
        Ok(Some(event)) => event,
        Ok(None) => return LineOutcome::Ignored,
        Err(e) => {
            warn!(error = %e, line, "failed to decode stream line");
            return LineOutcome::Skipped;
        }
    };

    match controller.apply(event, now).await {
        Ok(cmd) => LineOutcome::Applied(cmd),
        Err(e) => {
            warn!(error = %e, "switch error, reading dropped");
            LineOutcome::Skipped
        }
    }
}

/// One connection: read lines in arrival order until the server closes the
/// stream or a transport error occurs.
pub async fn run_session(
    controller: &mut HeatController,
    client: &reqwest::Client,
    cfg: &StreamConfig,
) -> Result<SessionStats, StreamError> {
    let mut stream = EventStream::connect(client, &cfg.url, cfg.idle_timeout()).await?;
    info!(url = %cfg.url, "connected to event stream");

    let mut stats = SessionStats::default();
    while let Some(line) = stream.next_line(cfg.idle_timeout()).await? {
        stats.lines += 1;
        match process_line(controller, &line, Utc::now()).await {
            LineOutcome::Ignored => {}
            LineOutcome::Applied(cmd) => {
                stats.events += 1;
                if cmd.is_some_and(|c| c.action != Action::NoAction) {
                    stats.commands += 1;
                }
            }
            LineOutcome::Skipped => stats.skipped += 1,
        }
    }
    Ok(stats)
}

/// Keeps an ingestion session running until cancelled, reconnecting after a
/// fixed delay whenever a session ends.
#[derive(Debug)]
pub struct Supervisor {
    controller: HeatController,
    cfg: StreamConfig,
    client: reqwest::Client,
}

impl Supervisor {
    pub fn new(controller: HeatController, cfg: StreamConfig) -> Result<Self, StreamError> {
        // No overall request timeout: the response body never completes.
        // Header and body waits are bounded by the idle timeout instead.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("heat-ctrl/0.3")
            .build()?;
        Ok(Self {
            controller,
            cfg,
            client,
        })
    }

    pub fn controller(&self) -> &HeatController {
        &self.controller
    }

    pub fn into_controller(self) -> HeatController {
        self.controller
    }

    /// Returns once `cancel` fires. A command already sent to a switch is
    /// left as is.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let retry = self.cfg.retry_interval();
        let mut session: u64 = 0;

        loop {
            session += 1;
            debug!(session, "starting ingestion session");
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = run_session(&mut self.controller, &self.client, &self.cfg) => outcome,
            };
            match outcome {
                Ok(stats) => info!(
                    session,
                    lines = stats.lines,
                    events = stats.events,
                    skipped = stats.skipped,
                    commands = stats.commands,
                    "event stream closed"
                ),
                Err(e) => warn!(session, error = %e, "ingestion session failed"),
            }

            info!(retry_seconds = retry.as_secs(), "reconnecting after delay");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(retry) => {}
            }
        }
        info!(sessions = session, "ingestion stopped");
    }
}
