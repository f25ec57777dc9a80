//! Analysis session - streams one batch of branch results to a client
//!
//! A session lives for one client connection. It walks the candidate branches
//! in enumeration order and emits a `progress` then a `branch` event for each.
//! Control messages are drained at two fixed points per branch (before
//! dispatch and after classification). While paused the session waits on the
//! control channel and re-announces `paused` on a heartbeat timer.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::analyzer::BranchAnalyzer;
use super::events::{ControlMessage, Event, Inbound};
use crate::config::Config;
use crate::error::SessionError;
use crate::types::BranchRecord;

/// Unique identifier for an analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 chars are plenty in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Fetching,
    Analyzing,
    Paused,
    /// Every branch was reported and `complete` was sent
    Complete,
    /// Client disconnected, sent malformed input or stopped reading events
    Cancelled,
    /// Setup failed before any branch was analyzed
    Failed,
}

/// What a finished session leaves behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub state: SessionState,
    /// Reported branches in report order
    pub analyzed: Vec<String>,
}

/// What woke a paused session
enum Wake {
    Control(Option<Inbound>),
    Heartbeat,
}

/// One client's analysis run
pub struct AnalysisSession {
    id: SessionId,
    analyzer: Arc<BranchAnalyzer>,
    events: mpsc::Sender<Event>,
    controls: mpsc::Receiver<Inbound>,
    state: SessionState,
    analyzed: HashSet<String>,
    report_order: Vec<String>,
    total: usize,
    pacing: Duration,
    heartbeat: Duration,
    fetch: bool,
}

impl AnalysisSession {
    pub fn new(
        analyzer: Arc<BranchAnalyzer>,
        events: mpsc::Sender<Event>,
        controls: mpsc::Receiver<Inbound>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            analyzer,
            events,
            controls,
            state: SessionState::Idle,
            analyzed: HashSet::new(),
            report_order: Vec::new(),
            total: 0,
            pacing: Duration::from_millis(100),
            heartbeat: Duration::from_millis(500),
            fetch: true,
        }
    }

    /// Take pacing, heartbeat and fetch behaviour from configuration
    pub fn configure(mut self, config: &Config) -> Self {
        self.pacing = config.pacing();
        self.heartbeat = config.heartbeat();
        self.fetch = config.fetch_before_analysis;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// A zero period is raised to one millisecond
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat.max(Duration::from_millis(1));
        self
    }

    pub fn with_fetch(mut self, fetch: bool) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Run to completion, cancellation or failure
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn run(mut self) -> SessionOutcome {
        match self.drive().await {
            Ok(()) => {
                info!("Analysis complete, {} branches reported", self.analyzed.len());
                self.state = SessionState::Complete;
            }
            Err(SessionError::Aborted(reason)) => {
                warn!("Analysis aborted: {}", reason);
                self.state = SessionState::Failed;
            }
            Err(e) => {
                info!("Analysis cancelled: {}", e);
                self.state = SessionState::Cancelled;
            }
        }

        SessionOutcome {
            state: self.state,
            analyzed: self.report_order,
        }
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        let info = match self.analyzer.repo_info().await {
            Ok(info) => info,
            Err(e) => return self.abort(e.to_string()).await,
        };
        self.emit(Event::RepoInfo { data: info }).await?;

        if self.fetch {
            self.state = SessionState::Fetching;
            self.emit(Event::status("Fetching latest changes from remote...")).await?;
            if self.analyzer.fetch().await {
                self.emit(Event::status("Fetch completed successfully")).await?;
            } else {
                self.emit(Event::status("Fetch failed, continuing with local data")).await?;
            }
        }

        let branches = match self.analyzer.candidate_branches().await {
            Ok(branches) => branches,
            Err(e) => return self.abort(e.to_string()).await,
        };
        self.total = branches.len();
        self.state = SessionState::Analyzing;

        for branch in branches {
            self.drain_controls().await?;
            if self.analyzed.contains(&branch) {
                debug!("Skipping already reported branch {}", branch);
                continue;
            }

            self.emit(Event::Progress {
                current: self.analyzed.len() + 1,
                total: self.total,
                branch: branch.clone(),
            })
            .await?;

            let record = self.classify(&branch).await;
            self.drain_controls().await?;

            self.analyzed.insert(branch.clone());
            self.report_order.push(branch);
            self.emit(Event::Branch { data: record }).await?;

            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        self.emit(Event::Complete {
            total: self.analyzed.len(),
        })
        .await
    }

    /// Classify on a worker task; a panicking worker becomes a failed record
    async fn classify(&self, branch: &str) -> BranchRecord {
        let analyzer = self.analyzer.clone();
        let name = branch.to_string();
        match tokio::spawn(async move { analyzer.analyze_branch(&name).await }).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Worker for branch {} failed: {}", branch, e);
                BranchRecord::failed(branch, e.to_string())
            }
        }
    }

    async fn abort(&mut self, reason: String) -> Result<(), SessionError> {
        self.emit(Event::error(reason.clone())).await?;
        Err(SessionError::Aborted(reason))
    }

    async fn emit(&self, event: Event) -> Result<(), SessionError> {
        self.events
            .send(event)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Apply every pending control message, then block while paused
    async fn drain_controls(&mut self) -> Result<(), SessionError> {
        loop {
            match self.controls.try_recv() {
                Ok(msg) => self.apply(msg)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(SessionError::Disconnected),
            }
        }

        if self.state == SessionState::Paused {
            self.wait_while_paused().await?;
        }
        Ok(())
    }

    fn apply(&mut self, msg: Inbound) -> Result<(), SessionError> {
        match msg {
            Inbound::Control(ControlMessage::Pause) => {
                if self.state != SessionState::Paused {
                    info!("Pausing analysis after {} branches", self.analyzed.len());
                    self.state = SessionState::Paused;
                }
            }
            Inbound::Control(ControlMessage::Resume) => {
                if self.state == SessionState::Paused {
                    info!("Resuming analysis");
                    self.state = SessionState::Analyzing;
                }
            }
            Inbound::Malformed(raw) => return Err(SessionError::Protocol(raw)),
        }
        Ok(())
    }

    async fn wait_while_paused(&mut self) -> Result<(), SessionError> {
        // First tick fires immediately, announcing the pause
        let mut heartbeat = tokio::time::interval(self.heartbeat);

        while self.state == SessionState::Paused {
            let wake = tokio::select! {
                msg = self.controls.recv() => Wake::Control(msg),
                _ = heartbeat.tick() => Wake::Heartbeat,
            };

            match wake {
                Wake::Control(Some(msg)) => self.apply(msg)?,
                Wake::Control(None) => return Err(SessionError::Disconnected),
                Wake::Heartbeat => {
                    self.emit(Event::Paused {
                        current: self.analyzed.len(),
                        total: self.total,
                    })
                    .await?
                }
            }
        }
        Ok(())
    }
}
