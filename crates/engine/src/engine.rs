//! Campaign engine. Owns the recipient list and campaign settings, plus the
//! single background control loop that sends one message per recipient.
//!
//! State is published through a `watch` channel holding a
//! [`CampaignSnapshot`]. Only the engine writes to it: control operations
//! apply their transition and side effect under the channel's write lock,
//! so the loop always sees a stop or pause together with its state change.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use multimail_channels::email::{EmailTransport, OutgoingEmail};
use multimail_channels::ingest::RecipientDecoder;
use multimail_core::error::{EngineError, ImportError, TransportError};
use multimail_core::templates;
use multimail_core::types::{CampaignConfig, DeliveryStatus, Recipient, RunState};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::pacing::DelayRange;
use crate::state::CampaignSnapshot;

/// Engine-level settings that are not part of the operator's campaign.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on a single transport call.
    pub send_timeout: Duration,
    pub decoder: RecipientDecoder,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(30),
            decoder: RecipientDecoder::default(),
        }
    }
}

/// Handle to a campaign. Cheap to clone; all clones drive the same run.
#[derive(Clone)]
pub struct CampaignEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    transport: Arc<dyn EmailTransport>,
    settings: EngineSettings,
    config: RwLock<CampaignConfig>,
    state: watch::Sender<CampaignSnapshot>,
    control: Mutex<RunControl>,
    /// Set while a control loop task is alive, including a stopped loop
    /// that has not unwound yet.
    loop_active: AtomicBool,
}

/// Signals for the current run.
struct RunControl {
    cancel: CancellationToken,
    pause: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RunControl {
    fn new() -> Self {
        let (pause, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            pause,
            task: None,
        }
    }
}

impl std::fmt::Debug for CampaignEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.state.borrow();
        f.debug_struct("CampaignEngine")
            .field("state", &snapshot.state)
            .field("progress", &snapshot.progress)
            .field("recipients", &snapshot.recipients.len())
            .finish()
    }
}

impl CampaignEngine {
    pub fn new(transport: Arc<dyn EmailTransport>) -> Self {
        Self::with_settings(transport, EngineSettings::default(), CampaignConfig::default())
    }

    pub fn with_settings(
        transport: Arc<dyn EmailTransport>,
        settings: EngineSettings,
        config: CampaignConfig,
    ) -> Self {
        let (state, _) = watch::channel(CampaignSnapshot::default());
        Self {
            inner: Arc::new(EngineInner {
                transport,
                settings,
                config: RwLock::new(config),
                state,
                control: Mutex::new(RunControl::new()),
                loop_active: AtomicBool::new(false),
            }),
        }
    }

    // ─── Observable state ──────────────────────────────────────────────

    /// Subscribe to state changes. The receiver always holds the latest
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CampaignSnapshot> {
        self.inner.state.subscribe()
    }

    /// A consistent copy of the current state.
    pub fn snapshot(&self) -> CampaignSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn state(&self) -> RunState {
        self.inner.state.borrow().state.clone()
    }

    pub fn progress(&self) -> usize {
        self.inner.state.borrow().progress
    }

    // ─── Configuration ─────────────────────────────────────────────────

    pub fn config(&self) -> CampaignConfig {
        self.inner.config.read().clone()
    }

    /// Replace the campaign settings. Rejected while sending.
    pub fn set_config(&self, config: CampaignConfig) -> Result<(), EngineError> {
        self.update_config(|c| *c = config)
    }

    /// Edit the campaign settings in place. Rejected while sending; edits
    /// made while paused apply from the next recipient.
    pub fn update_config<F>(&self, edit: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut CampaignConfig),
    {
        if self.state() == RunState::Sending {
            return Err(EngineError::Busy("pause or stop before editing the campaign"));
        }
        edit(&mut self.inner.config.write());
        Ok(())
    }

    /// Render the body for the first recipient, or a stand-in name.
    pub fn preview(&self) -> String {
        let template = self.inner.config.read().body_template.clone();
        let snapshot = self.inner.state.borrow();
        templates::preview(&template, snapshot.recipients.first())
    }

    // ─── Recipients ────────────────────────────────────────────────────

    /// Decode `raw` and replace the recipient list. Resets progress and
    /// returns the number of recipients imported.
    pub fn import_recipients(&self, raw: &str) -> Result<usize, EngineError> {
        let decoded = self.inner.settings.decoder.decode(raw);
        self.replace_recipients(decoded)
    }

    /// Read a recipient file and replace the recipient list.
    pub fn import_recipients_from_path(&self, path: &Path) -> Result<usize, EngineError> {
        let decoded = self.inner.settings.decoder.read_path(path);
        self.replace_recipients(decoded)
    }

    fn replace_recipients(
        &self,
        decoded: Result<Vec<Recipient>, ImportError>,
    ) -> Result<usize, EngineError> {
        let _control = self.inner.control.lock();
        if self.inner.loop_active.load(Ordering::SeqCst) {
            return Err(EngineError::Busy("stop the campaign before importing"));
        }

        let recipients = match decoded {
            Ok(recipients) => recipients,
            Err(e) => {
                self.inner
                    .state
                    .send_modify(|s| s.push_log(format!("Error importing recipients: {e}")));
                return Err(e.into());
            }
        };

        let count = recipients.len();
        let mut result = Ok(count);
        self.inner.state.send_modify(|s| {
            if let Err(e) = s.transition(RunState::Idle, "import") {
                result = Err(e);
                return;
            }
            s.recipients = recipients;
            s.progress = 0;
            s.push_log(format!("Imported {count} recipients."));
        });
        result
    }

    /// Append one recipient entered by the operator.
    pub fn add_recipient(&self, name: &str, email: &str) -> Result<Uuid, EngineError> {
        let email = email.trim();
        if !Recipient::is_valid_email(email) {
            return Err(EngineError::InvalidRecipient(email.to_string()));
        }

        let _control = self.inner.control.lock();
        if self.inner.loop_active.load(Ordering::SeqCst) {
            return Err(EngineError::Busy("stop the campaign before adding recipients"));
        }

        let recipient = Recipient::new(name.trim(), email);
        let id = recipient.id;
        debug!(recipient_id = %id, to = %recipient.email, "Recipient added");
        self.inner.state.send_modify(|s| s.recipients.push(recipient));
        Ok(id)
    }

    // ─── Run control ───────────────────────────────────────────────────

    /// Begin a pass over the recipient list, skipping those already sent.
    ///
    /// A no-op while sending. Missing details leave the campaign idle and are
    /// reported through the activity log. Must be called from within a Tokio
    /// runtime.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut control = self.inner.control.lock();
        let config = self.inner.config.read().clone();

        let mut result = Ok(());
        let mut launch = false;
        self.inner.state.send_modify(|s| {
            if s.state == RunState::Sending {
                return;
            }
            if self.inner.loop_active.load(Ordering::SeqCst) {
                result = Err(if s.state.is_active() {
                    EngineError::InvalidTransition {
                        from: s.state.clone(),
                        operation: "start",
                    }
                } else {
                    EngineError::Busy("previous run is still stopping")
                });
                return;
            }

            let mut missing = Vec::new();
            if s.recipients.is_empty() {
                missing.push("recipients");
            }
            missing.extend(config.missing_details());
            if !missing.is_empty() {
                s.push_log(format!(
                    "Error: Missing details to start sending: {}.",
                    missing.join(", ")
                ));
                result = Err(EngineError::MissingDetails(missing));
                return;
            }

            if let Err(e) = s.transition(RunState::Sending, "start") {
                result = Err(e);
                return;
            }
            s.progress = 0;
            let pending = s.recipients.len() - s.sent_count();
            s.push_log(format!("Sending to {pending} recipients..."));
            launch = true;
        });

        if !launch {
            return result;
        }

        let cancel = CancellationToken::new();
        let (pause, pause_rx) = watch::channel(false);
        self.inner.loop_active.store(true, Ordering::SeqCst);
        metrics::counter!("multimail.campaign_runs").increment(1);

        let inner = self.inner.clone();
        let loop_cancel = cancel.clone();
        control.cancel = cancel;
        control.pause = pause;
        control.task = Some(tokio::spawn(async move {
            inner.run(loop_cancel, pause_rx).await;
        }));

        Ok(())
    }

    /// Hold the loop before its next recipient.
    pub fn pause(&self) -> Result<(), EngineError> {
        let control = self.inner.control.lock();
        self.apply(RunState::Paused, "pause", "Paused.", || {
            control.pause.send_replace(true);
        })
    }

    /// Release a paused loop.
    pub fn resume(&self) -> Result<(), EngineError> {
        let control = self.inner.control.lock();
        self.apply(RunState::Sending, "resume", "Resuming...", || {
            control.pause.send_replace(false);
        })
    }

    /// Cancel the run. Takes effect at the loop's next suspension point; an
    /// in-flight send is abandoned.
    pub fn stop(&self) -> Result<(), EngineError> {
        let control = self.inner.control.lock();
        self.apply(RunState::Idle, "stop", "Stopped.", || control.cancel.cancel())
    }

    fn apply<F>(
        &self,
        to: RunState,
        trigger: &'static str,
        message: &str,
        effect: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(),
    {
        let mut result = Ok(());
        self.inner.state.send_modify(|s| match s.transition(to, trigger) {
            Ok(()) => {
                effect();
                s.push_log(message);
            }
            Err(e) => result = Err(e),
        });
        if let Err(e) = &result {
            warn!(error = %e, "Rejected campaign control");
        }
        result
    }

    /// Wait for the current control loop, if any, to finish.
    pub async fn wait(&self) {
        let task = self.inner.control.lock().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Campaign loop task panicked");
            }
        }
    }
}

impl EngineInner {
    /// The control loop. Runs as the only writer of recipient statuses for
    /// the duration of a run.
    async fn run(&self, cancel: CancellationToken, mut pause: watch::Receiver<bool>) {
        let total = self.state.borrow().recipients.len();
        let mut rng = StdRng::from_entropy();

        info!(total, "Campaign loop started");

        for index in 0..total {
            if cancel.is_cancelled() {
                break;
            }
            if !wait_while_paused(&cancel, &mut pause).await {
                break;
            }

            let recipient = self.state.borrow().recipients[index].clone();
            if recipient.status.is_sent() {
                debug!(index, to = %recipient.email, "Already sent, skipping");
                self.state.send_modify(|s| s.progress = index + 1);
                continue;
            }

            let config = self.config.read().clone();
            let email = OutgoingEmail {
                to: recipient.email.clone(),
                subject: config.subject.clone(),
                html_body: templates::personalize(&config.body_template, &recipient),
                sender: config.sender().map(str::to_string),
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(to = %email.to, "Send abandoned by stop");
                    break;
                }
                result = tokio::time::timeout(self.settings.send_timeout, self.transport.send(&email)) => {
                    result.unwrap_or(Err(TransportError::Timeout(self.settings.send_timeout)))
                }
            };

            self.state.send_modify(|s| {
                match &outcome {
                    Ok(()) => {
                        s.recipients[index].status = DeliveryStatus::Sent;
                        s.progress = index + 1;
                        s.push_log(format!("Sent to: {}", email.to));
                    }
                    Err(e) => {
                        s.recipients[index].status = DeliveryStatus::Failed(e.to_string());
                        s.progress = index + 1;
                        s.push_log(format!("Failed: {} - {e}", email.to));
                    }
                }
            });
            match outcome {
                Ok(()) => metrics::counter!("multimail.emails_sent").increment(1),
                Err(_) => metrics::counter!("multimail.emails_failed").increment(1),
            }

            let delay = DelayRange::from_secs(config.min_delay_secs, config.max_delay_secs)
                .sample(&mut rng);
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before next send");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // A pause that lands after the last recipient holds the run until
        // it is resumed or stopped.
        loop {
            let released = wait_while_paused(&cancel, &mut pause).await;
            if self.finish(!released || cancel.is_cancelled()) {
                break;
            }
        }

        info!("Campaign loop finished");
    }

    /// Settle the run once the loop is out of recipients or stopped. Returns
    /// `false` and leaves everything untouched when a pause got in first.
    fn finish(&self, stopped: bool) -> bool {
        self.state.send_if_modified(|s| {
            if stopped {
                s.push_log("Job Stopped.");
            } else if s.state == RunState::Paused {
                return false;
            } else if let Err(e) = s.transition(RunState::Completed, "exhausted") {
                warn!(error = %e, "Campaign loop ended outside of sending");
            } else {
                s.push_log("Job Completed.");
            }
            self.loop_active.store(false, Ordering::SeqCst);
            true
        })
    }
}

/// Block while the pause flag is set. Returns `false` if the run was
/// cancelled first.
async fn wait_while_paused(cancel: &CancellationToken, pause: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        released = pause.wait_for(|paused| !*paused) => released.is_ok(),
    }
}
