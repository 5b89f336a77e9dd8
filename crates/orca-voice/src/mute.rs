//! Client-side mute reconciliation.
//!
//! The persisted `is_muted` flag is the source of truth. A [`MuteReconciler`]
//! keeps the local microphone in line with it across the transport's
//! connection lifecycle: once on first connect, again whenever the flag moves,
//! and again after every reconnect (the transport may have rebuilt the track
//! with its own defaults).

use crate::error::VoiceError;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// Connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Whether the reconciler has aligned the track since the last (re)connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePhase {
    #[default]
    Uninitialized,
    Synced,
}

/// Transport-side signals the reconciler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    StateChanged(ConnectionState),
    Reconnected,
}

/// State of the local microphone publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophoneState {
    /// Nothing published.
    Missing,
    /// Published, but the hardware track has ended.
    Ended,
    Live,
}

/// The local participant's audio controls.
///
/// Track enablement and publication mute are separate controls on most
/// transports; both must be driven to the same intent.
#[async_trait]
pub trait LocalAudio: Send {
    fn microphone(&self) -> MicrophoneState;

    /// Creates (or recreates) the microphone publication.
    async fn publish_microphone(&mut self) -> Result<(), VoiceError>;

    async fn set_track_enabled(&mut self, enabled: bool) -> Result<(), VoiceError>;

    async fn set_publication_muted(&mut self, muted: bool) -> Result<(), VoiceError>;
}

pub struct MuteReconciler<A> {
    audio: A,
    muted: watch::Receiver<bool>,
    phase: ReconcilePhase,
    connection: ConnectionState,
}

impl<A: LocalAudio> MuteReconciler<A> {
    pub fn new(audio: A, muted: watch::Receiver<bool>) -> Self {
        Self {
            audio,
            muted,
            phase: ReconcilePhase::Uninitialized,
            connection: ConnectionState::Disconnected,
        }
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub async fn handle(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::StateChanged(state) => {
                self.connection = state;
                if state == ConnectionState::Connected {
                    // First entry forces the sync; later entries re-apply.
                    self.reconcile().await;
                }
            }
            TransportSignal::Reconnected => {
                self.phase = ReconcilePhase::Uninitialized;
                self.connection = ConnectionState::Connected;
                self.reconcile().await;
            }
        }
    }

    /// Called when the persisted flag moved.
    pub async fn flag_changed(&mut self) {
        if self.connection == ConnectionState::Connected {
            self.reconcile().await;
        }
    }

    /// Aligns the microphone with the latest persisted flag.
    ///
    /// Failures are logged and swallowed; the next signal retries.
    pub async fn reconcile(&mut self) {
        let muted = *self.muted.borrow();
        match self.apply(muted).await {
            Ok(()) => {
                if self.phase == ReconcilePhase::Uninitialized {
                    tracing::debug!(muted, "initial mute state applied");
                }
                self.phase = ReconcilePhase::Synced;
            }
            Err(e) => tracing::warn!(muted, error = %e, "failed to reconcile mute state"),
        }
    }

    async fn apply(&mut self, muted: bool) -> Result<(), VoiceError> {
        match self.audio.microphone() {
            MicrophoneState::Live => {}
            state => {
                tracing::debug!(?state, "republishing microphone");
                self.audio.publish_microphone().await?;
            }
        }
        self.audio.set_track_enabled(!muted).await?;
        self.audio.set_publication_muted(muted).await?;
        Ok(())
    }

    /// Drives the reconciler until the transport signal stream closes.
    ///
    /// Returns the audio handle so the caller can tear it down.
    pub async fn run(mut self, mut signals: mpsc::Receiver<TransportSignal>) -> A {
        let mut flag_open = true;
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle(signal).await,
                    None => break,
                },
                changed = self.muted.changed(), if flag_open => match changed {
                    Ok(()) => self.flag_changed().await,
                    Err(_) => flag_open = false,
                },
            }
        }
        self.audio
    }
}
