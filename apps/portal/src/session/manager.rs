//! Session manager. Owns the combined identity + profile state.
//!
//! ## Architecture
//!
//! ```text
//!  provider session_changes (watch) ─┐
//!  operations (mpsc commands) ───────┼──▶ Coordinator task ──▶ watch<SessionState> ──▶ views
//!  profile resolutions (mpsc) ───────┘         │
//!                                              └── spawns one profile step per identity change
//! ```
//!
//! Only the coordinator mutates state. Every identity change and every
//! sign-out bumps `epoch`; a profile resolution is applied only if its
//! `(epoch, uid)` still matches, so a late result from a superseded fetch is
//! dropped instead of overwriting newer state.
//!
//! While an operation is talking to the provider, session events the provider
//! emits are held back and replayed once the operation has told the
//! coordinator what to do. This keeps each sign-in to a single profile step.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::backend::ProfileStore;
use crate::errors::{AuthError, ProfileSyncError, UpdateError};
use crate::identity::{ExternalProvider, IdentityProvider};
use crate::models::{Identity, NewProfile, Profile, ProfilePatch, ProfileSeed};
use crate::session::state::{SessionFault, SessionPhase, SessionState};

/// How the profile for a freshly resolved identity is obtained.
#[derive(Debug, Clone)]
enum ProfileStep {
    Fetch,
    Create(NewProfile),
    FetchOrCreate(NewProfile),
}

impl ProfileStep {
    fn is_fetch(&self) -> bool {
        matches!(self, ProfileStep::Fetch)
    }

    async fn run(self, store: &dyn ProfileStore, uid: &str) -> Result<Profile, ProfileSyncError> {
        match self {
            ProfileStep::Fetch => store.fetch_profile(uid).await,
            ProfileStep::Create(record) => store.create_profile(&record).await,
            ProfileStep::FetchOrCreate(record) => match store.fetch_profile(uid).await {
                Ok(profile) => Ok(profile),
                Err(e @ ProfileSyncError::Unreachable(_)) => Err(e),
                Err(e) => {
                    debug!(uid, error = %e, "No stored profile, creating one");
                    store.create_profile(&record).await
                }
            },
        }
    }
}

enum Command {
    /// An operation is about to call the provider.
    OpenAuth,
    /// The operation finished without a sign-in to resolve.
    CloseAuth { fault: Option<AuthError> },
    /// The operation signed an identity in; closes its auth window.
    Resolve {
        identity: Identity,
        step: ProfileStep,
        done: oneshot::Sender<()>,
    },
    /// The provider session was cleared; closes its auth window.
    SignedOut { done: oneshot::Sender<()> },
    /// Answers with the epoch the mutation counts against, or `None` when
    /// `uid` is not the current session.
    MutationStarted {
        uid: String,
        epoch: oneshot::Sender<Option<u64>>,
    },
    MutationFinished {
        epoch: Option<u64>,
        profile: Option<Profile>,
        done: Option<oneshot::Sender<()>>,
    },
    ClearError,
}

struct Resolution {
    epoch: u64,
    uid: String,
    outcome: Result<Profile, ProfileSyncError>,
}

struct InFlight {
    uid: String,
    fetch_only: bool,
}

/// Sends a fallback command if dropped before completion, so a cancelled
/// operation never leaves the coordinator waiting on it.
struct Pending {
    commands: mpsc::UnboundedSender<Command>,
    on_drop: Option<Command>,
}

impl Pending {
    fn new(commands: mpsc::UnboundedSender<Command>, on_drop: Command) -> Self {
        Self {
            commands,
            on_drop: Some(on_drop),
        }
    }

    fn complete(mut self, command: Command) -> bool {
        self.on_drop = None;
        self.commands.send(command).is_ok()
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(command) = self.on_drop.take() {
            let _ = self.commands.send(command);
        }
    }
}

struct Coordinator {
    profiles: Arc<dyn ProfileStore>,
    state: watch::Sender<SessionState>,
    resolved_tx: mpsc::UnboundedSender<Resolution>,
    current: SessionState,
    epoch: u64,
    in_flight: Option<InFlight>,
    waiters: Vec<(u64, oneshot::Sender<()>)>,
    open_auth: usize,
    deferred: Option<Option<Identity>>,
    mutations: usize,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut resolutions: mpsc::UnboundedReceiver<Resolution>,
        mut identities: watch::Receiver<Option<Identity>>,
    ) {
        self.current.phase = SessionPhase::Resolving;
        self.publish();

        // Operations issued before the first poll must open their auth window
        // before the provider's current value is looked at.
        let initial = loop {
            let value = identities.borrow_and_update().clone();
            match commands.try_recv() {
                Ok(command) => self.handle(command),
                Err(_) => break value,
            }
        };
        self.on_identity_event(initial);

        let mut provider_open = true;
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(resolution) = resolutions.recv() => self.apply(resolution),
                changed = identities.changed(), if provider_open => match changed {
                    Ok(()) => {
                        let event = identities.borrow_and_update().clone();
                        self.on_identity_event(event);
                    }
                    Err(_) => {
                        warn!("Identity provider closed its session channel");
                        provider_open = false;
                    }
                },
            }
        }

        debug!("Session coordinator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::OpenAuth => self.open_auth += 1,
            Command::CloseAuth { fault } => {
                self.close_auth();
                if let Some(fault) = fault {
                    self.current.error = Some(SessionFault::Auth(fault));
                    self.publish();
                }
                self.flush_deferred();
            }
            Command::Resolve {
                identity,
                step,
                done,
            } => {
                self.close_auth();
                let joinable = self
                    .in_flight
                    .as_ref()
                    .map(|f| f.uid == identity.uid && f.fetch_only && step.is_fetch())
                    .unwrap_or(false);

                let epoch = if joinable {
                    debug!(uid = %identity.uid, "Joining in-flight profile fetch");
                    self.current.identity = Some(identity);
                    self.publish();
                    self.epoch
                } else {
                    self.begin_resolution(identity, step)
                };
                self.waiters.push((epoch, done));
                self.flush_deferred();
            }
            Command::SignedOut { done } => {
                self.close_auth();
                if self.current.phase != SessionPhase::Anonymous {
                    self.enter_anonymous();
                }
                let _ = done.send(());
                self.flush_deferred();
            }
            Command::MutationStarted { uid, epoch } => {
                let counted = if self.current.uid() == Some(uid.as_str()) {
                    self.mutations += 1;
                    self.publish();
                    Some(self.epoch)
                } else {
                    None
                };
                let _ = epoch.send(counted);
            }
            Command::MutationFinished {
                epoch,
                profile,
                done,
            } => {
                if epoch == Some(self.epoch) {
                    self.mutations = self.mutations.saturating_sub(1);
                    if let Some(profile) = profile {
                        if self.current.phase == SessionPhase::Authenticated {
                            self.current.profile = Some(profile);
                        }
                    }
                    self.publish();
                } else if profile.is_some() {
                    debug!(
                        ?epoch,
                        current_epoch = self.epoch,
                        "Profile update belongs to a previous session, not caching"
                    );
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Command::ClearError => {
                self.current.error = None;
                self.publish();
            }
        }
    }

    fn on_identity_event(&mut self, event: Option<Identity>) {
        if self.open_auth > 0 {
            debug!("Holding provider session event until the pending operation reports");
            self.deferred = Some(event);
            return;
        }

        match event {
            None => {
                if self.current.phase != SessionPhase::Anonymous {
                    info!("Provider reports no active session");
                    self.enter_anonymous();
                }
            }
            Some(identity) => {
                let same_user = self.current.uid() == Some(identity.uid.as_str());
                let live = matches!(
                    self.current.phase,
                    SessionPhase::Resolving | SessionPhase::Authenticated
                );
                if same_user && live {
                    // token renewal or display-info change
                    self.current.identity = Some(identity);
                    self.publish();
                } else {
                    self.begin_resolution(identity, ProfileStep::Fetch);
                }
            }
        }
    }

    fn begin_resolution(&mut self, identity: Identity, step: ProfileStep) -> u64 {
        self.epoch += 1;
        let epoch = self.epoch;
        let uid = identity.uid.clone();
        debug!(epoch, uid, "Resolving profile");

        self.in_flight = Some(InFlight {
            uid: uid.clone(),
            fetch_only: step.is_fetch(),
        });
        self.mutations = 0;
        self.current.phase = SessionPhase::Resolving;
        self.current.identity = Some(identity);
        self.current.profile = None;
        self.current.error = None;
        self.publish();
        self.settle_waiters();

        let profiles = Arc::clone(&self.profiles);
        let resolved_tx = self.resolved_tx.clone();
        tokio::spawn(async move {
            let outcome = step.run(profiles.as_ref(), &uid).await;
            let _ = resolved_tx.send(Resolution {
                epoch,
                uid,
                outcome,
            });
        });

        epoch
    }

    fn apply(&mut self, resolution: Resolution) {
        let Resolution {
            epoch,
            uid,
            outcome,
        } = resolution;

        let current = epoch == self.epoch
            && self.current.phase == SessionPhase::Resolving
            && self.current.uid() == Some(uid.as_str());
        if !current {
            debug!(
                epoch,
                current_epoch = self.epoch,
                uid,
                "Discarding stale profile resolution"
            );
            return;
        }

        self.in_flight = None;
        match outcome {
            Ok(profile) => {
                info!(uid, "Profile loaded");
                self.current.profile = Some(profile);
                self.current.error = None;
            }
            Err(e) => {
                warn!(uid, error = %e, "Profile sync failed, continuing without profile");
                self.current.profile = None;
                self.current.error = Some(SessionFault::ProfileSync(e));
            }
        }
        self.current.phase = SessionPhase::Authenticated;
        self.publish();
        self.settle_waiters();
    }

    fn enter_anonymous(&mut self) {
        self.epoch += 1;
        self.in_flight = None;
        self.mutations = 0;
        self.current.phase = SessionPhase::Anonymous;
        self.current.identity = None;
        self.current.profile = None;
        self.current.error = None;
        self.publish();
        self.settle_waiters();
    }

    fn close_auth(&mut self) {
        self.open_auth = self.open_auth.saturating_sub(1);
    }

    fn flush_deferred(&mut self) {
        if self.open_auth == 0 {
            if let Some(event) = self.deferred.take() {
                self.on_identity_event(event);
            }
        }
    }

    /// Releases operations whose resolution finished or was superseded.
    fn settle_waiters(&mut self) {
        let epoch = self.epoch;
        let resolving = self.current.phase == SessionPhase::Resolving;
        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .waiters
            .drain(..)
            .partition(|(e, _)| *e != epoch || !resolving);
        self.waiters = waiting;
        for (_, done) in ready {
            let _ = done.send(());
        }
    }

    fn publish(&mut self) {
        self.current.loading = matches!(
            self.current.phase,
            SessionPhase::Unresolved | SessionPhase::Resolving
        ) || self.mutations > 0;

        let next = &self.current;
        self.state.send_if_modified(|published| {
            if published == next {
                return false;
            }
            *published = next.clone();
            true
        });
    }
}

/// Handle to the session. Cheap to clone; every clone talks to the same
/// coordinator task, which stops once the last handle is dropped.
#[derive(Clone)]
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionManager {
    /// Spawns the coordinator on the current tokio runtime.
    pub fn start(provider: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();
        let identities = provider.session_changes();

        let coordinator = Coordinator {
            profiles: Arc::clone(&profiles),
            state: state_tx,
            resolved_tx,
            current: SessionState::default(),
            epoch: 0,
            in_flight: None,
            waiters: Vec::new(),
            open_auth: 0,
            deferred: None,
            mutations: 0,
        };
        tokio::spawn(coordinator.run(commands_rx, resolved_rx, identities));

        Self {
            provider,
            profiles,
            commands: commands_tx,
            state: state_rx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Waits until the session is no longer loading and returns that state.
    pub async fn resolved(&self) -> SessionState {
        let mut rx = self.state.clone();
        let settled = rx.wait_for(|s| !s.loading).await.map(|s| s.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        seed: ProfileSeed,
    ) -> Result<Identity, AuthError> {
        let window = self.open_auth_window()?;
        let mut identity = match self.provider.create_account(email, password).await {
            Ok(identity) => identity,
            Err(e) => return Err(self.fail_auth(window, e)),
        };

        let info = seed.display_info();
        if !info.is_empty() {
            match self.provider.update_display_info(&identity, &info).await {
                Ok(updated) => identity = updated,
                Err(e) => {
                    warn!(uid = %identity.uid, error = %e, "Could not set display info on new account")
                }
            }
        }

        let record = NewProfile::from_seed(&identity, &seed, Utc::now());
        self.resolve(window, identity.clone(), ProfileStep::Create(record))
            .await?;
        info!(uid = %identity.uid, "Signed up");
        Ok(identity)
    }

    pub async fn log_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let window = self.open_auth_window()?;
        let identity = match self.provider.authenticate(email, password).await {
            Ok(identity) => identity,
            Err(e) => return Err(self.fail_auth(window, e)),
        };

        self.resolve(window, identity.clone(), ProfileStep::Fetch)
            .await?;
        info!(uid = %identity.uid, "Logged in");
        Ok(identity)
    }

    /// Returns `Ok(None)` when the user cancels the provider's flow; the
    /// session is left as it was.
    pub async fn sign_in_with_external_provider(
        &self,
        provider: ExternalProvider,
    ) -> Result<Option<Identity>, AuthError> {
        let window = self.open_auth_window()?;
        let identity = match self.provider.authenticate_interactive(provider).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                info!(%provider, "External sign-in cancelled");
                window.complete(Command::CloseAuth { fault: None });
                return Ok(None);
            }
            Err(e) => return Err(self.fail_auth(window, e)),
        };

        let record = NewProfile::from_identity(&identity, Utc::now());
        self.resolve(window, identity.clone(), ProfileStep::FetchOrCreate(record))
            .await?;
        info!(uid = %identity.uid, %provider, "Signed in with external provider");
        Ok(Some(identity))
    }

    /// Returns once the cleared state has been published.
    pub async fn log_out(&self) -> Result<(), AuthError> {
        let window = self.open_auth_window()?;
        if let Err(e) = self.provider.sign_out().await {
            return Err(self.fail_auth(window, e));
        }

        let (done, cleared) = oneshot::channel();
        if !window.complete(Command::SignedOut { done }) {
            return Err(AuthError::SessionClosed);
        }
        cleared.await.map_err(|_| AuthError::SessionClosed)?;
        info!("Logged out");
        Ok(())
    }

    /// Saves a partial update. The cached profile is replaced with the
    /// server's reply on success and left untouched on failure.
    pub async fn update_profile(
        &self,
        uid: &str,
        mut patch: ProfilePatch,
    ) -> Result<Profile, UpdateError> {
        let (epoch_tx, epoch_rx) = oneshot::channel();
        self.commands
            .send(Command::MutationStarted {
                uid: uid.to_string(),
                epoch: epoch_tx,
            })
            .map_err(|_| UpdateError::SessionClosed)?;
        let epoch = epoch_rx.await.map_err(|_| UpdateError::SessionClosed)?;
        let mutation = Pending::new(
            self.commands.clone(),
            Command::MutationFinished {
                epoch,
                profile: None,
                done: None,
            },
        );

        patch.updated_at = Some(Utc::now());
        match self.profiles.update_profile(uid, &patch).await {
            Ok(profile) => {
                let (done, cached) = oneshot::channel();
                let sent = mutation.complete(Command::MutationFinished {
                    epoch,
                    profile: Some(profile.clone()),
                    done: Some(done),
                });
                if sent {
                    let _ = cached.await;
                }
                info!(uid, "Profile updated");
                Ok(profile)
            }
            Err(e) => {
                warn!(uid, error = %e, "Profile update failed, keeping cached profile");
                drop(mutation);
                Err(e)
            }
        }
    }

    pub fn clear_error(&self) {
        let _ = self.commands.send(Command::ClearError);
    }

    fn open_auth_window(&self) -> Result<Pending, AuthError> {
        self.commands
            .send(Command::ClearError)
            .and_then(|_| self.commands.send(Command::OpenAuth))
            .map_err(|_| AuthError::SessionClosed)?;
        Ok(Pending::new(
            self.commands.clone(),
            Command::CloseAuth { fault: None },
        ))
    }

    fn fail_auth(&self, window: Pending, error: AuthError) -> AuthError {
        warn!(error = %error, "Identity provider rejected the request");
        window.complete(Command::CloseAuth {
            fault: Some(error.clone()),
        });
        error
    }

    async fn resolve(
        &self,
        window: Pending,
        identity: Identity,
        step: ProfileStep,
    ) -> Result<(), AuthError> {
        let (done, settled) = oneshot::channel();
        if !window.complete(Command::Resolve {
            identity,
            step,
            done,
        }) {
            return Err(AuthError::SessionClosed);
        }
        settled.await.map_err(|_| AuthError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        stored: Mutex<Vec<Profile>>,
        unreachable: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl ProfileStore for RecordingStore {
        async fn create_profile(&self, record: &NewProfile) -> Result<Profile, ProfileSyncError> {
            self.calls.lock().await.push("create");
            let profile = Profile {
                uid: record.uid.clone(),
                display_name: Some(record.display_name.clone()),
                ..Default::default()
            };
            self.stored.lock().await.push(profile.clone());
            Ok(profile)
        }

        async fn fetch_profile(&self, uid: &str) -> Result<Profile, ProfileSyncError> {
            self.calls.lock().await.push("fetch");
            if self.unreachable {
                return Err(ProfileSyncError::Unreachable("connection refused".to_string()));
            }
            self.stored
                .lock()
                .await
                .iter()
                .find(|p| p.uid == uid)
                .cloned()
                .ok_or_else(|| ProfileSyncError::Rejected("User not found".to_string()))
        }

        async fn update_profile(
            &self,
            _uid: &str,
            _patch: &ProfilePatch,
        ) -> Result<Profile, UpdateError> {
            self.calls.lock().await.push("update");
            Err(UpdateError::Rejected("read-only".to_string()))
        }
    }

    fn record(uid: &str) -> NewProfile {
        NewProfile::from_identity(&Identity::new(uid, None), Utc::now())
    }

    #[tokio::test]
    async fn test_fetch_or_create_creates_when_missing() {
        let store = RecordingStore::default();
        let profile = ProfileStep::FetchOrCreate(record("g-1"))
            .run(&store, "g-1")
            .await
            .unwrap();

        assert_eq!(profile.uid, "g-1");
        assert_eq!(*store.calls.lock().await, vec!["fetch", "create"]);
    }

    #[tokio::test]
    async fn test_fetch_or_create_reuses_existing_profile() {
        let store = RecordingStore::default();
        store.create_profile(&record("g-1")).await.unwrap();
        store.calls.lock().await.clear();

        ProfileStep::FetchOrCreate(record("g-1"))
            .run(&store, "g-1")
            .await
            .unwrap();
        assert_eq!(*store.calls.lock().await, vec!["fetch"]);
    }

    #[tokio::test]
    async fn test_fetch_or_create_does_not_create_when_backend_is_down() {
        let store = RecordingStore {
            unreachable: true,
            ..Default::default()
        };
        let err = ProfileStep::FetchOrCreate(record("g-1"))
            .run(&store, "g-1")
            .await
            .unwrap_err();

        assert!(matches!(err, ProfileSyncError::Unreachable(_)));
        assert_eq!(*store.calls.lock().await, vec!["fetch"]);
    }

    #[tokio::test]
    async fn test_update_after_shutdown_is_refused() {
        let (commands, closed) = mpsc::unbounded_channel();
        drop(closed);
        let (_state_tx, state) = watch::channel(SessionState::default());
        let store = Arc::new(RecordingStore::default());
        let session = SessionManager {
            provider: Arc::new(crate::identity::MemoryIdentityProvider::new()),
            profiles: store.clone(),
            commands,
            state,
        };

        let err = session
            .update_profile("u-1", ProfilePatch::default())
            .await
            .unwrap_err();
        assert_eq!(err, UpdateError::SessionClosed);
        assert!(store.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_sends_fallback_when_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(Pending::new(tx.clone(), Command::CloseAuth { fault: None }));
        assert!(matches!(rx.recv().await, Some(Command::CloseAuth { fault: None })));

        let pending = Pending::new(tx, Command::CloseAuth { fault: None });
        assert!(pending.complete(Command::ClearError));
        assert!(matches!(rx.recv().await, Some(Command::ClearError)));
        assert!(rx.try_recv().is_err());
    }
}
