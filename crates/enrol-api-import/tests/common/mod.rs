//! Integration test helpers for enrol-api-import.
//!
//! Wires the pipeline and token lifecycle to in-memory stores, a recording
//! notifier and a manual clock, and provides CSV and multipart fixtures.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use enrol_api_import::{
    provisioning_router, Clock, ImportConfig, IngestPipeline, NotificationDispatcher, Notifier,
    NotifierError, ProvisioningState, TokenConfig, TokenLifecycleManager, TokenMessage,
};
use enrol_auth::{PasswordHasher, PasswordPolicy};
use enrol_db::{
    Directory, MemoryDirectory, MemoryTokenStore, NewUser, StoreError, UserId, UserMetadata,
    UserRecord,
};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub const STRONG_PASSWORD: &str = "Str0ng!Pass";
pub const HEADER: &str = "email,first_name,last_name,university";

/// Build a CSV upload from data lines.
pub fn csv(lines: &[&str]) -> Vec<u8> {
    let mut out = String::from(HEADER);
    for line in lines {
        out.push('\n');
        out.push_str(line);
    }
    out.push('\n');
    out.into_bytes()
}

/// A row with every required column filled in.
pub fn student(email: &str) -> String {
    format!("{email},First,Last,Test University")
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Records every delivered message. Can be told to fail for some addresses.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<TokenMessage>>,
    fail_for: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail_for(&self, email: &str) {
        self.fail_for.lock().unwrap().insert(email.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_for.lock().unwrap().clear();
        self.fail_all.store(false, Ordering::SeqCst);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<TokenMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Most recent token delivered to `email`.
    pub fn token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.email == email)
            .map(|m| m.token.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_token(&self, message: &TokenMessage) -> Result<(), NotifierError> {
        if self.fail_all.load(Ordering::SeqCst)
            || self.fail_for.lock().unwrap().contains(&message.email)
        {
            return Err(NotifierError::Rejected("mail relay refused".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Directory with fault injection
// ---------------------------------------------------------------------------

/// Delegates to a `MemoryDirectory`; individual operations can be made to fail.
pub struct FaultyDirectory {
    pub inner: Arc<MemoryDirectory>,
    pub fail_lookup: AtomicBool,
    /// Fail lookups of this one email only.
    pub fail_lookup_for: Mutex<Option<String>>,
    pub fail_activate: AtomicBool,
    /// Delay before `set_password_and_activate` answers.
    pub activate_delay_ms: AtomicU64,
}

impl FaultyDirectory {
    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Directory for FaultyDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Self::check(&self.fail_lookup)?;
        if self.fail_lookup_for.lock().unwrap().as_deref() == Some(email) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        self.inner.find_by_email(email).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        self.inner.insert(user).await
    }

    async fn set_password_and_activate(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError> {
        let delay = self.activate_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(StdDuration::from_millis(delay)).await;
        }
        Self::check(&self.fail_activate)?;
        self.inner.set_password_and_activate(id, password_hash).await
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub struct TestContext {
    pub users: Arc<MemoryDirectory>,
    pub directory: Arc<FaultyDirectory>,
    pub tokens: Arc<MemoryTokenStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub lifecycle: Arc<TokenLifecycleManager>,
    pub pipeline: Arc<IngestPipeline>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(ImportConfig::default())
    }

    pub fn with_config(config: ImportConfig) -> Self {
        init_test_logging();

        let users = Arc::new(MemoryDirectory::new());
        let directory = Arc::new(FaultyDirectory {
            inner: users.clone(),
            fail_lookup: AtomicBool::new(false),
            fail_lookup_for: Mutex::new(None),
            fail_activate: AtomicBool::new(false),
            activate_delay_ms: AtomicU64::new(0),
        });
        let tokens = Arc::new(MemoryTokenStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new());

        let dispatcher = NotificationDispatcher::new(
            notifier.clone(),
            StdDuration::from_secs(1),
            "https://portal.test.edu",
        );
        let lifecycle = Arc::new(
            TokenLifecycleManager::new(
                directory.clone(),
                tokens.clone(),
                dispatcher,
                TokenConfig::default(),
                PasswordPolicy::default(),
            )
            .with_hasher(fast_hasher())
            .with_clock(clock.clone()),
        );
        let pipeline = Arc::new(IngestPipeline::new(
            directory.clone(),
            lifecycle.clone(),
            config,
        ));

        Self {
            users,
            directory,
            tokens,
            notifier,
            clock,
            lifecycle,
            pipeline,
        }
    }

    pub fn router(&self) -> Router {
        provisioning_router(ProvisioningState::new(
            self.pipeline.clone(),
            self.lifecycle.clone(),
        ))
    }

    /// Seed a pending user directly in the directory.
    pub async fn seed_user(&self, email: &str) -> UserRecord {
        self.users
            .insert(NewUser {
                email: email.to_string(),
                metadata: UserMetadata {
                    first_name: Some("Seeded".to_string()),
                    ..Default::default()
                },
            })
            .await
            .expect("seed user")
    }

    /// Request a token for `email` and return the delivered value.
    pub async fn request_token(&self, email: &str) -> String {
        self.lifecycle
            .request_token(email)
            .await
            .expect("request token")
            .token
            .value
    }
}

/// Argon2id with minimal cost so tests stay fast.
pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::with_params(1024, 1, 1).expect("valid argon2 params")
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

pub const BOUNDARY: &str = "enrol-test-boundary";

/// Encode a multipart/form-data body. `filename` marks a file field.
pub fn multipart_body(fields: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: text/csv\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
