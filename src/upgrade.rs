// src/upgrade.rs
//
// Firmware upgrade controller. One session per mounted upgrade handler:
// a one-shot advisory-URL fetch at start, a recurring progress poll for
// the session's lifetime, and a fire-and-forget image upload. Poll
// failures are expected while the device reboots and are swallowed;
// teardown cancels the poll on every exit path.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ControlConfig;
use crate::rpc::{
    self, DeviceTransport, DoFieldUpgrade, DoFieldUpgradeArgs, GetFirmwareUrl, Progress, RpcError,
};

/// What the host should render for the session right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeDisplay {
    /// No progress observed yet: advisory link (if known) plus the upload
    /// control. A reported 0% is NOT this state — see `InProgress`.
    Offer { firmware_url: Option<String> },
    /// An upgrade is underway; the upload control is hidden.
    InProgress(u8),
    /// Progress reached 100. Terminal until the session is recreated.
    Done,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0:?} does not have a firmware image extension")]
    NotFirmware(String),
    #[error("another upload is already in flight")]
    UploadInFlight,
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

struct PollState {
    /// Most recently observed progress. `None` means no upgrade observed —
    /// distinct from a legitimately reported 0%.
    progress: Option<u8>,
    /// Sequence number of the most recently issued poll. Overlapping polls
    /// resolve in arbitrary order; only the newest issued may apply.
    last_issued: u64,
}

struct SessionShared {
    transport: Arc<dyn DeviceTransport>,
    cancelled: AtomicBool,
    upload_in_flight: AtomicBool,
    state: Mutex<PollState>,
}

impl SessionShared {
    fn apply_progress(&self, seq: u64, value: u8) {
        // The session may have been torn down while this poll was in
        // flight; never write through a destroyed session.
        if self.cancelled.load(Ordering::Relaxed) {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            if seq != state.last_issued {
                tlog!("[upgrade] discarding stale poll result (seq {})", seq);
                return;
            }
            if state.progress == Some(100) {
                // Done is terminal for this session
                return;
            }
            state.progress = Some(value);
        }
    }

    fn issue_seq(&self) -> Option<u64> {
        let mut state = self.state.lock().ok()?;
        state.last_issued += 1;
        Some(state.last_issued)
    }
}

/// Session-scoped firmware upgrade state machine. Owns the recurring
/// progress poll; dropping the session cancels it.
pub struct UpgradeSession {
    shared: Arc<SessionShared>,
    firmware_url: Option<String>,
    firmware_extensions: Vec<String>,
    poll_task: JoinHandle<()>,
}

impl UpgradeSession {
    /// Fetch the advisory download URL once (failure leaves it absent; not
    /// an error condition), then start polling progress at the configured
    /// cadence.
    pub async fn start(transport: Arc<dyn DeviceTransport>, config: &ControlConfig) -> Self {
        let firmware_url = rpc::invoke::<GetFirmwareUrl>(transport.as_ref(), ())
            .await
            .ok()
            .flatten();

        let shared = Arc::new(SessionShared {
            transport,
            cancelled: AtomicBool::new(false),
            upload_in_flight: AtomicBool::new(false),
            state: Mutex::new(PollState {
                progress: None,
                last_issued: 0,
            }),
        });

        let poll_task = tokio::spawn(poll_loop(shared.clone(), config.poll_cadence()));

        Self {
            shared,
            firmware_url,
            firmware_extensions: config.firmware_extensions.clone(),
            poll_task,
        }
    }

    pub fn firmware_url(&self) -> Option<&str> {
        self.firmware_url.as_deref()
    }

    pub fn progress(&self) -> Option<u8> {
        self.shared.state.lock().ok().and_then(|s| s.progress)
    }

    pub fn upload_in_flight(&self) -> bool {
        self.shared.upload_in_flight.load(Ordering::SeqCst)
    }

    pub fn display(&self) -> UpgradeDisplay {
        match self.progress() {
            None => UpgradeDisplay::Offer {
                firmware_url: self.firmware_url.clone(),
            },
            Some(100) => UpgradeDisplay::Done,
            Some(p) => UpgradeDisplay::InProgress(p),
        }
    }

    /// Read the selected file fully into memory and transmit it. The
    /// extension must signal a firmware image; everything else is rejected
    /// before the file is touched.
    pub async fn upload_file(&self, path: &Path) -> Result<(), UploadError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !self.firmware_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            return Err(UploadError::NotFirmware(path.display().to_string()));
        }
        let data = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.upload_bytes(data).await
    }

    /// Transmit an already-read image: exactly one `do_field_upgrade`
    /// invocation per call. Failure is surfaced to the caller but does not
    /// change polling behavior. A second upload while one is in flight is
    /// rejected.
    pub async fn upload_bytes(&self, data: Vec<u8>) -> Result<(), UploadError> {
        if self.shared.upload_in_flight.swap(true, Ordering::SeqCst) {
            return Err(UploadError::UploadInFlight);
        }

        let digest = Sha256::digest(&data);
        tlog!(
            "[upgrade] uploading image ({} bytes, sha256 {})",
            data.len(),
            hex::encode(digest)
        );

        let result =
            rpc::invoke::<DoFieldUpgrade>(self.shared.transport.as_ref(), DoFieldUpgradeArgs { data })
                .await;
        self.shared.upload_in_flight.store(false, Ordering::SeqCst);

        result?;
        tlog!("[upgrade] image accepted by device");
        Ok(())
    }
}

impl Drop for UpgradeSession {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::Relaxed);
        self.poll_task.abort();
    }
}

async fn poll_loop(shared: Arc<SessionShared>, cadence: Duration) {
    let mut ticker = tokio::time::interval(cadence);
    loop {
        ticker.tick().await;
        if shared.cancelled.load(Ordering::Relaxed) {
            break;
        }
        let Some(seq) = shared.issue_seq() else { break };

        // The resolution may outlive this tick (or the session); it checks
        // cancellation and the sequence guard before touching state.
        let shared = shared.clone();
        tokio::spawn(async move {
            match rpc::invoke::<Progress>(shared.transport.as_ref(), ()).await {
                Ok(value) => shared.apply_progress(seq, value),
                // A failed poll usually means the device has not reappeared
                // yet — not an operator-facing error, no state change.
                Err(_) => (),
            }
        });
    }
}
