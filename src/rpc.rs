// src/rpc.rs
//
// Typed request/response contract layer. The operation catalog is the
// closed set of `Operation` impls below; `invoke` is the single generic
// primitive. An invocation with a mismatched argument or reply shape does
// not compile, so no malformed request ever reaches the transport.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Identity bounds (catalog contracts, not renegotiated at runtime)
// ============================================================================

/// Highest assignable bus id. 62 is the reserved upper bound shown in the
/// id dialog, 63 is broadcast.
pub const MAX_ASSIGNABLE_ID: u8 = 61;

/// Reserved, displayed-but-exclusive bound of the id dialog.
pub const RESERVED_ID_BOUND: u8 = 62;

/// Broadcast id; never assignable to a device.
pub const BROADCAST_ID: u8 = 63;

/// Maximum device name length, in characters.
pub const MAX_NAME_LEN: usize = 16;

// ============================================================================
// Failures
// ============================================================================

/// Failure surfaced by a single invocation. The layer performs no retry;
/// retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("device is disconnected or unreachable")]
    Disconnected,
    #[error("operation rejected by device firmware: {0}")]
    Rejected(String),
    #[error("failed to encode request arguments: {0}")]
    Encode(serde_json::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

// ============================================================================
// Transport and invocation primitive
// ============================================================================

/// Reliable asynchronous call/response primitive supplied by the host.
/// Bus-level framing is the host's concern. Operations without a reply
/// must resolve with JSON `null`.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn call(
        &self,
        operation: &'static str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError>;
}

/// One entry of a device family's operation catalog: a wire name bound to
/// its argument and reply shapes at compile time.
pub trait Operation {
    const NAME: &'static str;
    type Args: Serialize + Send;
    type Reply: DeserializeOwned;
}

/// Invoke operation `O` on a device. Resolves with `O::Reply` or a single
/// `RpcError`; never retries.
pub async fn invoke<O: Operation>(
    transport: &dyn DeviceTransport,
    args: O::Args,
) -> Result<O::Reply, RpcError> {
    let args = serde_json::to_value(args).map_err(RpcError::Encode)?;
    let reply = transport.call(O::NAME, args).await?;
    serde_json::from_value(reply)
        .map_err(|e| RpcError::MalformedResponse(format!("{}: {}", O::NAME, e)))
}

// ============================================================================
// Operation catalog
// ============================================================================

/// Flash the status LED so the operator can find the device on the bench.
pub struct Blink;
impl Operation for Blink {
    const NAME: &'static str = "blink";
    type Args = ();
    type Reply = ();
}

pub struct SetId;
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct SetIdArgs {
    pub id: u8,
}
impl Operation for SetId {
    const NAME: &'static str = "set_id";
    type Args = SetIdArgs;
    type Reply = ();
}

pub struct SetName;
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct SetNameArgs {
    pub name: String,
}
impl Operation for SetName {
    const NAME: &'static str = "set_name";
    type Args = SetNameArgs;
    type Reply = ();
}

/// Persist the current configuration to the device's EEPROM.
pub struct CommitToEeprom;
impl Operation for CommitToEeprom {
    const NAME: &'static str = "commit_to_eeprom";
    type Args = ();
    type Reply = ();
}

/// Read firmware-upgrade progress, 0–100.
pub struct Progress;
impl Operation for Progress {
    const NAME: &'static str = "progress";
    type Args = ();
    type Reply = u8;
}

/// Advisory download link for the device's firmware, if it knows one.
pub struct GetFirmwareUrl;
impl Operation for GetFirmwareUrl {
    const NAME: &'static str = "get_firmware_url";
    type Args = ();
    type Reply = Option<String>;
}

pub struct DoFieldUpgrade;
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct DoFieldUpgradeArgs {
    pub data: Vec<u8>,
}
impl Operation for DoFieldUpgrade {
    const NAME: &'static str = "do_field_upgrade";
    type Args = DoFieldUpgradeArgs;
    type Reply = ();
}
