// src/gateway.rs
//
// Config mutation gateway: turns operator intent into validated
// invocations. Validation happens before any request reaches the device;
// invocation failures are reported to the operator and never retried. The
// local descriptor is never mutated here — the host refreshes it from the
// device after a successful change.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::rpc::{
    self, Blink, CommitToEeprom, DeviceTransport, RpcError, SetId, SetIdArgs, SetName,
    SetNameArgs, MAX_ASSIGNABLE_ID, MAX_NAME_LEN,
};

/// Dialog/toast surface supplied by the host.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Yes/no question. `true` means the operator confirmed.
    async fn confirm(&self, message: &str) -> bool;
    /// Ask for a value, prefilled with `current`. `None` means cancelled.
    async fn prompt(&self, message: &str, current: &str) -> Option<String>;
    /// Report a failure (toast or equivalent).
    async fn report_error(&self, context: &str, detail: &str);
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Caught before any invocation; no device contact was made.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Parse and range-check a candidate bus id. Rejection is explicit — an
/// unparsable entry never falls back to a default id.
pub fn parse_device_id(entry: &str) -> Result<u8, String> {
    let id = entry
        .trim()
        .parse::<u8>()
        .map_err(|_| format!("{:?} is not a valid device ID", entry))?;
    if id > MAX_ASSIGNABLE_ID {
        return Err(format!(
            "ID {} is out of range (0-{})",
            id, MAX_ASSIGNABLE_ID
        ));
    }
    Ok(id)
}

/// Length check for a candidate device name.
pub fn validate_name(name: &str) -> Result<(), String> {
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(format!(
            "Name is {} characters; the device stores at most {}",
            len, MAX_NAME_LEN
        ));
    }
    Ok(())
}

pub struct ConfigGateway {
    transport: Arc<dyn DeviceTransport>,
    operator: Arc<dyn Operator>,
}

impl ConfigGateway {
    pub fn new(transport: Arc<dyn DeviceTransport>, operator: Arc<dyn Operator>) -> Self {
        Self { transport, operator }
    }

    /// Prompt for and apply a new bus id. Legal ids are 0..=61. A cancelled
    /// prompt is a no-op; invalid input is rejected without device contact.
    pub async fn change_id(&self, current_id: Option<u8>) -> Result<(), GatewayError> {
        let current = current_id.map(|v| v.to_string()).unwrap_or_default();
        let message = format!("New device ID (0-{})", MAX_ASSIGNABLE_ID);
        let Some(entry) = self.operator.prompt(&message, &current).await else {
            return Ok(());
        };

        let id = match parse_device_id(&entry) {
            Ok(id) => id,
            Err(detail) => return self.reject("set ID", detail).await,
        };

        if let Err(e) = rpc::invoke::<SetId>(self.transport.as_ref(), SetIdArgs { id }).await {
            self.operator.report_error("set ID", &e.to_string()).await;
            return Err(e.into());
        }
        tlog!("[gateway] device ID change to {} accepted", id);
        Ok(())
    }

    /// Prompt for and apply a new display name. Names longer than 16
    /// characters are rejected before the device is contacted.
    pub async fn change_name(&self, current_name: Option<&str>) -> Result<(), GatewayError> {
        let Some(name) = self
            .operator
            .prompt("New device name", current_name.unwrap_or(""))
            .await
        else {
            return Ok(());
        };

        if let Err(detail) = validate_name(&name) {
            return self.reject("set name", detail).await;
        }

        if let Err(e) = rpc::invoke::<SetName>(self.transport.as_ref(), SetNameArgs { name }).await
        {
            self.operator.report_error("set name", &e.to_string()).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Flash the device's status LED. Single-shot, no local state.
    pub async fn blink(&self) -> Result<(), GatewayError> {
        if let Err(e) = rpc::invoke::<Blink>(self.transport.as_ref(), ()).await {
            self.operator.report_error("blink", &e.to_string()).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Persist the current configuration to EEPROM. Single-shot.
    pub async fn commit_to_eeprom(&self) -> Result<(), GatewayError> {
        if let Err(e) = rpc::invoke::<CommitToEeprom>(self.transport.as_ref(), ()).await {
            self.operator
                .report_error("commit to EEPROM", &e.to_string())
                .await;
            return Err(e.into());
        }
        Ok(())
    }

    /// One-way transition into upgrade mode. `start` is the externally
    /// supplied action that actually reboots the device into its
    /// bootloader; it runs only on affirmative confirmation. Returns
    /// whether the transition was started.
    pub async fn request_field_upgrade(
        &self,
        start: BoxFuture<'_, Result<(), RpcError>>,
    ) -> Result<bool, GatewayError> {
        let confirmed = self
            .operator
            .confirm(
                "Field upgrade makes the device unusable until the upgrade completes. Continue?",
            )
            .await;
        if !confirmed {
            return Ok(false);
        }

        match start.await {
            Ok(()) => {
                tlog!("[gateway] field upgrade started");
                Ok(true)
            }
            Err(e) => {
                self.operator
                    .report_error("field upgrade", &e.to_string())
                    .await;
                Err(e.into())
            }
        }
    }

    async fn reject(&self, context: &'static str, detail: String) -> Result<(), GatewayError> {
        self.operator.report_error(context, &detail).await;
        Err(GatewayError::Validation(detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingOperator, ScriptedTransport};
    use serde_json::json;

    fn gateway(
        transport: &Arc<ScriptedTransport>,
        operator: &Arc<RecordingOperator>,
    ) -> ConfigGateway {
        ConfigGateway::new(transport.clone(), operator.clone())
    }

    #[test]
    fn id_boundaries() {
        assert_eq!(parse_device_id("0"), Ok(0));
        assert_eq!(parse_device_id("61"), Ok(61));
        assert!(parse_device_id("62").is_err());
        assert!(parse_device_id("63").is_err());
        assert!(parse_device_id("-1").is_err());
    }

    #[tokio::test]
    async fn valid_id_is_invoked() {
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());
        operator.push_prompt_reply(Some("61".to_string()));

        gateway(&transport, &operator).change_id(Some(5)).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "set_id");
        assert_eq!(calls[0].1, json!({ "id": 61 }));
        assert!(operator.errors().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_id_never_reaches_the_device() {
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());
        operator.push_prompt_reply(Some("62".to_string()));

        let err = gateway(&transport, &operator)
            .change_id(Some(5))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(transport.calls().is_empty());
        assert_eq!(operator.errors().len(), 1);
    }

    #[tokio::test]
    async fn unparsable_id_is_rejected_without_invocation() {
        // The observed behavior in the field silently substituted id 0 on a
        // parse failure. Assigning bus id 0 is not a no-op, so that fallback
        // is rejected here: parse failure means no invocation at all.
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());
        operator.push_prompt_reply(Some("banana".to_string()));

        let err = gateway(&transport, &operator)
            .change_id(Some(5))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn cancelled_prompt_is_a_noop() {
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());
        operator.push_prompt_reply(None);

        gateway(&transport, &operator).change_id(Some(5)).await.unwrap();

        assert!(transport.calls().is_empty());
        assert!(operator.errors().is_empty());
    }

    #[tokio::test]
    async fn overlong_name_never_reaches_the_device() {
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());
        operator.push_prompt_reply(Some("ThisNameIsWayTooLongToFit".to_string()));

        let err = gateway(&transport, &operator)
            .change_name(Some("old"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(transport.calls().is_empty());
        assert_eq!(operator.errors().len(), 1);
    }

    #[tokio::test]
    async fn sixteen_char_name_is_accepted() {
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());
        operator.push_prompt_reply(Some("ExactlySixteen..".to_string()));

        gateway(&transport, &operator)
            .change_name(None)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "set_name");
        assert_eq!(calls[0].1, json!({ "name": "ExactlySixteen.." }));
    }

    #[tokio::test]
    async fn invocation_failure_is_reported_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.enqueue("blink", Err(RpcError::Disconnected));
        let operator = Arc::new(RecordingOperator::new());

        let err = gateway(&transport, &operator).blink().await.unwrap_err();

        assert!(matches!(err, GatewayError::Rpc(RpcError::Disconnected)));
        assert_eq!(transport.count("blink"), 1);
        assert_eq!(operator.errors().len(), 1);
    }

    #[tokio::test]
    async fn commit_to_eeprom_is_single_shot() {
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());

        gateway(&transport, &operator).commit_to_eeprom().await.unwrap();

        assert_eq!(transport.count("commit_to_eeprom"), 1);
    }

    #[tokio::test]
    async fn declined_field_upgrade_never_runs_the_action() {
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());
        operator.set_confirm_reply(false);

        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_inner = ran.clone();
        let started = gateway(&transport, &operator)
            .request_field_upgrade(Box::pin(async move {
                ran_inner.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }))
            .await
            .unwrap();

        assert!(!started);
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(operator.confirms().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_field_upgrade_runs_the_action() {
        let transport = Arc::new(ScriptedTransport::new());
        let operator = Arc::new(RecordingOperator::new());
        operator.set_confirm_reply(true);

        let started = gateway(&transport, &operator)
            .request_field_upgrade(Box::pin(async { Ok(()) }))
            .await
            .unwrap();

        assert!(started);
    }
}
