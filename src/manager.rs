// src/manager.rs
//
// Host-side registry of live devices. Devices announce themselves
// periodically; the manager mounts a handler on first sight, refreshes the
// stored descriptor on every later announcement, and drops devices that go
// quiet. A device flipping between normal and bootloader identity is
// remounted under its new identity and removed under the old one, so it
// never lingers twice.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::descriptor::DeviceDescriptor;
use crate::dispatch::{self, DeviceHandler, MountContext};

/// Registry key. Bootloader-mode devices get a distinct identity since
/// they mount a different handler type.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, PartialEq, Eq)]
pub enum DeviceId {
    Serial(u32),
    Dfu(u32),
}

struct DeviceEntry {
    handler: Box<dyn DeviceHandler>,
    descriptor: DeviceDescriptor,
    last_seen: Instant,
}

pub struct DeviceManager {
    ctx: MountContext,
    devices: Mutex<HashMap<DeviceId, DeviceEntry>>,
}

impl DeviceManager {
    pub fn new(ctx: MountContext) -> Self {
        Self {
            ctx,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Handle an enumeration announcement. Mounts a handler for devices not
    /// seen before; refreshes descriptor and liveness for known ones.
    pub async fn on_announce(
        &self,
        class_name: &str,
        descriptor: DeviceDescriptor,
    ) -> Result<DeviceId, String> {
        let serial = descriptor
            .serial
            .ok_or_else(|| "Device announcement without a serial number".to_string())?;

        let id = match descriptor.in_bootloader {
            true => DeviceId::Dfu(serial),
            false => DeviceId::Serial(serial),
        };

        let mut devices = self.devices.lock().await;

        if let Some(entry) = devices.get_mut(&id) {
            entry.descriptor = descriptor;
            entry.last_seen = Instant::now();
            return Ok(id);
        }

        // Same physical device under the opposite identity must not linger;
        // dropping its entry tears down any upgrade session it owned.
        let opposite = match &id {
            DeviceId::Dfu(serial) => DeviceId::Serial(*serial),
            DeviceId::Serial(serial) => DeviceId::Dfu(*serial),
        };
        if devices.remove(&opposite).is_some() {
            tlog!("[manager] {:?} replaces {:?}", id, opposite);
        }

        let handler = dispatch::dispatch(class_name, descriptor.clone(), &self.ctx).await;
        tlog!(
            "[manager] mounted {} handler for {:?}",
            handler.device_class(),
            id
        );
        devices.insert(
            id.clone(),
            DeviceEntry {
                handler,
                descriptor,
                last_seen: Instant::now(),
            },
        );
        Ok(id)
    }

    /// Drop devices not seen within the liveness window, tearing down
    /// their handlers.
    pub async fn sweep(&self) {
        let window = self.ctx.config.liveness_window();
        let mut devices = self.devices.lock().await;
        devices.retain(|id, entry| {
            let live = entry.last_seen.elapsed() < window;
            if !live {
                tlog!("[manager] {:?} aged off", id);
            }
            live
        });
    }

    /// Forget every device, e.g. when the bus connection is reopened.
    pub async fn reset(&self) {
        self.devices.lock().await.clear();
    }

    /// Snapshot of (id, descriptor, handler class) for every live device.
    pub async fn devices(&self) -> Vec<(DeviceId, DeviceDescriptor, String)> {
        let devices = self.devices.lock().await;
        devices
            .iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    entry.descriptor.clone(),
                    entry.handler.device_class().to_string(),
                )
            })
            .collect()
    }

    /// Run `f` against the mounted handler for `id`, if still live.
    pub async fn with_handler<R>(
        &self,
        id: &DeviceId,
        f: impl FnOnce(&dyn DeviceHandler) -> R,
    ) -> Option<R> {
        let devices = self.devices.lock().await;
        devices.get(id).map(|entry| f(entry.handler.as_ref()))
    }
}
