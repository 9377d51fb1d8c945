// buslink — control surface for addressable CAN peripherals.
//
// Configures device identity (id, name), triggers diagnostics (blink,
// commit-to-EEPROM) and runs in-field firmware upgrades. The hosting
// application plugs in through three seams: `DeviceTransport` (the bus
// call/response primitive), `Operator` (dialogs and error toasts) and the
// `DeviceHandler`s the dispatcher mounts per device.

#[macro_use]
mod logging;

pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod gateway;
pub mod manager;
pub mod rpc;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ControlConfig;
pub use descriptor::{update_advisory, DeviceDescriptor, DeviceType, ReleaseInfo};
pub use dispatch::{dispatch, DeviceHandler, MountContext, Panel};
pub use gateway::{ConfigGateway, GatewayError, Operator};
pub use logging::{init_file_logging, stop_file_logging};
pub use manager::{DeviceId, DeviceManager};
pub use rpc::{invoke, DeviceTransport, Operation, RpcError};
pub use upgrade::{UpgradeDisplay, UpgradeSession, UploadError};
