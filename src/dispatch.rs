// src/dispatch.rs
//
// Device dispatcher: exact string lookup of the reported class name in a
// registration table built once at startup. Bootloader-flagged devices
// mount the upgrade handler before any class lookup. A miss mounts a
// diagnostic fallback carrying the raw tokens; this path never panics.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;

use crate::config::ControlConfig;
use crate::descriptor::DeviceDescriptor;
use crate::gateway::{ConfigGateway, Operator};
use crate::rpc::DeviceTransport;
use crate::upgrade::UpgradeSession;

/// Everything a handler needs at mount time.
#[derive(Clone)]
pub struct MountContext {
    pub transport: Arc<dyn DeviceTransport>,
    pub operator: Arc<dyn Operator>,
    pub config: ControlConfig,
}

/// The operating surface a mounted handler exposes. Rendering is the
/// host's concern; this is the closed set of panel shapes it can be asked
/// to draw.
pub enum Panel<'a> {
    Config(&'a ConfigGateway),
    Upgrade(&'a UpgradeSession),
    /// Unrecognized class: raw token kept for operator/developer inspection.
    Diagnostic { reported_class: &'a str },
}

/// A mounted per-device operating unit.
pub trait DeviceHandler: Send + Sync {
    /// Registered class that owns this device ("Diagnostic" for the
    /// fallback, "FirmwareUpgrade" for bootloader-mode devices).
    fn device_class(&self) -> &'static str;
    fn descriptor(&self) -> &DeviceDescriptor;
    fn panel(&self) -> Panel<'_>;

    /// Heading shown alongside the panel. Derived purely from the type tag.
    fn heading(&self) -> String {
        self.descriptor().heading()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for a recognized device in normal mode: a config panel driving
/// the mutation gateway.
pub struct ConfigHandler {
    class: &'static str,
    descriptor: DeviceDescriptor,
    gateway: ConfigGateway,
}

impl ConfigHandler {
    pub fn gateway(&self) -> &ConfigGateway {
        &self.gateway
    }
}

impl DeviceHandler for ConfigHandler {
    fn device_class(&self) -> &'static str {
        self.class
    }
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
    fn panel(&self) -> Panel<'_> {
        Panel::Config(&self.gateway)
    }
}

/// Handler for a device in bootloader mode: only upgrade operations are
/// meaningful, whatever the nominal type says.
pub struct UpgradeHandler {
    descriptor: DeviceDescriptor,
    session: UpgradeSession,
}

impl UpgradeHandler {
    pub fn session(&self) -> &UpgradeSession {
        &self.session
    }
}

impl DeviceHandler for UpgradeHandler {
    fn device_class(&self) -> &'static str {
        "FirmwareUpgrade"
    }
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
    fn panel(&self) -> Panel<'_> {
        Panel::Upgrade(&self.session)
    }
}

/// Fallback for class names the crate does not know. Expected for forward
/// compatibility with newer devices.
pub struct DiagnosticHandler {
    reported_class: String,
    descriptor: DeviceDescriptor,
}

impl DiagnosticHandler {
    pub fn reported_class(&self) -> &str {
        &self.reported_class
    }
}

impl DeviceHandler for DiagnosticHandler {
    fn device_class(&self) -> &'static str {
        "Diagnostic"
    }
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
    fn panel(&self) -> Panel<'_> {
        Panel::Diagnostic {
            reported_class: &self.reported_class,
        }
    }
}

// ============================================================================
// Registration table
// ============================================================================

type HandlerFactory =
    fn(&'static str, DeviceDescriptor, MountContext) -> BoxFuture<'static, Box<dyn DeviceHandler>>;

fn config_handler(
    class: &'static str,
    descriptor: DeviceDescriptor,
    ctx: MountContext,
) -> BoxFuture<'static, Box<dyn DeviceHandler>> {
    Box::pin(async move {
        let gateway = ConfigGateway::new(ctx.transport, ctx.operator);
        Box::new(ConfigHandler {
            class,
            descriptor,
            gateway,
        }) as Box<dyn DeviceHandler>
    })
}

/// Built once at startup; exact match only, no fuzzy or prefix lookup.
static HANDLERS: Lazy<HashMap<&'static str, HandlerFactory>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, HandlerFactory> = HashMap::new();
    table.insert("LaserCAN", config_handler);
    table.insert("FlexiCAN", config_handler);
    table.insert("MitoCANdria", config_handler);
    table
});

/// Class names with a registered handler.
pub fn registered_classes() -> Vec<&'static str> {
    let mut classes: Vec<_> = HANDLERS.keys().copied().collect();
    classes.sort_unstable();
    classes
}

/// Mount the handler that owns `class_name` for this descriptor.
pub async fn dispatch(
    class_name: &str,
    descriptor: DeviceDescriptor,
    ctx: &MountContext,
) -> Box<dyn DeviceHandler> {
    if descriptor.in_bootloader {
        let session = UpgradeSession::start(ctx.transport.clone(), &ctx.config).await;
        return Box::new(UpgradeHandler { descriptor, session });
    }

    match HANDLERS.get_key_value(class_name) {
        Some((&class, factory)) => factory(class, descriptor, ctx.clone()).await,
        None => {
            tlog!(
                "[dispatch] no handler for class {:?} (type tag {:?})",
                class_name,
                descriptor.device_type
            );
            Box::new(DiagnosticHandler {
                reported_class: class_name.to_string(),
                descriptor,
            })
        }
    }
}
