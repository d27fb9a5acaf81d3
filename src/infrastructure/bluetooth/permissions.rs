//! Runtime permission gate
//!
//! Scanning needs explicit grants on Android-style platforms: scan, connect
//! and fine location from API level 31, fine location alone below it. Other
//! platforms handle Bluetooth access at the OS level and always pass.

use crate::domain::settings::PermissionPlatform;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// First API level with the split scan/connect Bluetooth permissions
pub const SPLIT_PERMISSIONS_API_LEVEL: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    BluetoothScan,
    BluetoothConnect,
    FineLocation,
}

/// Title and message shown in the platform dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rationale {
    pub title: &'static str,
    pub message: &'static str,
}

impl Permission {
    pub fn rationale(&self) -> Rationale {
        match self {
            Self::BluetoothScan => Rationale {
                title: "Bluetooth Scan Permission",
                message: "App needs access to Bluetooth scan",
            },
            Self::BluetoothConnect => Rationale {
                title: "Bluetooth Connect Permission",
                message: "App needs access to Bluetooth connect",
            },
            Self::FineLocation => Rationale {
                title: "Bluetooth Fine Location Permission",
                message: "App needs access to Bluetooth fine location",
            },
        }
    }
}

/// Rationale for the single location prompt on pre-31 API levels
pub const LEGACY_LOCATION_RATIONALE: Rationale = Rationale {
    title: "Location Permission",
    message: "Bluetooth Low Energy requires Location",
};

/// The platform's permission dialog.
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    /// Returns true if the user granted the permission.
    async fn request(&self, permission: Permission, rationale: Rationale) -> bool;
}

/// Grants everything without asking. Used on desktop hosts.
pub struct AutoGrant;

#[async_trait]
impl PermissionPrompter for AutoGrant {
    async fn request(&self, _permission: Permission, _rationale: Rationale) -> bool {
        true
    }
}

pub struct PermissionGate {
    platform: PermissionPlatform,
    prompter: Arc<dyn PermissionPrompter>,
}

impl PermissionGate {
    pub fn new(platform: PermissionPlatform, prompter: Arc<dyn PermissionPrompter>) -> Self {
        Self { platform, prompter }
    }

    /// Never fails; a refusal is reported as `false`.
    pub async fn request_permissions(&self) -> bool {
        let granted = match self.platform {
            PermissionPlatform::Desktop => true,
            PermissionPlatform::Android { api_level } if api_level < SPLIT_PERMISSIONS_API_LEVEL => {
                self.prompter
                    .request(Permission::FineLocation, LEGACY_LOCATION_RATIONALE)
                    .await
            }
            PermissionPlatform::Android { .. } => {
                // Every prompt is shown even after a refusal
                let mut all = true;
                for permission in [
                    Permission::BluetoothScan,
                    Permission::BluetoothConnect,
                    Permission::FineLocation,
                ] {
                    let ok = self.prompter.request(permission, permission.rationale()).await;
                    if !ok {
                        warn!("Permission refused: {:?}", permission);
                    }
                    all &= ok;
                }
                all
            }
        };

        info!("Bluetooth permissions granted: {}", granted);
        granted
    }
}
