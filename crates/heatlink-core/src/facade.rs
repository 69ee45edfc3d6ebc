// ── Per-family control facades ──
//
// Typed convenience handles over `Controller::apply`. Each handle is
// bound to one device and translates domain-level setters into the
// generic (field, value) dispatch -- all dedup/retry/debounce policy
// stays in one place.

use serde_json::json;
use uuid::Uuid;

use heatlink_api::DeviceFamily;
use heatlink_api::ata::{AtaMode, FanSpeed, VaneHorizontal, VaneVertical};
use heatlink_api::atw::{AtwOperationMode, Zone};

use crate::controller::Controller;
use crate::error::CoreError;

impl Controller {
    /// A typed handle for an air-to-air device.
    pub fn ata(&self, device_id: Uuid) -> Result<AtaHandle, CoreError> {
        self.expect_family(device_id, DeviceFamily::AirToAir)?;
        Ok(AtaHandle {
            controller: self.clone(),
            device_id,
        })
    }

    /// A typed handle for an air-to-water device.
    pub fn atw(&self, device_id: Uuid) -> Result<AtwHandle, CoreError> {
        self.expect_family(device_id, DeviceFamily::AirToWater)?;
        Ok(AtwHandle {
            controller: self.clone(),
            device_id,
        })
    }

    fn expect_family(&self, device_id: Uuid, expected: DeviceFamily) -> Result<(), CoreError> {
        let device = self
            .device(&device_id)
            .ok_or(CoreError::DeviceNotFound { device_id })?;
        if device.family != expected {
            return Err(CoreError::WrongFamily {
                device_id,
                expected,
            });
        }
        Ok(())
    }
}

/// Control facade for one air-to-air unit.
#[derive(Clone)]
pub struct AtaHandle {
    controller: Controller,
    device_id: Uuid,
}

impl AtaHandle {
    pub fn device_id(&self) -> Uuid {
        self.device_id
    }

    pub async fn set_power(&self, on: bool) -> Result<(), CoreError> {
        self.controller.apply(self.device_id, "power", json!(on)).await
    }

    pub async fn set_mode(&self, mode: AtaMode) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, "mode", json!(mode.wire_value()))
            .await
    }

    pub async fn set_target_temperature(&self, celsius: f64) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, "target_temperature", json!(celsius))
            .await
    }

    pub async fn set_fan_speed(&self, speed: FanSpeed) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, "fan_speed", json!(speed.wire_value()))
            .await
    }

    pub async fn set_vane_horizontal(&self, position: VaneHorizontal) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, "vane_horizontal", json!(position.wire_value()))
            .await
    }

    pub async fn set_vane_vertical(&self, position: VaneVertical) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, "vane_vertical", json!(position.wire_value()))
            .await
    }
}

/// Control facade for one air-to-water unit.
#[derive(Clone)]
pub struct AtwHandle {
    controller: Controller,
    device_id: Uuid,
}

impl AtwHandle {
    pub fn device_id(&self) -> Uuid {
        self.device_id
    }

    pub async fn set_power(&self, on: bool) -> Result<(), CoreError> {
        self.controller.apply(self.device_id, "power", json!(on)).await
    }

    pub async fn set_operation_mode(&self, mode: AtwOperationMode) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, "operation_mode", json!(mode.wire_value()))
            .await
    }

    pub async fn set_zone_target(&self, zone: Zone, celsius: f64) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, zone.target_field(), json!(celsius))
            .await
    }

    pub async fn set_tank_target(&self, celsius: f64) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, "tank_target_temperature", json!(celsius))
            .await
    }

    pub async fn set_forced_hot_water(&self, on: bool) -> Result<(), CoreError> {
        self.controller
            .apply(self.device_id, "forced_hot_water", json!(on))
            .await
    }
}
