use uuid::Uuid;

/**
 * The UUID of the Bluetooth BLE service exposed by the ESP32 firmware.
 */
pub const ESP32_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/**
 * The UUID of the characteristic that accepts text commands (write without response).
 */
pub const ESP32_COMMAND_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/**
 * The UUID of the characteristic that notifies status text.
 */
pub const ESP32_STATUS_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/**
 * Name shown for peripherals that do not advertise one.
 */
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

/**
 * Status text shown before the first notification (or when the last one was empty).
 */
pub const STATUS_PLACEHOLDER: &str = "—";

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * Signal strength reported for advertisements that carry none. Weaker than anything real.
 */
pub const RSSI_UNAVAILABLE: i16 = -127;

/**
 * Capacity of the command and event channels feeding the controller task.
 */
pub const COMMAND_CHANNEL_SIZE: usize = 32;
pub const EVENT_CHANNEL_SIZE: usize = 128;

pub fn make_esp32_service_uuid() -> Uuid {
    ESP32_SERVICE_UUID
}

pub fn make_esp32_command_uuid() -> Uuid {
    ESP32_COMMAND_UUID
}

pub fn make_esp32_status_uuid() -> Uuid {
    ESP32_STATUS_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuids_match_the_firmware() {
        assert_eq!(make_esp32_service_uuid().to_string(), "6e400001-b5a3-f393-e0a9-e50e24dcca9e");
        assert_eq!(make_esp32_command_uuid().to_string(), "6e400002-b5a3-f393-e0a9-e50e24dcca9e");
        assert_eq!(make_esp32_status_uuid().to_string(), "6e400003-b5a3-f393-e0a9-e50e24dcca9e");
    }
}
