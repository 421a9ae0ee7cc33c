//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements       | Connects to                   |
//! |-------------|------------------|-------------------------------|
//! | `display`   | DisplayPort      | Retained text cells           |
//! | `gatt`      | UpdateTransport  | Bluedroid GATT server         |
//! | `hardware`  | ActuatorPort     | ESP32 LEDC, tach ISR/timer    |
//! |             | ChargerPort      | ESP32 DAC, ADC2               |
//! |             | PlatformPort     | heap statistics               |
//! | `log_sink`  | EventSink        | Serial log output             |
//! | `nvs`       | ConfigPort       | NVS / in-memory store         |
//! |             | StoragePort      |                               |
//! | `ota_slot`  | FirmwareStore    | esp-ota / in-memory image     |
//! | `time`      | DelayNs          | FreeRTOS delay, esp_timer     |

pub mod display;
pub mod gatt;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod ota_slot;
pub mod time;
