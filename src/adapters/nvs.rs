//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the fan controller.
//!
//! - Config validation: every field is range-checked before persistence.
//! - Namespace isolation: board config and debounced settings use their
//!   own namespaces.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//!
//! The simulation backend keeps everything in a `HashMap` so the domain
//! can be exercised on the host.

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::BoardConfig;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "fanctl_board";
const CONFIG_KEY: &str = "board_cfg";

/// Largest board config blob accepted from flash.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 512;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other
            // thread touches NVS.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32 || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32 {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK as i32 {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name (15 bytes max).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, run `f` with the handle, then close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    fn load_blob(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let mut buf = vec![0u8; MAX_BLOB_SIZE];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                buf.truncate(len);
                Ok(Some(buf))
            }
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn validate_config(cfg: &BoardConfig) -> Result<(), ConfigError> {
    cfg.validate().map_err(ConfigError::ValidationFailed)
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<BoardConfig, ConfigError> {
        match self.load_blob() {
            Ok(Some(bytes)) => {
                let cfg: BoardConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                validate_config(&cfg)?;
                info!("NvsAdapter: loaded board config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Ok(None) => {
                info!("NvsAdapter: no stored board config, using defaults");
                Ok(BoardConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: read error ({}), using defaults", e);
                Ok(BoardConfig::default())
            }
        }
    }

    fn save(&self, config: &BoardConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: board config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(CONFIG_KEY);
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: board config saved ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND as i32 => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
                if ret != ESP_OK as i32 && ret != ESP_ERR_NVS_NOT_FOUND as i32 {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let ret = unsafe {
                    nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK as i32)
            });
            result.unwrap_or(false)
        }
    }
}
