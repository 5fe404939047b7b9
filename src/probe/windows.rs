// Windows camera detection: the CapabilityAccessManager consent store
// records per-app camera usage. An app that currently holds the camera
// has LastUsedTimeStop == 0 under its webcam consent key.

use anyhow::{Result, bail};
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_NO_MORE_ITEMS, ERROR_SUCCESS};
use windows::Win32::System::Registry::{
    HKEY, HKEY_CURRENT_USER, KEY_READ, REG_VALUE_TYPE, RegCloseKey, RegEnumKeyExW, RegOpenKeyExW,
    RegQueryValueExW,
};
use windows::core::{PCWSTR, PWSTR};

const CONSENT_STORE_WEBCAM: &str =
    r"Software\Microsoft\Windows\CurrentVersion\CapabilityAccessManager\ConsentStore\webcam";
const STOP_VALUE: &str = "LastUsedTimeStop";

pub(super) async fn camera_in_use() -> Result<bool> {
    let store = RegKey::open(HKEY_CURRENT_USER, CONSENT_STORE_WEBCAM)?;

    for app in store.subkeys()? {
        let Ok(key) = store.child(&app) else { continue };
        if app == "NonPackaged" {
            // Win32 apps live one level deeper, keyed by executable path.
            for entry in key.subkeys()? {
                let Ok(nested) = key.child(&entry) else { continue };
                if nested.qword(STOP_VALUE)? == Some(0) {
                    return Ok(true);
                }
            }
        } else if key.qword(STOP_VALUE)? == Some(0) {
            return Ok(true);
        }
    }

    Ok(false)
}

struct RegKey(HKEY);

impl RegKey {
    fn open(parent: HKEY, path: &str) -> Result<RegKey> {
        let wide = to_wide(path);
        let mut key = HKEY::default();
        let status =
            unsafe { RegOpenKeyExW(parent, PCWSTR(wide.as_ptr()), 0, KEY_READ, &mut key) };
        if status != ERROR_SUCCESS {
            bail!("opening registry key {path}: error {}", status.0);
        }
        Ok(RegKey(key))
    }

    fn child(&self, name: &str) -> Result<RegKey> {
        RegKey::open(self.0, name)
    }

    fn subkeys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut index = 0u32;
        loop {
            let mut buf = [0u16; 512];
            let mut len = buf.len() as u32;
            let status = unsafe {
                RegEnumKeyExW(
                    self.0,
                    index,
                    PWSTR(buf.as_mut_ptr()),
                    &mut len,
                    None,
                    PWSTR::null(),
                    None,
                    None,
                )
            };
            if status == ERROR_NO_MORE_ITEMS {
                break;
            }
            if status != ERROR_SUCCESS {
                bail!("enumerating registry subkeys: error {}", status.0);
            }
            names.push(String::from_utf16_lossy(&buf[..len as usize]));
            index += 1;
        }
        Ok(names)
    }

    /// Reads a QWORD value, or `None` when the value does not exist.
    fn qword(&self, name: &str) -> Result<Option<u64>> {
        let wide = to_wide(name);
        let mut data = [0u8; 8];
        let mut len = data.len() as u32;
        let mut kind = REG_VALUE_TYPE::default();
        let status = unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(wide.as_ptr()),
                None,
                Some(&mut kind),
                Some(data.as_mut_ptr()),
                Some(&mut len),
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status != ERROR_SUCCESS {
            bail!("reading registry value {name}: error {}", status.0);
        }
        if len as usize != data.len() {
            bail!("registry value {name} is not a QWORD");
        }
        Ok(Some(u64::from_le_bytes(data)))
    }
}

impl Drop for RegKey {
    fn drop(&mut self) {
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consent_store_scan_does_not_error() {
        // The key exists on any recent Windows; either answer is fine.
        assert!(camera_in_use().await.is_ok());
    }
}
