use std::path::PathBuf;

/// Default locations and binary names per platform, checked in order
const APP_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome-stable",
    "google-chrome-beta",
    "google-chrome-dev",
    "google-chrome",
    "chrome",
    "chrome-browser",
    "msedge",
    "microsoft-edge",
    "microsoft-edge-stable",
];

#[cfg(target_os = "macos")]
const MACOS_APP_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

/// Detect a usable chromium-family executable.
///
/// Looks for well-known binary names on the `PATH`, then at the platform's
/// conventional install locations.
pub fn default_executable() -> Result<PathBuf, String> {
    for name in APP_NAMES {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "macos")]
    {
        for path in MACOS_APP_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        for path in [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/snap/bin/chromium",
        ] {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(path) = windows_registry_lookup() {
            return Ok(path);
        }
        for path in [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ] {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err("Could not auto detect a chrome executable".to_string())
}

#[cfg(windows)]
fn windows_registry_lookup() -> Option<PathBuf> {
    use winreg::enums::HKEY_LOCAL_MACHINE;
    use winreg::RegKey;

    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    let key = hklm
        .open_subkey(r"SOFTWARE\Microsoft\Windows\CurrentVersion\App Paths\chrome.exe")
        .ok()?;
    let path: String = key.get_value("").ok()?;
    let path = PathBuf::from(path);
    path.exists().then_some(path)
}
