//! End-to-end test with a host built from the real timer thread and a
//! settings file, so deferred swap steps run on their own thread.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use loader_manifest::archive::list_entries;
use loader_manifest::metadata::METADATA_ENTRY;
use loader_manifest::{
    Deferred, Host, HostResult, LoaderConfig, ManifestManager, Platform, Priority, SettingsFile,
    SwapTiming, TimerThread,
};
use tempfile::TempDir;

const INSTALLED_PACKAGES: &str = "installed_packages";

struct ThreadedHost {
    timer: TimerThread,
    settings: SettingsFile,
    toggles: Mutex<Vec<String>>,
}

impl ThreadedHost {
    fn new(settings_path: &Path) -> Self {
        Self {
            timer: TimerThread::spawn().unwrap(),
            settings: SettingsFile::new(settings_path),
            toggles: Mutex::new(Vec::new()),
        }
    }
}

impl Host for ThreadedHost {
    fn platform(&self) -> Platform {
        Platform::current()
    }

    fn disable_package(&self, package: &str, _reason: &str) {
        self.toggles.lock().unwrap().push(format!("disable {}", package));
    }

    fn reenable_package(&self, package: &str, _reason: &str) {
        self.toggles.lock().unwrap().push(format!("enable {}", package));
    }

    fn set_timeout(&self, delay: Duration, callback: Deferred) {
        self.timer.set_timeout(delay, callback).unwrap();
    }

    fn load_installed_packages(&self) -> HostResult<Vec<String>> {
        self.settings.load_list(INSTALLED_PACKAGES)
    }

    fn save_installed_packages(&self, packages: &[String]) -> HostResult<()> {
        let original = self.settings.load_list(INSTALLED_PACKAGES)?;
        self.settings.save_list(INSTALLED_PACKAGES, packages, &original)?;
        Ok(())
    }
}

fn wait_until_idle(manager: &ManifestManager) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.is_swapping() {
        assert!(Instant::now() < deadline, "swap did not finish");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_swap_on_timer_thread() {
    let dir = TempDir::new().unwrap();
    let settings_path = dir.path().join("Package Control.sublime-settings");
    fs::write(
        &settings_path,
        r#"{"installed_packages": ["Package Control", "0-package_control_loader", "ssl-windows"], "debug": true}"#,
    )
    .unwrap();

    let config = LoaderConfig::new(dir.path().join("Installed Packages"), dir.path().join("Packages"))
        .with_swap_timing(SwapTiming {
            swap_delay_ms: 20,
            reenable_delay_ms: 5,
        });
    fs::create_dir_all(config.legacy_directory_path()).unwrap();

    let host = Arc::new(ThreadedHost::new(&settings_path));
    let dyn_host: Arc<dyn Host> = host.clone();
    let manager = ManifestManager::new(config, dyn_host).unwrap();

    manager.add(Priority::FIRST, "foo", None).unwrap();
    manager.add(Priority::new(10).unwrap(), "bar", None).unwrap();

    // First creation cleaned up the legacy loader
    assert!(!manager.config().legacy_directory_path().exists());
    let settings: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&settings_path).unwrap()).unwrap();
    assert_eq!(settings["installed_packages"], serde_json::json!(["Package Control"]));
    assert_eq!(settings["debug"], true);

    manager.remove("foo").unwrap();
    assert!(!manager.exists("foo").unwrap());
    wait_until_idle(&manager);

    assert_eq!(
        list_entries(&manager.config().archive_path()).unwrap(),
        vec![METADATA_ENTRY, "10-bar.py"]
    );
    assert_eq!(
        *host.toggles.lock().unwrap(),
        vec![
            "disable 0_package_control_loader".to_string(),
            "enable 0_package_control_loader".to_string(),
        ]
    );
}
