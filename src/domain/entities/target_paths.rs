//! Registry target path table
//!
//! Where to look for each hive inside the mounted filesystem, and which key
//! paths are worth extracting once a hive is open.

use serde::{Deserialize, Serialize};

/// Hive type used for all per-user hives
pub const NTUSER: &str = "NTUSER";

/// Location candidates and interesting keys for one system hive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiveTargets {
    /// Hive type, e.g. `SYSTEM`
    pub name: String,
    /// Candidate paths relative to the filesystem root, tried in order
    pub base_paths: Vec<String>,
    /// Key paths traversal starts at; empty means start at the root
    #[serde(default)]
    pub key_paths: Vec<String>,
}

/// Location candidates and interesting keys for per-user hives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHiveTargets {
    /// Directories whose children are user profiles
    pub profile_dirs: Vec<String>,
    /// Hive file names tried inside each profile, in order
    pub file_names: Vec<String>,
    #[serde(default)]
    pub key_paths: Vec<String>,
}

/// All registry targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPathTable {
    pub hives: Vec<HiveTargets>,
    pub user_hives: UserHiveTargets,
}

impl TargetPathTable {
    /// Interesting key paths for a hive type
    pub fn key_paths_for(&self, hive_type: &str) -> &[String] {
        if hive_type.eq_ignore_ascii_case(NTUSER) {
            return &self.user_hives.key_paths;
        }
        self.hives
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(hive_type))
            .map(|h| h.key_paths.as_slice())
            .unwrap_or(&[])
    }
}

fn config_paths(file: &str) -> Vec<String> {
    vec![
        format!("Windows/System32/config/{file}"),
        format!("WINDOWS/system32/config/{}", file.to_lowercase()),
        format!("windows/system32/config/{}", file.to_lowercase()),
    ]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for TargetPathTable {
    fn default() -> Self {
        Self {
            hives: vec![
                HiveTargets {
                    name: "SYSTEM".into(),
                    base_paths: config_paths("SYSTEM"),
                    key_paths: strings(&[
                        r"ControlSet001\Services",
                        r"ControlSet001\Control\Session Manager\Memory Management",
                        r"ControlSet001\Control\ComputerName",
                        r"ControlSet001\Control\TimeZoneInformation",
                        "Select",
                    ]),
                },
                HiveTargets {
                    name: "SOFTWARE".into(),
                    base_paths: config_paths("SOFTWARE"),
                    key_paths: strings(&[
                        r"Microsoft\Windows\CurrentVersion\Run",
                        r"Microsoft\Windows\CurrentVersion\RunOnce",
                        r"Microsoft\Windows NT\CurrentVersion",
                        r"Microsoft\Windows\CurrentVersion\Uninstall",
                        r"Microsoft\Windows\CurrentVersion\Internet Settings",
                        r"Policies\Microsoft\Windows\System",
                        r"Microsoft\Windows Defender",
                    ]),
                },
                HiveTargets {
                    name: "SAM".into(),
                    base_paths: config_paths("SAM"),
                    key_paths: Vec::new(),
                },
                HiveTargets {
                    name: "SECURITY".into(),
                    base_paths: config_paths("SECURITY"),
                    key_paths: Vec::new(),
                },
            ],
            user_hives: UserHiveTargets {
                profile_dirs: strings(&["Users", "Documents and Settings"]),
                file_names: strings(&["NTUSER.DAT", "ntuser.dat"]),
                key_paths: strings(&[
                    r"Software\Microsoft\Windows\CurrentVersion\Explorer\RunMRU",
                    r"Software\Microsoft\Windows\CurrentVersion\Run",
                    r"Software\Microsoft\Windows\CurrentVersion\Explorer\ComDlg32\OpenSavePidlMRU",
                    r"Software\Microsoft\Windows\CurrentVersion\Explorer\RecentDocs",
                ]),
            },
        }
    }
}
