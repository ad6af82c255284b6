//! Environment and search-path adjustments.

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::HarnessError;
use crate::Result;

/// Directories searched before anything else during the post-command sync.
pub const SYNC_PATH_PREFIX: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Serializes every change this crate makes to the process environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scoped change to the process environment.
///
/// Holds the environment lock for its whole lifetime and puts back every
/// variable it touched when dropped, including during unwinding.
pub struct EnvGuard {
    saved: Vec<(String, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Take the environment lock.
    pub fn acquire() -> Self {
        Self {
            saved: Vec::new(),
            _lock: lock_env(),
        }
    }

    /// Set `key` until the guard is dropped.
    pub fn set(&mut self, key: &str, value: impl AsRef<std::ffi::OsStr>) {
        if !self.saved.iter().any(|(k, _)| k == key) {
            self.saved.push((key.to_string(), env::var_os(key)));
        }
        env::set_var(key, value);
    }

    /// Put `prefix` in front of `PATH` until the guard is dropped.
    pub fn prepend_path(&mut self, prefix: &str) {
        let path = match env::var_os("PATH") {
            Some(current) if !current.is_empty() => {
                let mut path = OsString::from(prefix);
                path.push(":");
                path.push(current);
                path
            }
            _ => OsString::from(prefix),
        };
        self.set("PATH", path);
    }

    /// Set `key` for good; it is not restored on drop.
    pub fn persist(&mut self, key: &str, value: &str) {
        if key.is_empty() || key.contains(['=', '\0']) || value.contains('\0') {
            return;
        }
        self.saved.retain(|(k, _)| k != key);
        env::set_var(key, value);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(value) => env::set_var(&key, value),
                None => env::remove_var(&key),
            }
        }
    }
}

/// Tool directories of a native sysroot, in search order.
pub fn sysroot_dirs(sysroot: &Path, target_sys: Option<&str>) -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(5);
    if let Some(target) = target_sys {
        dirs.push(sysroot.join("usr").join("bin").join(target));
    }
    dirs.extend([
        sysroot.join("bin"),
        sysroot.join("sbin"),
        sysroot.join("usr").join("bin"),
        sysroot.join("usr").join("sbin"),
    ]);
    dirs
}

/// Copy of `base` (or of the process environment) with the sysroot's tool
/// directories in front of `PATH`. Neither source is modified.
pub fn with_native_sysroot(
    base: Option<&HashMap<String, String>>,
    sysroot: &Path,
    target_sys: Option<&str>,
) -> Result<HashMap<String, String>> {
    let mut vars = match base {
        Some(base) => base.clone(),
        None => env::vars_os()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
            .collect(),
    };

    let inherited = vars.get("PATH").cloned().unwrap_or_default();
    let mut paths = sysroot_dirs(sysroot, target_sys);
    if !inherited.is_empty() {
        paths.extend(env::split_paths(&inherited));
    }

    let joined = env::join_paths(paths).map_err(|e| HarnessError::InvalidPath(e.to_string()))?;
    vars.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
    Ok(vars)
}

/// Parse the NUL-separated output of `env -0`.
pub fn parse_env_nul(dump: &str) -> Vec<(String, String)> {
    dump.split('\0')
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, value) = entry.split_once('=').unwrap_or((entry, ""));
            (key.to_string(), value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysroot_dirs_order() {
        let dirs = sysroot_dirs(Path::new("/opt/x"), Some("arm-linux"));
        let dirs: Vec<_> = dirs.iter().map(|d| d.to_str().unwrap()).collect();
        assert_eq!(
            dirs,
            vec![
                "/opt/x/usr/bin/arm-linux",
                "/opt/x/bin",
                "/opt/x/sbin",
                "/opt/x/usr/bin",
                "/opt/x/usr/sbin",
            ]
        );
    }

    #[test]
    fn test_with_native_sysroot_copies_base() {
        let base: HashMap<String, String> =
            [("PATH".to_string(), "/usr/bin:/bin".to_string())].into();
        let vars = with_native_sysroot(Some(&base), Path::new("/opt/x"), None).unwrap();

        assert_eq!(
            vars["PATH"],
            "/opt/x/bin:/opt/x/sbin:/opt/x/usr/bin:/opt/x/usr/sbin:/usr/bin:/bin"
        );
        assert_eq!(base["PATH"], "/usr/bin:/bin");
    }

    #[test]
    fn test_with_native_sysroot_without_path() {
        let base = HashMap::new();
        let vars = with_native_sysroot(Some(&base), Path::new("/s"), Some("t")).unwrap();
        assert!(vars["PATH"].starts_with("/s/usr/bin/t:/s/bin"));
        assert!(vars["PATH"].ends_with("/s/usr/sbin"));
    }

    #[test]
    fn test_env_guard_restores() {
        let key = "CMD_HARNESS_GUARD_TEST";
        env::remove_var(key);
        {
            let mut guard = EnvGuard::acquire();
            guard.set(key, "one");
            guard.set(key, "two");
            assert_eq!(env::var(key).unwrap(), "two");
        }
        assert!(env::var_os(key).is_none());
    }

    #[test]
    fn test_env_guard_restores_on_panic() {
        let key = "CMD_HARNESS_PANIC_TEST";
        env::set_var(key, "before");
        let result = std::panic::catch_unwind(|| {
            let mut guard = EnvGuard::acquire();
            guard.set(key, "during");
            panic!("unwind");
        });
        assert!(result.is_err());
        assert_eq!(env::var(key).unwrap(), "before");
    }

    #[test]
    fn test_persist_survives_drop() {
        let key = "CMD_HARNESS_PERSIST_TEST";
        {
            let mut guard = EnvGuard::acquire();
            guard.set(key, "temporary");
            guard.persist(key, "kept");
            guard.persist("BAD=KEY", "ignored");
        }
        assert_eq!(env::var(key).unwrap(), "kept");
    }

    #[test]
    fn test_parse_env_nul() {
        let vars = parse_env_nul("A=1\0B=x=y\0EMPTY=\0");
        assert_eq!(
            vars,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "x=y".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }
}
