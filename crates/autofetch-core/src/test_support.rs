/// Serialises tests that touch process environment variables and restores
/// every touched key when the guard drops.
pub mod env {
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    pub struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        saved: Vec<(&'static str, Option<String>)>,
    }

    pub fn guard() -> EnvGuard {
        EnvGuard {
            // a panicking test must not wedge the rest of the suite
            _lock: ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner),
            saved: Vec::new(),
        }
    }

    impl EnvGuard {
        fn save(&mut self, key: &'static str) {
            if !self.saved.iter().any(|(k, _)| *k == key) {
                self.saved.push((key, std::env::var(key).ok()));
            }
        }

        pub fn set(&mut self, key: &'static str, value: &str) {
            self.save(key);
            std::env::set_var(key, value);
        }

        pub fn remove(&mut self, key: &'static str) {
            self.save(key);
            std::env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, previous) in self.saved.drain(..).rev() {
                match previous {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
