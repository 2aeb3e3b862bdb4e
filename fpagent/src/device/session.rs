//! Scoped ownership of a device capability.

use std::sync::{Arc, Mutex, PoisonError};

use super::{DeviceCapability, Releaser};

/// The single teardown routine of a capability.
///
/// Shared between the worker's normal exit path and its termination
/// watcher. The first caller runs the release; a concurrent caller waits
/// for it to finish; later callers return immediately.
pub struct Teardown {
    release: Mutex<Option<Releaser>>,
}

impl Teardown {
    pub fn new(release: Releaser) -> Self {
        Self {
            release: Mutex::new(Some(release)),
        }
    }

    /// Release device resources if that has not happened yet.
    pub fn run(&self) {
        let mut release = self.release.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(release) = release.take() {
            release();
            tracing::debug!("device resources released");
        }
    }

    /// Returns true once the release has run.
    #[cfg(test)]
    pub fn is_done(&self) -> bool {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// A capability owned for the duration of one enrollment.
///
/// Dropping the session runs its teardown, so every exit path of the
/// worker releases the device.
pub struct CapabilitySession {
    device: Box<dyn DeviceCapability>,
    teardown: Arc<Teardown>,
}

impl CapabilitySession {
    pub fn acquire(device: Box<dyn DeviceCapability>) -> Self {
        let teardown = Arc::new(Teardown::new(device.releaser()));
        Self { device, teardown }
    }

    /// Handle to the teardown, for paths that cannot drop the session.
    pub fn teardown(&self) -> Arc<Teardown> {
        Arc::clone(&self.teardown)
    }

    pub fn device(&mut self) -> &mut dyn DeviceCapability {
        self.device.as_mut()
    }
}

impl Drop for CapabilitySession {
    fn drop(&mut self) {
        self.teardown.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting_teardown(count: &Arc<AtomicUsize>) -> Teardown {
        let count = Arc::clone(count);
        Teardown::new(Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_teardown_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let teardown = counting_teardown(&count);

        assert!(!teardown.is_done());
        teardown.run();
        teardown.run();

        assert!(teardown.is_done());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_runs_once_across_threads() {
        let count = Arc::new(AtomicUsize::new(0));
        let teardown = Arc::new(counting_teardown(&count));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let teardown = Arc::clone(&teardown);
                thread::spawn(move || teardown.run())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_drop_releases() {
        use crate::device::scripted::ScriptedDevice;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("released");
        let script = format!("pass,marker={}", marker.display()).parse().unwrap();

        let session = CapabilitySession::acquire(Box::new(ScriptedDevice::new(script)));
        let teardown = session.teardown();
        assert!(!teardown.is_done());

        drop(session);

        assert!(teardown.is_done());
        assert!(marker.exists());
    }
}
