//! libfprint (0.x API) binding.
//!
//! libfprint stores enrolled prints under `$HOME/.fprint`, so the target
//! path only selects the storage root through the worker's environment.

use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int, c_uchar};
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fpagent_core::RetryReason;

use super::{
    DeviceArtifact, DeviceCapability, DeviceError, DeviceHandle, DeviceProvider, Releaser,
    SaveError, StepResult,
};

#[repr(C)]
struct FpDscvDev {
    _private: [u8; 0],
}

#[repr(C)]
struct FpDev {
    _private: [u8; 0],
}

#[repr(C)]
struct FpDriver {
    _private: [u8; 0],
}

#[repr(C)]
struct FpPrintData {
    _private: [u8; 0],
}

#[repr(C)]
struct FpImg {
    _private: [u8; 0],
}

// enum fp_enroll_result
const FP_ENROLL_COMPLETE: c_int = 1;
const FP_ENROLL_FAIL: c_int = 2;
const FP_ENROLL_PASS: c_int = 3;
const FP_ENROLL_RETRY: c_int = 100;
const FP_ENROLL_RETRY_TOO_SHORT: c_int = 101;
const FP_ENROLL_RETRY_CENTER_FINGER: c_int = 102;
const FP_ENROLL_RETRY_REMOVE_FINGER: c_int = 103;

// enum fp_finger
const RIGHT_INDEX: c_int = 7;

#[link(name = "fprint")]
unsafe extern "C" {
    fn fp_init() -> c_int;
    fn fp_exit();
    fn fp_discover_devs() -> *mut *mut FpDscvDev;
    fn fp_dscv_devs_free(devs: *mut *mut FpDscvDev);
    fn fp_dscv_dev_get_driver(dev: *mut FpDscvDev) -> *mut FpDriver;
    fn fp_driver_get_full_name(drv: *mut FpDriver) -> *const c_char;
    fn fp_dev_open(dev: *mut FpDscvDev) -> *mut FpDev;
    fn fp_dev_close(dev: *mut FpDev);
    fn fp_enroll_finger_img(
        dev: *mut FpDev,
        print_data: *mut *mut FpPrintData,
        img: *mut *mut FpImg,
    ) -> c_int;
    fn fp_print_data_get_data(data: *mut FpPrintData, ret: *mut *mut c_uchar) -> usize;
    fn fp_print_data_save(data: *mut FpPrintData, finger: c_int) -> c_int;
    fn fp_print_data_free(data: *mut FpPrintData);
}

/// Everything acquired from libfprint, released in reverse order.
struct Handles {
    initialized: bool,
    discovered: *mut *mut FpDscvDev,
    discovered_count: usize,
    dev: *mut FpDev,
    print: *mut FpPrintData,
    /// An enroll step is blocked inside libfprint with `dev`.
    stepping: bool,
}

/// Which handles a release may free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReleasePlan {
    free_print: bool,
    free_discovered: bool,
    close_dev: bool,
    exit_library: bool,
}

// SAFETY: the raw handles are only touched under the owning mutex. The
// release path may run on the termination watcher thread; libfprint 0.x
// calls used here have no thread affinity.
unsafe impl Send for Handles {}

impl Handles {
    fn new() -> Self {
        Self {
            initialized: false,
            discovered: ptr::null_mut(),
            discovered_count: 0,
            dev: ptr::null_mut(),
            print: ptr::null_mut(),
            stepping: false,
        }
    }

    /// The device and the library stay up while a step is using them; the
    /// worker exits right after a release that interrupts a step.
    fn release_plan(&self) -> ReleasePlan {
        ReleasePlan {
            free_print: !self.print.is_null(),
            free_discovered: !self.discovered.is_null(),
            close_dev: !self.stepping && !self.dev.is_null(),
            exit_library: !self.stepping && self.initialized,
        }
    }

    fn release(&mut self) {
        let plan = self.release_plan();
        if self.stepping {
            tracing::debug!("enroll step in progress, leaving device open");
        }

        // SAFETY: every pointer is either null or was returned by libfprint
        // and not freed yet; each is nulled after being freed.
        unsafe {
            if plan.free_print {
                fp_print_data_free(self.print);
                self.print = ptr::null_mut();
            }
            if plan.free_discovered {
                fp_dscv_devs_free(self.discovered);
                self.discovered = ptr::null_mut();
                self.discovered_count = 0;
            }
            if plan.close_dev {
                fp_dev_close(self.dev);
                self.dev = ptr::null_mut();
            }
            if plan.exit_library {
                fp_exit();
                self.initialized = false;
            }
        }
    }
}

/// Provider for the system libfprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct FprintProvider;

impl DeviceProvider for FprintProvider {
    fn name(&self) -> &'static str {
        "libfprint"
    }

    fn capability(&self) -> Result<Box<dyn DeviceCapability>, DeviceError> {
        Ok(Box::new(FprintDevice::new()))
    }
}

pub struct FprintDevice {
    handles: Arc<Mutex<Handles>>,
}

impl FprintDevice {
    pub fn new() -> Self {
        Self {
            handles: Arc::new(Mutex::new(Handles::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FprintDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy the serialized form of `print` into an owned buffer.
///
/// # Safety
/// `print` must be a valid print returned by libfprint.
unsafe fn print_bytes(print: *mut FpPrintData) -> Vec<u8> {
    let mut buf: *mut c_uchar = ptr::null_mut();
    let len = unsafe { fp_print_data_get_data(print, &mut buf) };
    if buf.is_null() || len == 0 {
        return Vec::new();
    }
    let bytes = unsafe { std::slice::from_raw_parts(buf, len) }.to_vec();
    unsafe { libc::free(buf as *mut c_void) };
    bytes
}

impl DeviceCapability for FprintDevice {
    fn init(&mut self) -> Result<(), DeviceError> {
        let ret = unsafe { fp_init() };
        if ret < 0 {
            return Err(DeviceError::Init(format!("fp_init returned {ret}")));
        }
        self.lock().initialized = true;
        Ok(())
    }

    fn discover_devices(&mut self) -> Result<Vec<DeviceHandle>, DeviceError> {
        let list = unsafe { fp_discover_devs() };
        if list.is_null() {
            return Err(DeviceError::Discovery("fp_discover_devs failed".to_string()));
        }

        let mut devices = Vec::new();
        loop {
            // SAFETY: the list is NULL-terminated.
            let dscv = unsafe { *list.add(devices.len()) };
            if dscv.is_null() {
                break;
            }
            let driver = unsafe {
                let drv = fp_dscv_dev_get_driver(dscv);
                let name = if drv.is_null() {
                    ptr::null()
                } else {
                    fp_driver_get_full_name(drv)
                };
                if name.is_null() {
                    "unknown".to_string()
                } else {
                    CStr::from_ptr(name).to_string_lossy().into_owned()
                }
            };
            devices.push(DeviceHandle {
                id: devices.len().to_string(),
                driver,
            });
        }

        let mut handles = self.lock();
        handles.discovered = list;
        handles.discovered_count = devices.len();
        Ok(devices)
    }

    fn open(&mut self, device: &DeviceHandle) -> Result<(), DeviceError> {
        let index: usize = device
            .id
            .parse()
            .map_err(|_| DeviceError::Open(format!("invalid device id {}", device.id)))?;

        let mut handles = self.lock();
        if handles.discovered.is_null() || index >= handles.discovered_count {
            return Err(DeviceError::Open(format!("device {} was not discovered", device.id)));
        }

        let dev = unsafe {
            let dev = fp_dev_open(*handles.discovered.add(index));
            fp_dscv_devs_free(handles.discovered);
            dev
        };
        handles.discovered = ptr::null_mut();
        handles.discovered_count = 0;

        if dev.is_null() {
            return Err(DeviceError::Open(format!("fp_dev_open failed for {}", device.driver)));
        }
        handles.dev = dev;
        Ok(())
    }

    fn enroll_step(&mut self) -> Result<StepResult, DeviceError> {
        // Not held across the blocking call so the releaser can run.
        let dev = {
            let mut handles = self.lock();
            if handles.dev.is_null() {
                return Err(DeviceError::Step("device is not open".to_string()));
            }
            handles.stepping = true;
            handles.dev
        };

        let mut print: *mut FpPrintData = ptr::null_mut();
        let ret = unsafe { fp_enroll_finger_img(dev, &mut print, ptr::null_mut()) };
        self.lock().stepping = false;

        match ret {
            FP_ENROLL_COMPLETE => {
                if print.is_null() {
                    return Err(DeviceError::Step("enroll completed without print data".to_string()));
                }
                let bytes = unsafe { print_bytes(print) };
                self.lock().print = print;
                Ok(StepResult::Complete(DeviceArtifact::new(bytes)))
            }
            FP_ENROLL_FAIL => Ok(StepResult::Fail),
            FP_ENROLL_PASS => Ok(StepResult::Pass),
            FP_ENROLL_RETRY => Ok(StepResult::Retry(RetryReason::Generic)),
            FP_ENROLL_RETRY_TOO_SHORT => Ok(StepResult::Retry(RetryReason::TooShort)),
            FP_ENROLL_RETRY_CENTER_FINGER => Ok(StepResult::Retry(RetryReason::CenterFinger)),
            FP_ENROLL_RETRY_REMOVE_FINGER => Ok(StepResult::Retry(RetryReason::RemoveFinger)),
            other => Err(DeviceError::Step(format!("fp_enroll_finger returned {other}"))),
        }
    }

    fn save_artifact(&mut self, _artifact: &DeviceArtifact, target: &Path) -> Result<(), SaveError> {
        let print = self.lock().print;
        if print.is_null() {
            return Err(SaveError {
                code: -libc::EINVAL,
                message: "no enrolled print to save".to_string(),
            });
        }

        tracing::debug!(target = %target.display(), "saving print under storage root");
        let ret = unsafe { fp_print_data_save(print, RIGHT_INDEX) };
        if ret < 0 {
            return Err(SaveError {
                code: ret,
                message: "fp_print_data_save failed".to_string(),
            });
        }
        Ok(())
    }

    fn releaser(&self) -> Releaser {
        let handles = Arc::clone(&self.handles);
        Box::new(move || {
            handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .release();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::NonNull;

    /// Handles as they look after a device was opened.
    fn opened() -> Handles {
        Handles {
            initialized: true,
            dev: NonNull::dangling().as_ptr(),
            ..Handles::new()
        }
    }

    #[test]
    fn test_release_plan_when_idle() {
        let handles = opened();
        assert_eq!(
            handles.release_plan(),
            ReleasePlan {
                free_print: false,
                free_discovered: false,
                close_dev: true,
                exit_library: true,
            }
        );
    }

    #[test]
    fn test_release_plan_during_step_keeps_device() {
        let handles = Handles {
            stepping: true,
            print: NonNull::dangling().as_ptr(),
            ..opened()
        };
        let plan = handles.release_plan();
        assert!(plan.free_print);
        assert!(!plan.close_dev);
        assert!(!plan.exit_library);
    }

    #[test]
    fn test_release_plan_for_fresh_handles() {
        let plan = Handles::new().release_plan();
        assert!(!plan.free_print && !plan.free_discovered && !plan.close_dev && !plan.exit_library);
    }
}
