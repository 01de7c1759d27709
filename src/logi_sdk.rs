//! Logitech LED SDK binding .. the wrapper dll is loaded at runtime, so a machine w/o G HUB / LGS just gets an
//! uninitializable device instead of a failed process start.

use std::mem::transmute_copy;
use std::sync::RwLock;

use tracing::{error, info, warn};

use windows::core::{s, w, PCSTR};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use crate::keys::LogiKey;
use crate::lighting::LightingDevice;
use crate::profiles::Rgb;



/// LOGI_DEVICETYPE_PERKEY_RGB
const LOGI_DEVICETYPE_PERKEY_RGB : i32 = 1 << 2;

type InitFn        = unsafe extern "C" fn () -> bool;
type SetTargetFn   = unsafe extern "C" fn (i32) -> bool;
type SaveFn        = unsafe extern "C" fn () -> bool;
type SetLightingFn = unsafe extern "C" fn (i32, i32, i32) -> bool;
type SetKeyFn      = unsafe extern "C" fn (u32, i32, i32, i32) -> bool;
type RestoreFn     = unsafe extern "C" fn () -> bool;
type ShutdownFn    = unsafe extern "C" fn ();


# [ derive (Clone, Copy) ]
struct SdkFns {
    init         : InitFn,
    set_target   : SetTargetFn,
    save         : SaveFn,
    set_lighting : SetLightingFn,
    set_key      : SetKeyFn,
    restore      : RestoreFn,
    shutdown     : ShutdownFn,
}

unsafe fn load_sym<T: Copy> (module:HMODULE, name:PCSTR) -> Option<T> {
    let p = GetProcAddress (module, name)?;
    // every symbol we resolve is a plain C fn, and T is always the matching fn-pointer type
    Some ( transmute_copy::<_, T> (&p) )
}

fn load_sdk () -> Option<SdkFns> { unsafe {
    let module = match LoadLibraryW ( w!("LogitechLedEnginesWrapper.dll") ) {
        Ok(m) => m,
        Err(e) => { warn! ("could not load the Logitech LED sdk dll : {:?}", e); return None }
    };
    // the module is never freed .. it stays loaded for the life of the process
    let fns = SdkFns {
        init         : load_sym (module, s!("LogiLedInit"))?,
        set_target   : load_sym (module, s!("LogiLedSetTargetDevice"))?,
        save         : load_sym (module, s!("LogiLedSaveCurrentLighting"))?,
        set_lighting : load_sym (module, s!("LogiLedSetLighting"))?,
        set_key      : load_sym (module, s!("LogiLedSetLightingForKeyWithKeyName"))?,
        restore      : load_sym (module, s!("LogiLedRestoreLighting"))?,
        shutdown     : load_sym (module, s!("LogiLedShutdown"))?,
    };
    Some(fns)
} }



/// The real keyboard, driven through the vendor sdk
# [ derive (Default) ]
pub struct LogiLedDevice {
    fns : RwLock <Option <SdkFns>>,
}

impl LogiLedDevice {

    pub fn new () -> LogiLedDevice { LogiLedDevice::default() }

    fn fns (&self) -> Option<SdkFns> {
        *self.fns.read() .unwrap_or_else (|e| e.into_inner())
    }
}

impl LightingDevice for LogiLedDevice {

    fn initialize (&self) -> bool { unsafe {
        let Some(fns) = load_sdk() else {
            error! ("Logitech LED sdk unavailable (dll or one of its entry points missing)");
            return false
        };
        if !(fns.init)() {
            error! ("LogiLedInit failed .. is G HUB / LGS running?");
            return false
        }
        let _ = (fns.set_target) (LOGI_DEVICETYPE_PERKEY_RGB);
        let _ = (fns.save)();
        *self.fns.write() .unwrap_or_else (|e| e.into_inner()) = Some(fns);
        info! ("Logitech LED sdk initialized");
        true
    } }

    fn set_all_keys (&self, color:Rgb) {
        let Some(fns) = self.fns() else { return };
        let (r, g, b) = color.to_percent();
        unsafe { let _ = (fns.set_lighting) (r, g, b); }
    }

    fn set_key (&self, key:LogiKey, color:Rgb) {
        let Some(fns) = self.fns() else { return };
        let (r, g, b) = color.to_percent();
        unsafe { let _ = (fns.set_key) (key.id(), r, g, b); }
    }

    fn restore (&self) {
        let Some(fns) = self.fns() else { return };
        unsafe { let _ = (fns.restore)(); }
    }

    fn shutdown (&self) {
        let Some(fns) = self.fns.write() .unwrap_or_else (|e| e.into_inner()) .take() else { return };
        unsafe { (fns.shutdown)(); }
        info! ("Logitech LED sdk shut down");
    }
}
