use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use crate::keys::LogiKey;
use crate::profiles::Rgb;



/// What we need from a per-key rgb keyboard. Writes are fire-and-forget, a device that went away just ignores them
pub trait LightingDevice : Send + Sync {
    /// true if the device is usable .. a false here makes lighting inert for the session
    fn initialize (&self) -> bool;
    fn set_all_keys (&self, color:Rgb);
    fn set_key (&self, key:LogiKey, color:Rgb);
    /// puts back whatever lighting was there before we took over
    fn restore (&self);
    fn shutdown (&self);
}



/// A single recorded device write
# [ derive (Debug, Eq, PartialEq, Copy, Clone) ]
pub enum DeviceWrite {
    All (Rgb),
    Key (LogiKey, Rgb),
}


# [ derive (Debug, Default) ]
struct HeadlessFrame {
    all_color : Option <Rgb>,
    keys      : HashMap <LogiKey, Rgb>,
    log       : VecDeque <DeviceWrite>,    // most recent writes only, see MAX_LOGGED_WRITES
    inited    : bool,
    restored  : bool,
}

impl HeadlessFrame {
    fn push_write (&mut self, w:DeviceWrite) {
        if self.log.len() >= HeadlessDevice::MAX_LOGGED_WRITES { self.log.pop_front(); }
        self.log.push_back (w);
    }
}

/// In-memory stand-in for the keyboard, for hosts w/o the vendor sdk and for tests.
/// Tracks the effective color of each key, plus a log of the most recent writes.
# [ derive (Debug) ]
pub struct HeadlessDevice {
    frame     : Mutex <HeadlessFrame>,
    available : bool,
}

impl Default for HeadlessDevice {
    fn default () -> Self { HeadlessDevice::new() }
}

impl HeadlessDevice {

    /// cap on the rolling write log (older writes fall off the front)
    pub const MAX_LOGGED_WRITES : usize = 1024;

    pub fn new () -> HeadlessDevice {
        HeadlessDevice { frame: Mutex::default(), available: true }
    }
    /// a device that refuses to initialize, for exercising the inert-lighting path
    pub fn unavailable () -> HeadlessDevice {
        HeadlessDevice { frame: Mutex::default(), available: false }
    }

    fn frame (&self) -> std::sync::MutexGuard<'_, HeadlessFrame> {
        self.frame.lock() .unwrap_or_else (|e| e.into_inner())
    }

    /// effective color of a key .. its own last write, else the last set-all color
    pub fn key_color (&self, key:LogiKey) -> Option<Rgb> {
        let f = self.frame();
        f.keys.get(&key).copied() .or (f.all_color)
    }
    pub fn all_color (&self) -> Option<Rgb> { self.frame().all_color }

    pub fn writes (&self) -> Vec<DeviceWrite> { self.frame().log.iter().copied().collect() }
    pub fn write_count (&self) -> usize { self.frame().log.len() }
    pub fn clear_writes (&self) { self.frame().log.clear() }

    pub fn is_initialized (&self) -> bool { self.frame().inited }
    pub fn was_restored (&self) -> bool { self.frame().restored }
}

impl LightingDevice for HeadlessDevice {

    fn initialize (&self) -> bool {
        self.frame().inited = self.available;
        self.available
    }

    fn set_all_keys (&self, color:Rgb) {
        let mut f = self.frame();
        f.all_color = Some(color);
        f.keys.clear();
        f.push_write (DeviceWrite::All(color));
    }

    fn set_key (&self, key:LogiKey, color:Rgb) {
        let mut f = self.frame();
        f.keys.insert (key, color);
        f.push_write (DeviceWrite::Key (key, color));
    }

    fn restore (&self) {
        debug! ("headless device: restore");
        let mut f = self.frame();
        f.restored = true;
        f.all_color = None;
        f.keys.clear();
    }

    fn shutdown (&self) {
        debug! ("headless device: shutdown");
        self.frame().inited = false;
    }
}




#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_writes_override_set_all_until_the_next_one () {
        let d = HeadlessDevice::new();
        assert! (d.initialize());
        d.set_all_keys (Rgb::CYAN);
        d.set_key (LogiKey::F1, Rgb::RED);
        assert_eq! (d.key_color (LogiKey::F1), Some(Rgb::RED));
        assert_eq! (d.key_color (LogiKey::F2), Some(Rgb::CYAN));
        d.set_all_keys (Rgb::GREEN);
        assert_eq! (d.key_color (LogiKey::F1), Some(Rgb::GREEN));
        assert_eq! (d.write_count(), 3);
    }

    #[test]
    fn unavailable_device_fails_init () {
        let d = HeadlessDevice::unavailable();
        assert! (!d.initialize());
        assert! (!d.is_initialized());
    }

    #[test]
    fn restore_forgets_our_colors () {
        let d = HeadlessDevice::new();
        d.initialize();
        d.set_all_keys (Rgb::CYAN);
        d.restore();
        d.shutdown();
        assert! (d.was_restored());
        assert_eq! (d.key_color (LogiKey::A), None);
        assert! (!d.is_initialized());
    }

    #[test]
    fn write_log_keeps_only_the_latest_writes () {
        let d = HeadlessDevice::new();
        d.initialize();
        for _ in 0 .. HeadlessDevice::MAX_LOGGED_WRITES {
            d.set_key (LogiKey::F1, Rgb::RED);
        }
        d.set_all_keys (Rgb::GREEN);
        assert_eq! (d.write_count(), HeadlessDevice::MAX_LOGGED_WRITES);
        assert_eq! (d.writes().last(), Some (&DeviceWrite::All (Rgb::GREEN)));
        assert_eq! (d.writes().first(), Some (&DeviceWrite::Key (LogiKey::F1, Rgb::RED)));
    }
}
