//! The long-running pieces around the app state (monitor loop, key-events consumer, and on windows the lock-keys
//! hook), brought up and torn down together, plus the runtime switches that map onto config flags.

use std::sync::Mutex;
#[cfg(windows)]
use std::sync::mpsc::Sender;

use tracing::{info, warn};

use crate::applights::{AppLightsState, Flag};
use crate::config::Config;
use crate::key_events::KeyEventsProcessor;
#[cfg(windows)]
use crate::key_events::KeyEvent;
use crate::monitor::Monitor;



pub struct Services {
    app        : AppLightsState,
    conf       : Config,
    monitor    : Monitor,
    key_events : KeyEventsProcessor,

    #[cfg(windows)]
    events_tx  : Sender <KeyEvent>,
    #[cfg(windows)]
    iproc      : crate::input_proc::InputProcessor,

    hook_enabled : Flag,
    stopped      : Mutex <bool>,     // held for the whole shutdown, so a second caller waits for the first to finish
}

impl Services {

    /// Starts the key-events consumer, the hook (if enabled in config) and the monitor loop
    pub fn start (app:&AppLightsState, conf:&Config) -> Services {
        let key_events = KeyEventsProcessor::new();
        let _events_tx = key_events.start (app);
        let svc = Services {
            app        : app.clone(),
            conf       : conf.clone(),
            monitor    : Monitor::new(),
            key_events,
            #[cfg(windows)]
            events_tx  : _events_tx,
            #[cfg(windows)]
            iproc      : crate::input_proc::InputProcessor::new(),
            hook_enabled : Flag::default(),
            stopped      : Mutex::new (false),
        };
        svc.apply_lock_keys_hook (conf.check_flag__lock_keys_hook_enabled());
        svc.monitor.start (app, conf.get_poll_interval());
        svc
    }

    pub fn app        (&self) -> &AppLightsState     { &self.app }
    pub fn monitor    (&self) -> &Monitor            { &self.monitor }
    pub fn key_events (&self) -> &KeyEventsProcessor { &self.key_events }

    pub fn is_lock_keys_hook_enabled (&self) -> bool { self.hook_enabled.is_set() }

    pub fn is_stopped (&self) -> bool { *self.stopped.lock() .unwrap_or_else (|e| e.into_inner()) }


    fn apply_lighting (&self, enabled:bool) {
        if enabled && self.app.device_ready.is_clear() {
            if self.app.init_lighting() { self.app.render_current() }
        } else if !enabled && self.app.device_ready.is_set() {
            self.app.shutdown();
        }
    }

    fn apply_lock_keys_hook (&self, enabled:bool) {
        if enabled == self.hook_enabled.is_set() { return }
        #[cfg(windows)] {
            if enabled { self.iproc.begin_input_processing (self.events_tx.clone()) }
            else       { self.iproc.end_input_processing() }
        }
        #[cfg(not(windows))]
        tracing::debug! ("no os lock-keys hook on this platform (requested: {})", enabled);
        self.hook_enabled.store (enabled);
    }


    /// Turns keyboard lighting on/off for the session, and remembers the choice in config
    pub fn set_lighting_enabled (&self, enabled:bool) {
        self.conf.set_flag__lighting_enabled (enabled);
        self.apply_lighting (enabled);
    }

    /// Installs/removes the lock-keys hook, and remembers the choice in config
    pub fn set_lock_keys_hook_enabled (&self, enabled:bool) {
        self.conf.set_flag__lock_keys_hook_enabled (enabled);
        self.apply_lock_keys_hook (enabled);
    }

    /// Re-reads the config file and applies what can change at runtime (log level, lighting, hook)
    pub fn reload_config (&self) {
        if self.is_stopped() { return }
        self.conf.load();
        self.conf.reload_log_level();
        self.apply_lighting (self.conf.check_flag__lighting_enabled());
        self.apply_lock_keys_hook (self.conf.check_flag__lock_keys_hook_enabled());
        info! ("config reloaded");
    }


    /// Stops everything and hands the keyboard back .. only the first call does the work (false for the rest)
    pub fn shutdown (&self) -> bool {
        let mut stopped = self.stopped.lock() .unwrap_or_else (|e| e.into_inner());
        if *stopped { return false }

        self.apply_lock_keys_hook (false);
        if !self.monitor.stop (self.conf.get_shutdown_timeout()) {
            warn! ("monitor loop still busy at shutdown, releasing the device anyway");
        }
        self.key_events.stop();
        self.app.shutdown();

        *stopped = true;
        info! ("services shut down");
        true
    }
}




#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use crate::key_events::{KeyEvent, ManualLockKeys};
    use crate::lighting::HeadlessDevice;
    use crate::monitor::MonitorStatus;
    use crate::notices::Notifier;
    use crate::persistence::TomlProfilesFile;
    use crate::procs::ManualProcessSource;

    struct Rig {
        _dir   : tempfile::TempDir,
        conf   : Config,
        app    : AppLightsState,
        device : Arc <HeadlessDevice>,
    }

    fn rig (conf_txt:&str) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join (Config::CONF_FILE_NAME);
        // logging stays off so tests dont install the global subscriber
        fs::write (&conf_path, format! ("logging_enabled = false\n{}", conf_txt)).unwrap();
        let conf = Config::with_file (&conf_path);
        let device = Arc::new (HeadlessDevice::new());
        let app = AppLightsState::new (
            Arc::new (TomlProfilesFile::new (dir.path().join ("profiles.toml"))), Arc::new (ManualProcessSource::new()),
            Arc::new (ManualLockKeys::new()), device.clone(), Notifier::new(),
        );
        Rig { _dir: dir, conf, app, device }
    }

    #[test]
    fn shutdown_stops_everything_once () {
        let r = rig ("poll_interval_ms = 100\n");
        r.app.init_lighting();
        let svc = Services::start (&r.app, &r.conf);
        assert! (svc.monitor().is_running());
        assert! (svc.key_events().is_running());

        assert! (svc.shutdown());
        assert! (svc.is_stopped());
        assert_eq! (svc.monitor().status(), MonitorStatus::Stopped);
        assert! (!svc.key_events().post (KeyEvent::LockKeyToggled (crate::keys::LockKey::Num)));
        assert! (r.device.was_restored());
        assert! (!svc.is_lock_keys_hook_enabled());

        assert! (!svc.shutdown());
    }

    #[test]
    fn concurrent_shutdowns_both_return_after_the_work_is_done () {
        let r = rig ("");
        r.app.init_lighting();
        let svc = Arc::new (Services::start (&r.app, &r.conf));
        let other = { let s = svc.clone(); thread::spawn (move || s.shutdown()) };
        let here = svc.shutdown();
        let there = other.join().unwrap();
        assert! (here ^ there);
        assert! (r.device.was_restored());
        assert_eq! (svc.monitor().status(), MonitorStatus::Stopped);
    }

    #[test]
    fn lighting_switch_persists_and_applies () {
        let r = rig ("");
        let svc = Services::start (&r.app, &r.conf);
        svc.set_lighting_enabled (true);
        assert! (r.app.device_ready.is_set());
        assert! (r.device.all_color().is_some());

        svc.set_lighting_enabled (false);
        assert! (r.app.device_ready.is_clear());
        assert! (r.device.was_restored());
        assert! (!r.conf.check_flag__lighting_enabled());
        svc.shutdown();
    }

    #[test]
    fn reload_picks_up_file_edits () {
        let r = rig ("lock_keys_hook_enabled = true\nlighting_enabled = true\n");
        r.app.init_lighting();
        let svc = Services::start (&r.app, &r.conf);
        assert! (svc.is_lock_keys_hook_enabled());

        let path = r.conf.get_config_file().unwrap();
        fs::write (&path, "logging_enabled = false\nlock_keys_hook_enabled = false\nlighting_enabled = false\n").unwrap();
        svc.reload_config();
        assert! (!svc.is_lock_keys_hook_enabled());
        assert! (r.app.device_ready.is_clear());
        assert! (r.device.was_restored());

        svc.shutdown();
        svc.reload_config();    // no-op once stopped
        assert! (!svc.is_lock_keys_hook_enabled());
    }

    #[test]
    fn hook_switch_is_remembered () {
        let r = rig ("lock_keys_hook_enabled = false\n");
        let svc = Services::start (&r.app, &r.conf);
        assert! (!svc.is_lock_keys_hook_enabled());
        svc.set_lock_keys_hook_enabled (true);
        assert! (svc.is_lock_keys_hook_enabled());
        assert! (r.conf.check_flag__lock_keys_hook_enabled());
        svc.shutdown();
    }
}
