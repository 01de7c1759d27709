use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::keys::{LockKey, LogiKey};
use crate::lighting::LightingDevice;
use crate::key_events::LockKeySource;
use crate::notices::{Backend_Notice, Notifier};
use crate::persistence::{self, PersistError, ProfilePersistence};
use crate::procs::{ProcSnapshot, ProcessSource};
use crate::profiles::{AppProfile, ColorKind, GlobalColorKind, GlobalColors, KeyListKind, ProfileStore, Rgb};
use crate::renderer;




# [ derive (Debug, Default, Clone) ]
/// pure sugar for representation of our atomic-bool flags
pub struct Flag (Arc <AtomicBool>);
// ^^ simple sugar that helps reduce clutter in code

impl Flag {
    pub fn new (state:bool) -> Flag { Flag ( Arc::new ( AtomicBool::new(state) ) ) }

    pub fn set   (&self) { self.0 .store (true,  Ordering::SeqCst) }
    pub fn clear (&self) { self.0 .store (false, Ordering::SeqCst) }
    pub fn store (&self, state:bool) { self.0 .store (state, Ordering::SeqCst) }

    pub fn is_set   (&self) -> bool { self.0 .load (Ordering::SeqCst) }
    pub fn is_clear (&self) -> bool { !self.0 .load (Ordering::SeqCst) }
}




# [ derive ( ) ]
pub struct _AppLightsState {

    pub store    : ProfileStore,
    pub persist  : Arc <dyn ProfilePersistence>,
    pub procs    : Arc <dyn ProcessSource>,
    pub locks    : Arc <dyn LockKeySource>,
    pub device   : Arc <dyn LightingDevice>,
    pub notifier : Notifier,

    globals     : RwLock <GlobalColors>,
    render_lock : Mutex <()>,     // serializes whole frames to the device

    pub device_ready    : Flag,
    pub action_active   : Flag,
    pub start_minimized : Flag,
}

/// The app's shared state and ui-facing api .. cheap to clone, and the clone is what the monitor and key-events threads hold
# [ derive (Clone) ]
pub struct AppLightsState ( Arc <_AppLightsState> );

impl Deref for AppLightsState {
    type Target = _AppLightsState;
    fn deref (&self) -> &Self::Target { &self.0 }
}




impl AppLightsState {

    pub fn new (
        persist  : Arc <dyn ProfilePersistence>,
        procs    : Arc <dyn ProcessSource>,
        locks    : Arc <dyn LockKeySource>,
        device   : Arc <dyn LightingDevice>,
        notifier : Notifier,
    ) -> AppLightsState {
        AppLightsState ( Arc::new ( _AppLightsState {
            store : ProfileStore::new (persist.clone(), procs.clone()),
            persist, procs, locks, device, notifier,
            globals         : RwLock::new (GlobalColors::default()),
            render_lock     : Mutex::new (()),
            device_ready    : Flag::default(),
            action_active   : Flag::default(),
            start_minimized : Flag::default(),
        } ) )
    }



    /*****  startup / shutdown  ******/

    /// Brings up the lighting device .. on failure lighting stays inert for the session and the ui gets a notice
    pub fn init_lighting (&self) -> bool {
        if self.device.initialize() {
            self.device_ready.set();
            info! ("lighting device initialized");
            return true
        }
        warn! ("lighting device unavailable .. lighting will be inert for this session");
        self.notifier.emit_backend_notice (Backend_Notice::device_unavailable, None);
        false
    }

    /// (Re)loads profiles and global settings from persistence
    pub fn load_profiles (&self) -> usize {
        let n = self.store.reload();
        *self.globals.write() .unwrap_or_else (|e| e.into_inner()) = self.persist.load_global_colors();
        self.start_minimized.store (self.persist.load_start_minimized());
        self.emit_profiles();
        n
    }

    /// Puts the keyboard back the way we found it
    pub fn shutdown (&self) {
        let _guard = self.render_lock.lock() .unwrap_or_else (|e| e.into_inner());
        if self.device_ready.is_set() {
            self.device.restore();
            self.device.shutdown();
            self.device_ready.clear();
            info! ("lighting device released");
        }
    }



    /*****  resolution and rendering  ******/

    /// One resolution cycle against the given snapshot .. renders and notifies only when the in-use profile changed
    pub fn resolve_and_maybe_render (&self, snap:&ProcSnapshot) -> bool {
        let res = self.store.resolve (snap);
        if res.changed {
            self.render_current();
            self.notifier.emit_in_use (res.in_use_name().map (|s| s.to_string()));
            self.emit_profiles();
        }
        res.changed
    }

    /// Resolution cycle against a fresh snapshot .. shared by the monitor loop and the ui 'check now'
    pub fn check_now (&self) -> bool {
        let snap = self.procs.snapshot();
        self.resolve_and_maybe_render (&snap)
    }

    /// Re-renders the full frame for the current in-use profile and lock states
    pub fn render_current (&self) {
        if self.device_ready.is_clear() { return }
        // the plan is computed inside the render lock so frames always go out in the order their state was read
        let _guard = self.render_lock.lock() .unwrap_or_else (|e| e.into_inner());
        let resolved = self.store.in_use();
        let globals = self.get_global_colors();
        let ops = renderer::plan (resolved.as_ref(), self.locks.lock_states(), &globals, self.action_active.is_set());
        debug! ("rendering {:?} ({} ops)", resolved.as_ref().map (|p| &p.app_name), ops.len());
        renderer::apply (&*self.device, &ops);
    }

    pub fn handle_lock_key_event (&self, lk:LockKey) {
        debug! ("re-rendering for {} lock toggle", lk.as_ref());
        self.render_current();
    }



    /*****  ui-originated edits  ******/

    fn is_in_use (&self, name:&str) -> bool {
        self.store.in_use() .is_some_and (|p| p.matches(name))
    }

    /// After any edit : optionally re-resolve, make sure the keyboard reflects an edited in-use profile, refresh the ui
    fn after_edit (&self, touched_in_use:bool, reresolve:bool) {
        let changed = reresolve && self.check_now();
        if !changed && touched_in_use {
            self.render_current();
            self.notifier.emit_in_use (self.store.in_use_name());
        }
        self.emit_profiles();
    }

    /// Adds (or updates color/lock-toggle of) a profile .. returns true if it was new
    pub fn add_profile (&self, name:&str, color:Rgb, lock_keys_enabled:bool) -> bool {
        let is_new = self.store.upsert (name, color, lock_keys_enabled);
        self.after_edit (self.is_in_use(name), true);
        is_new
    }

    pub fn remove_profile (&self, name:&str) -> bool {
        let was_in_use = self.is_in_use (name);
        let removed = self.store.remove (name);
        if removed { self.after_edit (was_in_use, true) }
        removed
    }

    pub fn update_color (&self, name:&str, kind:ColorKind, color:Rgb) -> bool {
        let updated = self.store.set_color_property (name, kind, color);
        if updated { self.after_edit (self.is_in_use(name), false) }
        updated
    }

    pub fn update_lock_keys_enabled (&self, name:&str, enabled:bool) -> bool {
        let updated = self.store.set_lock_keys_enabled (name, enabled);
        if updated { self.after_edit (self.is_in_use(name), false) }
        updated
    }

    pub fn update_key_list (&self, name:&str, kind:KeyListKind, keys:&[LogiKey]) -> bool {
        let updated = self.store.set_key_list (name, kind, keys);
        if updated { self.after_edit (self.is_in_use(name), false) }
        updated
    }

    /// Manual switch to a running profile .. false if unknown or its app isnt running
    pub fn activate_profile (&self, name:&str) -> bool {
        let Some(res) = self.store.activate (name) else {
            debug! ("cant activate {:?} : unknown or not running", name);
            return false
        };
        if res.changed {
            self.render_current();
            self.notifier.emit_in_use (res.in_use_name().map (|s| s.to_string()));
            self.emit_profiles();
        }
        true
    }

    /// Toggles the action-keys overlay of the in-use profile
    pub fn set_action_keys_active (&self, active:bool) {
        self.action_active.store (active);
        self.render_current();
    }

    pub fn set_global_color (&self, kind:GlobalColorKind, color:Rgb) {
        self.globals.write() .unwrap_or_else (|e| e.into_inner()) .set (kind, color);
        if let Err(e) = self.persist.save_global_color (kind, color) {
            warn! ("failed to persist {} color : {}", kind.as_ref(), e);
        }
        self.render_current();
    }

    pub fn set_start_minimized (&self, start_minimized:bool) {
        self.start_minimized.store (start_minimized);
        if let Err(e) = self.persist.save_start_minimized (start_minimized) {
            warn! ("failed to persist start-minimized flag : {}", e);
        }
    }



    /*****  import / export  ******/

    /// Imports a profile file, upserting every field .. returns the imported profile's name
    pub fn import_profile (&self, path:&Path) -> Result <String, PersistError> {
        match persistence::import_profile (path) {
            Ok(p) => {
                let is_new = self.store.upsert_full (&p);
                info! ("imported profile {:?} from {:?} (new: {})", p.app_name, path, is_new);
                self.notifier.emit_backend_notice (Backend_Notice::profile_imported, Some (p.app_name.clone()));
                self.after_edit (self.is_in_use (&p.app_name), true);
                Ok (p.app_name)
            }
            Err(e) => {
                warn! ("profile import from {:?} failed : {}", path, e);
                self.notifier.emit_backend_notice (Backend_Notice::import_failed, Some (e.to_string()));
                Err(e)
            }
        }
    }

    /// Exports the named profile .. Ok(false) if there is no such profile
    pub fn export_profile (&self, name:&str, path:&Path) -> Result <bool, PersistError> {
        let Some(p) = self.store.find (name) else { return Ok(false) };
        persistence::export_profile (&p, path)?;
        info! ("exported profile {:?} to {:?}", p.app_name, path);
        Ok(true)
    }



    /*****  queries  ******/

    pub fn get_profiles_snapshot (&self) -> Vec<AppProfile> { self.store.snapshot_all() }

    pub fn get_in_use_profile_name (&self) -> Option<String> { self.store.in_use_name() }

    pub fn get_global_colors (&self) -> GlobalColors {
        *self.globals.read() .unwrap_or_else (|e| e.into_inner())
    }

    pub fn get_start_minimized (&self) -> bool { self.start_minimized.is_set() }

    /// currently visible apps, for picking a new profile's app
    pub fn visible_apps (&self) -> Vec<String> { self.procs.snapshot().names_sorted() }

    pub fn emit_profiles (&self) {
        self.notifier.emit_profiles (self.store.snapshot_all());
    }
}




#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_events::ManualLockKeys;
    use crate::lighting::HeadlessDevice;
    use crate::persistence::TomlProfilesFile;
    use crate::procs::ManualProcessSource;

    struct Rig {
        app    : AppLightsState,
        procs  : Arc<ManualProcessSource>,
        locks  : Arc<ManualLockKeys>,
        device : Arc<HeadlessDevice>,
        _dir   : tempfile::TempDir,
    }

    fn rig (device:HeadlessDevice) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let persist = Arc::new (TomlProfilesFile::new (dir.path().join("profiles.toml")));
        let procs = Arc::new (ManualProcessSource::new());
        let locks = Arc::new (ManualLockKeys::new());
        let device = Arc::new (device);
        let app = AppLightsState::new (persist, procs.clone(), locks.clone(), device.clone(), Notifier::new());
        Rig { app, procs, locks, device, _dir: dir }
    }

    #[test]
    fn inert_device_never_gets_written () {
        let r = rig (HeadlessDevice::unavailable());
        assert! (!r.app.init_lighting());
        r.procs.set_running (["a.exe"]);
        r.app.add_profile ("a.exe", Rgb::GREEN, true);
        r.app.render_current();
        assert_eq! (r.device.write_count(), 0);
        assert_eq! (r.app.get_in_use_profile_name(), Some("a.exe".to_string()));
    }

    #[test]
    fn editing_the_in_use_profile_re_renders () {
        let r = rig (HeadlessDevice::new());
        r.app.init_lighting();
        r.procs.set_running (["a.exe"]);
        r.app.add_profile ("a.exe", Rgb::GREEN, true);
        assert_eq! (r.device.key_color (LogiKey::Q), Some(Rgb::GREEN));
        r.app.update_color ("a.exe", ColorKind::App, Rgb::RED);
        assert_eq! (r.device.key_color (LogiKey::Q), Some(Rgb::RED));
        r.app.update_key_list ("a.exe", KeyListKind::Highlight, &[LogiKey::Q]);
        assert_eq! (r.device.key_color (LogiKey::Q), Some (AppProfile::DEFAULT_HIGHLIGHT_COLOR));
    }

    #[test]
    fn action_overlay_toggles () {
        let r = rig (HeadlessDevice::new());
        r.app.init_lighting();
        r.procs.set_running (["game.exe"]);
        r.app.add_profile ("game.exe", Rgb::BLACK, true);
        r.app.update_key_list ("game.exe", KeyListKind::Action, &[LogiKey::W]);
        assert_eq! (r.device.key_color (LogiKey::W), Some(Rgb::BLACK));
        r.app.set_action_keys_active (true);
        assert_eq! (r.device.key_color (LogiKey::W), Some (AppProfile::DEFAULT_ACTION_COLOR));
        r.app.set_action_keys_active (false);
        assert_eq! (r.device.key_color (LogiKey::W), Some(Rgb::BLACK));
    }

    #[test]
    fn lock_key_events_pick_up_new_os_state () {
        let r = rig (HeadlessDevice::new());
        r.app.init_lighting();
        r.app.render_current();
        assert_eq! (r.device.key_color (LogiKey::CAPS_LOCK), Some(Rgb::WHITE));
        r.locks.set (LockKey::Caps, true);
        r.app.handle_lock_key_event (LockKey::Caps);
        assert_eq! (r.device.key_color (LogiKey::CAPS_LOCK), Some(Rgb::RED));
    }

    #[test]
    fn global_colors_persist_and_apply () {
        let r = rig (HeadlessDevice::new());
        r.app.init_lighting();
        r.app.set_global_color (GlobalColorKind::Default, Rgb::YELLOW);
        r.app.set_start_minimized (true);
        assert_eq! (r.device.key_color (LogiKey::A), Some(Rgb::YELLOW));
        *r.app.globals.write().unwrap() = GlobalColors::default();
        r.app.load_profiles();
        assert_eq! (r.app.get_global_colors().default_color, Rgb::YELLOW);
        assert! (r.app.get_start_minimized());
    }

    #[test]
    fn shutdown_restores_device_once () {
        let r = rig (HeadlessDevice::new());
        r.app.init_lighting();
        r.app.shutdown();
        assert! (r.device.was_restored());
        assert! (r.app.device_ready.is_clear());
        r.device.clear_writes();
        r.app.render_current();
        assert_eq! (r.device.write_count(), 0);
    }
}
