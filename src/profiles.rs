use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use tracing::{debug, info, warn};

use crate::engine::{self, Resolution};
use crate::history::{names_match, ActivationHistory};
use crate::keys::{LockKey, LogiKey};
use crate::persistence::ProfilePersistence;
use crate::procs::{ProcSnapshot, ProcessSource};




# [ derive (Debug, Default, Eq, PartialEq, Hash, Copy, Clone, Serialize, Deserialize) ]
pub struct Rgb {
    pub r : u8,
    pub g : u8,
    pub b : u8,
}

impl Rgb {
    pub const fn new (r:u8, g:u8, b:u8) -> Rgb { Rgb { r, g, b } }

    pub const CYAN   : Rgb = Rgb::new (0, 255, 255);
    pub const WHITE  : Rgb = Rgb::new (255, 255, 255);
    pub const YELLOW : Rgb = Rgb::new (255, 255, 0);
    pub const RED    : Rgb = Rgb::new (255, 0, 0);
    pub const GREEN  : Rgb = Rgb::new (0, 255, 0);
    pub const BLACK  : Rgb = Rgb::new (0, 0, 0);

    /// the lighting sdk takes 0-100 percentages per channel
    pub fn to_percent (&self) -> (i32, i32, i32) {
        let pct = |c:u8| c as i32 * 100 / 255;
        (pct(self.r), pct(self.g), pct(self.b))
    }

    pub fn to_array (&self) -> [u8; 3] { [self.r, self.g, self.b] }

    pub fn from_slice (vals:&[i64]) -> Option<Rgb> {
        let ch = |v:&i64| u8::try_from(*v).ok();
        match vals {
            [r, g, b] => Some ( Rgb::new (ch(r)?, ch(g)?, ch(b)?) ),
            _ => None
        }
    }
}



/// Which of the per-profile colors an update refers to
# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, AsRefStr, Serialize, Deserialize) ]
# [ serde (rename_all = "snake_case") ]
pub enum ColorKind { App, Highlight, Action }

/// Which of the per-profile key lists an update refers to
# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, AsRefStr, Serialize, Deserialize) ]
# [ serde (rename_all = "snake_case") ]
pub enum KeyListKind { Highlight, Action }

/// The global (non per-profile) colors
# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, AsRefStr, Serialize, Deserialize) ]
# [ serde (rename_all = "snake_case") ]
pub enum GlobalColorKind { Default, NumLock, CapsLock, ScrollLock }

impl GlobalColorKind {
    pub const ALL : [GlobalColorKind; 4] = [
        GlobalColorKind::Default, GlobalColorKind::NumLock, GlobalColorKind::CapsLock, GlobalColorKind::ScrollLock
    ];
    pub fn for_lock_key (lk:LockKey) -> GlobalColorKind {
        match lk {
            LockKey::Num    => GlobalColorKind::NumLock,
            LockKey::Caps   => GlobalColorKind::CapsLock,
            LockKey::Scroll => GlobalColorKind::ScrollLock,
        }
    }
}



# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, Serialize, Deserialize) ]
pub struct GlobalColors {
    pub default_color     : Rgb,
    pub num_lock_color    : Rgb,
    pub caps_lock_color   : Rgb,
    pub scroll_lock_color : Rgb,
}

impl Default for GlobalColors {
    fn default () -> Self { GlobalColors {
        default_color     : Rgb::WHITE,
        num_lock_color    : Rgb::RED,
        caps_lock_color   : Rgb::RED,
        scroll_lock_color : Rgb::RED,
    } }
}

impl GlobalColors {
    pub fn get (&self, kind:GlobalColorKind) -> Rgb {
        match kind {
            GlobalColorKind::Default    => self.default_color,
            GlobalColorKind::NumLock    => self.num_lock_color,
            GlobalColorKind::CapsLock   => self.caps_lock_color,
            GlobalColorKind::ScrollLock => self.scroll_lock_color,
        }
    }
    pub fn set (&mut self, kind:GlobalColorKind, color:Rgb) {
        match kind {
            GlobalColorKind::Default    => self.default_color     = color,
            GlobalColorKind::NumLock    => self.num_lock_color    = color,
            GlobalColorKind::CapsLock   => self.caps_lock_color   = color,
            GlobalColorKind::ScrollLock => self.scroll_lock_color = color,
        }
    }
    pub fn lock_color (&self, lk:LockKey) -> Rgb {
        self.get (GlobalColorKind::for_lock_key(lk))
    }
}




/// One monitored application and how the keyboard should look while it is the in-use profile
# [ derive (Debug, Eq, PartialEq, Clone, Serialize, Deserialize) ]
pub struct AppProfile {
    pub app_name          : String,
    pub app_color         : Rgb,
    pub highlight_color   : Rgb,
    pub action_color      : Rgb,
    pub lock_keys_enabled : bool,
    pub highlight_keys    : Vec <LogiKey>,
    pub action_keys       : Vec <LogiKey>,

    // derived state .. refreshed by the resolution engine, never persisted
    pub is_app_running    : bool,
    pub is_profile_in_use : bool,
}

impl AppProfile {

    pub const DEFAULT_APP_COLOR       : Rgb = Rgb::CYAN;
    pub const DEFAULT_HIGHLIGHT_COLOR : Rgb = Rgb::WHITE;
    pub const DEFAULT_ACTION_COLOR    : Rgb = Rgb::YELLOW;

    pub fn new (app_name:&str) -> AppProfile { AppProfile {
        app_name          : app_name.trim().to_string(),
        app_color         : Self::DEFAULT_APP_COLOR,
        highlight_color   : Self::DEFAULT_HIGHLIGHT_COLOR,
        action_color      : Self::DEFAULT_ACTION_COLOR,
        lock_keys_enabled : true,
        highlight_keys    : vec![],
        action_keys       : vec![],
        is_app_running    : false,
        is_profile_in_use : false,
    } }

    pub fn matches (&self, name:&str) -> bool {
        names_match (&self.app_name, name.trim())
    }

    pub fn color (&self, kind:ColorKind) -> Rgb {
        match kind {
            ColorKind::App       => self.app_color,
            ColorKind::Highlight => self.highlight_color,
            ColorKind::Action    => self.action_color,
        }
    }
    pub fn set_color (&mut self, kind:ColorKind, color:Rgb) {
        match kind {
            ColorKind::App       => self.app_color       = color,
            ColorKind::Highlight => self.highlight_color = color,
            ColorKind::Action    => self.action_color    = color,
        }
    }

    pub fn keys (&self, kind:KeyListKind) -> &[LogiKey] {
        match kind {
            KeyListKind::Highlight => &self.highlight_keys,
            KeyListKind::Action    => &self.action_keys,
        }
    }
    pub fn set_keys (&mut self, kind:KeyListKind, keys:&[LogiKey]) {
        let mut deduped : Vec<LogiKey> = Vec::with_capacity (keys.len());
        keys .iter() .for_each (|k| if !deduped.contains(k) { deduped.push(*k) });
        match kind {
            KeyListKind::Highlight => self.highlight_keys = deduped,
            KeyListKind::Action    => self.action_keys    = deduped,
        }
    }

    /// same profile w derived flags cleared .. what gets compared/persisted
    pub fn without_derived (&self) -> AppProfile {
        AppProfile { is_app_running: false, is_profile_in_use: false, ..self.clone() }
    }
}




/// Everything guarded by the store lock .. the profiles and the activation history move together
# [ derive (Debug, Default) ]
pub struct StoreState {
    pub(crate) profiles : Vec <AppProfile>,
    pub(crate) history  : ActivationHistory,
}

impl StoreState {

    pub fn new (profiles:Vec<AppProfile>) -> StoreState {
        StoreState { profiles, history: ActivationHistory::new() }
    }

    pub fn profiles (&self) -> &[AppProfile] { &self.profiles }

    pub fn history (&self) -> &ActivationHistory { &self.history }

    pub fn find_idx (&self, name:&str) -> Option<usize> {
        self.profiles .iter() .position (|p| p.matches(name))
    }
    pub fn find (&self, name:&str) -> Option<&AppProfile> {
        self.find_idx(name) .map (|i| &self.profiles[i])
    }
    pub fn in_use_idx (&self) -> Option<usize> {
        self.profiles .iter() .position (|p| p.is_profile_in_use)
    }
    pub fn in_use (&self) -> Option<&AppProfile> {
        self.in_use_idx() .map (|i| &self.profiles[i])
    }
}




# [ derive ( ) ]
pub struct _ProfileStore {
    state   : Mutex <StoreState>,
    persist : Arc <dyn ProfilePersistence>,
    procs   : Arc <dyn ProcessSource>,
}

/// The single shared home of all profiles .. every read and write goes through its one lock,
/// and every mutation is written through to persistence
# [ derive (Clone) ]
pub struct ProfileStore ( Arc <_ProfileStore> );

impl Deref for ProfileStore {
    type Target = _ProfileStore;
    fn deref (&self) -> &Self::Target { &self.0 }
}


impl ProfileStore {

    pub fn new (persist: Arc<dyn ProfilePersistence>, procs: Arc<dyn ProcessSource>) -> ProfileStore {
        ProfileStore ( Arc::new ( _ProfileStore {
            state : Mutex::new (StoreState::default()),
            persist,
            procs,
        } ) )
    }

    fn lock (&self) -> MutexGuard<'_, StoreState> {
        // a panic while holding the lock cant leave the profile list half-written in any way we care about, so we just carry on
        self.state.lock() .unwrap_or_else (|e| e.into_inner())
    }

    fn persist_save (&self, p:&AppProfile) {
        if let Err(e) = self.persist.save_profile (p) {
            warn! ("failed to persist profile {:?} : {}", p.app_name, e);
        }
    }
    fn persist_delete (&self, name:&str) {
        if let Err(e) = self.persist.delete_profile (name) {
            warn! ("failed to delete persisted profile {:?} : {}", name, e);
        }
    }


    /// Replaces in-memory contents w whatever persistence has .. derived flags and history start fresh
    pub fn reload (&self) -> usize {
        let mut loaded = match self.persist.load_profiles() {
            Ok (profiles) => profiles,
            Err (e) => {
                warn! ("failed to load profiles, starting empty : {}", e);
                vec![]
            }
        };
        // drop case-insensitive dupes (keeping the first), in case the file was hand edited
        let mut uniq : Vec<AppProfile> = Vec::with_capacity (loaded.len());
        loaded .drain(..) .for_each (|p| {
            if uniq.iter().any (|u| u.matches(&p.app_name)) {
                warn! ("ignoring duplicate persisted profile {:?}", p.app_name);
            } else {
                uniq.push (p.without_derived());
            }
        } );
        let n = uniq.len();
        *self.lock() = StoreState::new (uniq);
        info! ("loaded {} app profiles", n);
        n
    }


    /// Adds a profile for `name`, or overwrites color and lock-key toggle of the existing one .. returns true if it was new
    pub fn upsert (&self, name:&str, color:Rgb, lock_keys_enabled:bool) -> bool {
        let name = name.trim();
        if name.is_empty() { return false }
        // enumeration can be slowish, so we take the snapshot before grabbing the lock
        let is_running = self.procs.snapshot().contains (name);
        let mut st = self.lock();
        let (is_new, saved) = match st.find_idx (name) {
            Some(i) => {
                let p = &mut st.profiles[i];
                p.app_color = color;
                p.lock_keys_enabled = lock_keys_enabled;
                p.is_app_running = is_running;
                (false, p.clone())
            }
            None => {
                let mut p = AppProfile::new (name);
                p.app_color = color;
                p.lock_keys_enabled = lock_keys_enabled;
                p.is_app_running = is_running;
                st.profiles.push (p.clone());
                (true, p)
            }
        };
        self.persist_save (&saved);
        debug! ("upserted profile {:?} (new: {})", saved.app_name, is_new);
        is_new
    }

    /// Puts in a fully specified profile (e.g. from import), keeping the stored spelling of the name if one exists
    pub fn upsert_full (&self, profile:&AppProfile) -> bool {
        if profile.app_name.trim().is_empty() { return false }
        let is_running = self.procs.snapshot().contains (&profile.app_name);
        let mut st = self.lock();
        let (is_new, saved) = match st.find_idx (&profile.app_name) {
            Some(i) => {
                let p = &mut st.profiles[i];
                let (name, in_use) = (p.app_name.clone(), p.is_profile_in_use);
                *p = AppProfile { app_name: name, is_app_running: is_running, is_profile_in_use: in_use, ..profile.clone() };
                (false, p.clone())
            }
            None => {
                let p = AppProfile { is_app_running: is_running, is_profile_in_use: false, ..profile.clone() };
                st.profiles.push (p.clone());
                (true, p)
            }
        };
        self.persist_save (&saved);
        is_new
    }

    pub fn remove (&self, name:&str) -> bool {
        let mut st = self.lock();
        let removed = st.find_idx (name) .map (|i| st.profiles.remove(i));
        if let Some(p) = removed.as_ref() {
            self.persist_delete (&p.app_name);
            info! ("removed profile {:?}", p.app_name);
        }
        removed.is_some()
    }

    pub fn find (&self, name:&str) -> Option<AppProfile> {
        self.lock().find(name).cloned()
    }

    pub fn snapshot_all (&self) -> Vec<AppProfile> {
        self.lock().profiles.clone()
    }

    pub fn len (&self) -> usize { self.lock().profiles.len() }

    pub fn is_empty (&self) -> bool { self.len() == 0 }


    /// Generic single-profile mutation + write-through .. unknown names are a no-op (returns false)
    fn update_profile (&self, name:&str, f: impl FnOnce(&mut AppProfile)) -> bool {
        let mut st = self.lock();
        let Some(i) = st.find_idx (name) else {
            debug! ("ignoring update for unknown profile {:?}", name);
            return false
        };
        f (&mut st.profiles[i]);
        let saved = st.profiles[i].clone();
        self.persist_save (&saved);
        true
    }

    pub fn set_color_property (&self, name:&str, kind:ColorKind, color:Rgb) -> bool {
        self.update_profile (name, |p| p.set_color (kind, color))
    }
    pub fn set_lock_keys_enabled (&self, name:&str, enabled:bool) -> bool {
        self.update_profile (name, |p| p.lock_keys_enabled = enabled)
    }
    pub fn set_key_list (&self, name:&str, kind:KeyListKind, keys:&[LogiKey]) -> bool {
        self.update_profile (name, |p| p.set_keys (kind, keys))
    }
    pub fn set_highlight_keys (&self, name:&str, keys:&[LogiKey]) -> bool {
        self.set_key_list (name, KeyListKind::Highlight, keys)
    }
    pub fn set_action_keys (&self, name:&str, keys:&[LogiKey]) -> bool {
        self.set_key_list (name, KeyListKind::Action, keys)
    }


    pub fn in_use (&self) -> Option<AppProfile> {
        self.lock().in_use().cloned()
    }
    pub fn in_use_name (&self) -> Option<String> {
        self.lock().in_use() .map (|p| p.app_name.clone())
    }

    /// One full resolution cycle (running flags, in-use decision, history) under the store lock
    pub fn resolve (&self, snap:&ProcSnapshot) -> Resolution {
        engine::resolve (&mut self.lock(), snap)
    }

    /// Manual switch to a running profile .. None if the profile is unknown or its app isnt running
    pub fn activate (&self, name:&str) -> Option<Resolution> {
        engine::activate (&mut self.lock(), name)
    }
}




#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::TomlProfilesFile;
    use crate::procs::ManualProcessSource;

    fn store_in (dir:&tempfile::TempDir, running:&[&str]) -> (ProfileStore, Arc<TomlProfilesFile>) {
        let persist = Arc::new (TomlProfilesFile::new (dir.path().join("profiles.toml")));
        let procs = Arc::new (ManualProcessSource::with_running (running.iter()));
        (ProfileStore::new (persist.clone(), procs), persist)
    }

    #[test]
    fn rgb_percent_conversion () {
        assert_eq! (Rgb::new (255, 0, 128).to_percent(), (100, 0, 50));
        assert_eq! (Rgb::from_slice (&[1, 2, 3]), Some(Rgb::new (1, 2, 3)));
        assert_eq! (Rgb::from_slice (&[1, 2, 300]), None);
        assert_eq! (Rgb::from_slice (&[1, 2]), None);
    }

    #[test]
    fn new_profiles_get_defaults () {
        let p = AppProfile::new (" notepad.exe ");
        assert_eq! (p.app_name, "notepad.exe");
        assert_eq! (p.app_color, Rgb::new (0, 255, 255));
        assert_eq! (p.highlight_color, Rgb::new (255, 255, 255));
        assert_eq! (p.action_color, Rgb::new (255, 255, 0));
        assert! (p.lock_keys_enabled);
        assert! (p.highlight_keys.is_empty() && p.action_keys.is_empty());
    }

    #[test]
    fn upsert_then_snapshot_round_trips () {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in (&dir, &[]);
        assert! (store.upsert ("code.exe", Rgb::GREEN, false));
        let all = store.snapshot_all();
        assert_eq! (all.len(), 1);
        let mut expected = AppProfile::new ("code.exe");
        expected.app_color = Rgb::GREEN;
        expected.lock_keys_enabled = false;
        assert_eq! (all[0].without_derived(), expected);
    }

    #[test]
    fn upsert_matches_existing_names_case_insensitively () {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in (&dir, &["notepad.exe"]);
        assert! (store.upsert ("Notepad.EXE", Rgb::CYAN, true));
        assert! (!store.upsert ("NOTEPAD.exe", Rgb::RED, false));
        let all = store.snapshot_all();
        assert_eq! (all.len(), 1);
        assert_eq! (all[0].app_name, "Notepad.EXE");
        assert_eq! (all[0].app_color, Rgb::RED);
        assert! (!all[0].lock_keys_enabled);
        assert! (all[0].is_app_running);
    }

    #[test]
    fn mutations_write_through_to_persistence () {
        let dir = tempfile::tempdir().unwrap();
        let (store, persist) = store_in (&dir, &[]);
        store.upsert ("a.exe", Rgb::CYAN, true);
        store.upsert ("b.exe", Rgb::CYAN, true);
        store.set_color_property ("A.exe", ColorKind::Highlight, Rgb::RED);
        store.set_highlight_keys ("a.exe", &[LogiKey::F1, LogiKey::ESC, LogiKey::F1]);
        store.set_lock_keys_enabled ("a.exe", false);
        store.remove ("B.EXE");

        let on_disk = persist.load_profiles().unwrap();
        assert_eq! (on_disk.len(), 1);
        assert_eq! (on_disk[0].app_name, "a.exe");
        assert_eq! (on_disk[0].highlight_color, Rgb::RED);
        assert_eq! (on_disk[0].highlight_keys, vec![LogiKey::F1, LogiKey::ESC]);
        assert! (!on_disk[0].lock_keys_enabled);
    }

    #[test]
    fn unknown_names_are_no_ops () {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in (&dir, &[]);
        assert! (!store.remove ("ghost.exe"));
        assert! (!store.set_color_property ("ghost.exe", ColorKind::App, Rgb::RED));
        assert! (!store.set_action_keys ("ghost.exe", &[LogiKey::A]));
        assert! (store.find ("ghost.exe").is_none());
        assert! (store.is_empty());
    }

    #[test]
    fn reload_drops_duplicates_and_derived_state () {
        let dir = tempfile::tempdir().unwrap();
        let (store, persist) = store_in (&dir, &[]);
        let mut p = AppProfile::new ("x.exe");
        p.is_profile_in_use = true;
        persist.save_profile (&p).unwrap();
        persist.save_profile (&AppProfile::new ("X.EXE")).unwrap();
        assert_eq! (store.reload(), 1);
        assert! (store.in_use().is_none());
        assert_eq! (store.find ("x.exe").map (|p| p.app_name), Some("x.exe".to_string()));
    }

    #[test]
    fn upsert_full_keeps_stored_name_and_in_use_flag () {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in (&dir, &["game.exe"]);
        store.upsert ("Game.exe", Rgb::CYAN, true);
        store.resolve (&["game.exe"].into_iter().collect());
        let mut imported = AppProfile::new ("GAME.EXE");
        imported.app_color = Rgb::RED;
        imported.action_keys = vec![LogiKey::W, LogiKey::A];
        assert! (!store.upsert_full (&imported));
        let p = store.find ("game.exe").unwrap();
        assert_eq! (p.app_name, "Game.exe");
        assert_eq! (p.app_color, Rgb::RED);
        assert_eq! (p.action_keys, vec![LogiKey::W, LogiKey::A]);
        assert! (p.is_profile_in_use);
    }
}
