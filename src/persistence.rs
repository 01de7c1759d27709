//! Load/save of profiles and global lighting settings.
//!
//! The on-disk form is a toml doc edited in place w `toml_edit` (so hand edits and comments survive),
//! holding a `[globals]` table and one `[[profile]]` table per app, in store order.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use thiserror::Error;
use toml_edit::{value, Array, ArrayOfTables, DocumentMut, Item, Table};
use tracing::{debug, warn};

use crate::history::names_match;
use crate::keys::LogiKey;
use crate::profiles::{AppProfile, GlobalColorKind, GlobalColors, Rgb};




#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml_edit::TomlError,
    },

    #[error("unexpected content in '{path}': {details}")]
    Format { path: String, details: String },
}

pub type PersistResult<T> = Result<T, PersistError>;



/// What the profile store and app state need from the backing storage
pub trait ProfilePersistence : Send + Sync {
    fn load_profiles (&self) -> PersistResult <Vec<AppProfile>>;
    fn save_profile (&self, profile:&AppProfile) -> PersistResult<()>;
    fn delete_profile (&self, name:&str) -> PersistResult<()>;

    fn load_global_colors (&self) -> GlobalColors;
    fn save_global_color (&self, kind:GlobalColorKind, color:Rgb) -> PersistResult<()>;

    fn load_start_minimized (&self) -> bool;
    fn save_start_minimized (&self, start_minimized:bool) -> PersistResult<()>;
}




const GLOBALS_TABLE   : &str = "globals";
const PROFILES_ARRAY  : &str = "profile";
const START_MINIMIZED : &str = "start_minimized";

fn global_color_key (kind:GlobalColorKind) -> &'static str {
    match kind {
        GlobalColorKind::Default    => "default_color",
        GlobalColorKind::NumLock    => "num_lock_color",
        GlobalColorKind::CapsLock   => "caps_lock_color",
        GlobalColorKind::ScrollLock => "scroll_lock_color",
    }
}


fn rgb_item (c:Rgb) -> Item {
    let mut arr = Array::new();
    c.to_array() .iter() .for_each (|v| arr.push (*v as i64));
    value (arr)
}
fn read_rgb (item:Option<&Item>) -> Option<Rgb> {
    let vals = item?.as_array()? .iter() .map (|v| v.as_integer()) .collect::<Option<Vec<i64>>>()?;
    Rgb::from_slice (&vals)
}
fn keys_item (keys:&[LogiKey]) -> Item {
    let mut arr = Array::new();
    keys .iter() .for_each (|k| arr.push (k.name()));
    value (arr)
}
fn read_keys (item:Option<&Item>, owner:&str) -> Vec<LogiKey> {
    let Some(arr) = item.and_then (|i| i.as_array()) else { return vec![] };
    let mut keys : Vec<LogiKey> = vec![];
    arr .iter() .filter_map (|v| v.as_str()) .for_each (|s| match LogiKey::from_name(s) {
        Some(k) => if !keys.contains(&k) { keys.push(k) },
        None    => warn! ("profile {:?}: skipping unknown key name {:?}", owner, s),
    } );
    keys
}


/// on-disk names match the same way app names do everywhere else (case-insensitively)
fn table_is_named (t:&Table, name:&str) -> bool {
    t.get("name") .and_then (|v| v.as_str()) .is_some_and (|n| names_match (n.trim(), name.trim()))
}

/// Writes the persisted (non-derived) fields of a profile into a table
fn write_profile_fields (t:&mut Table, p:&AppProfile) {
    t ["name"]              = value (p.app_name.as_str());
    t ["app_color"]         = rgb_item (p.app_color);
    t ["highlight_color"]   = rgb_item (p.highlight_color);
    t ["action_color"]      = rgb_item (p.action_color);
    t ["lock_keys_enabled"] = value (p.lock_keys_enabled);
    t ["highlight_keys"]    = keys_item (&p.highlight_keys);
    t ["action_keys"]       = keys_item (&p.action_keys);
}

/// Reads a profile out of a table .. missing fields get profile defaults, a missing/blank name is a None
fn read_profile_fields (t:&Table) -> Option<AppProfile> {
    let name = t.get("name") .and_then (|v| v.as_str()) .map (|s| s.trim()) .filter (|s| !s.is_empty())?;
    let mut p = AppProfile::new (name);
    let color = |key:&str, dflt:Rgb| {
        let item = t.get(key);
        read_rgb (item) .unwrap_or_else (|| {
            if item.is_some() { warn! ("profile {:?}: malformed {}, using default", name, key) }
            dflt
        } )
    };
    p.app_color         = color ("app_color",       AppProfile::DEFAULT_APP_COLOR);
    p.highlight_color   = color ("highlight_color", AppProfile::DEFAULT_HIGHLIGHT_COLOR);
    p.action_color      = color ("action_color",    AppProfile::DEFAULT_ACTION_COLOR);
    p.lock_keys_enabled = t.get("lock_keys_enabled") .and_then (|v| v.as_bool()) .unwrap_or(true);
    p.highlight_keys    = read_keys (t.get("highlight_keys"), name);
    p.action_keys       = read_keys (t.get("action_keys"), name);
    Some(p)
}


fn read_doc (path:&Path) -> PersistResult<DocumentMut> {
    let txt = match fs::read_to_string (path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err ( PersistError::Io { path: path.display().to_string(), source: e } ),
    };
    DocumentMut::from_str (&txt) .map_err (|e| PersistError::Parse { path: path.display().to_string(), source: e })
}
fn write_doc (path:&Path, doc:&DocumentMut) -> PersistResult<()> {
    if let Some(dir) = path.parent() .filter (|d| !d.as_os_str().is_empty() && !d.exists()) {
        fs::create_dir_all (dir) .map_err (|e| PersistError::Io { path: dir.display().to_string(), source: e })?;
    }
    fs::write (path, doc.to_string()) .map_err (|e| PersistError::Io { path: path.display().to_string(), source: e })
}




/// Profiles + globals kept in a single toml file .. each save rewrites the file right away
# [ derive (Debug) ]
pub struct TomlProfilesFile {
    path : PathBuf,
    doc  : Mutex <Option <DocumentMut>>,    // lazily loaded, then kept as the working copy
}

impl TomlProfilesFile {

    pub fn new (path:impl Into<PathBuf>) -> TomlProfilesFile {
        TomlProfilesFile { path: path.into(), doc: Mutex::new (None) }
    }

    pub fn path (&self) -> &Path { &self.path }

    /// Runs `f` on the (loaded-if-needed) doc, optionally writing back afterwards
    fn with_doc<R> (&self, write_back:bool, f: impl FnOnce(&mut DocumentMut) -> R) -> PersistResult<R> {
        let mut guard = self.doc.lock() .unwrap_or_else (|e| e.into_inner());
        if guard.is_none() {
            *guard = Some ( read_doc (&self.path)? );
        }
        let Some(doc) = guard.as_mut() else {
            return Err ( PersistError::Format { path: self.path.display().to_string(), details: "document not loaded".into() } )
        };
        let res = f (doc);
        if write_back { write_doc (&self.path, doc)? }
        Ok(res)
    }

    fn profiles_array (doc:&mut DocumentMut) -> Option<&mut ArrayOfTables> {
        if doc.get(PROFILES_ARRAY).is_none() {
            doc [PROFILES_ARRAY] = Item::ArrayOfTables (ArrayOfTables::new());
        }
        doc [PROFILES_ARRAY] .as_array_of_tables_mut()
    }

    fn globals_table (doc:&mut DocumentMut) -> Option<&mut Table> {
        if doc.get(GLOBALS_TABLE).is_none() {
            doc [GLOBALS_TABLE] = Item::Table (Table::new());
        }
        doc [GLOBALS_TABLE] .as_table_mut()
    }

    fn format_err (&self, details:&str) -> PersistError {
        PersistError::Format { path: self.path.display().to_string(), details: details.to_string() }
    }
}


impl ProfilePersistence for TomlProfilesFile {

    fn load_profiles (&self) -> PersistResult <Vec<AppProfile>> {
        // always re-read from disk on an explicit load, so external edits get picked up
        let doc = read_doc (&self.path)?;
        let profiles = doc.get(PROFILES_ARRAY) .and_then (|i| i.as_array_of_tables())
            .map (|arr| arr.iter() .filter_map (|t| {
                let p = read_profile_fields(t);
                if p.is_none() { warn! ("skipping persisted profile w/o a name") }
                p
            } ) .collect::<Vec<_>>() )
            .unwrap_or_default();
        *self.doc.lock() .unwrap_or_else (|e| e.into_inner()) = Some(doc);
        debug! ("read {} profiles from {:?}", profiles.len(), self.path);
        Ok(profiles)
    }

    fn save_profile (&self, profile:&AppProfile) -> PersistResult<()> {
        let ok = self.with_doc (true, |doc| {
            let Some(arr) = Self::profiles_array(doc) else { return false };
            // case-variant dupes (e.g. from hand edits) collapse into the first entry for this app
            let mut seen = false;
            arr.retain (|t| {
                if !table_is_named (t, &profile.app_name) { return true }
                let keep = !seen;
                seen = true;
                keep
            } );
            let existing = arr.iter_mut() .find (|t| table_is_named (t, &profile.app_name));
            match existing {
                Some(t) => write_profile_fields (t, profile),
                None => {
                    let mut t = Table::new();
                    write_profile_fields (&mut t, profile);
                    arr.push (t);
                }
            }
            true
        } )?;
        if ok { Ok(()) } else { Err ( self.format_err ("'profile' is not an array of tables") ) }
    }

    fn delete_profile (&self, name:&str) -> PersistResult<()> {
        self.with_doc (true, |doc| {
            if let Some(arr) = doc.get_mut(PROFILES_ARRAY) .and_then (|i| i.as_array_of_tables_mut()) {
                arr.retain (|t| !table_is_named (t, name));
            }
        } )
    }

    fn load_global_colors (&self) -> GlobalColors {
        let mut gc = GlobalColors::default();
        let _ = self.with_doc (false, |doc| {
            if let Some(t) = doc.get(GLOBALS_TABLE) .and_then (|i| i.as_table()) {
                GlobalColorKind::ALL .into_iter() .for_each (|kind| {
                    if let Some(c) = read_rgb (t.get (global_color_key(kind))) { gc.set (kind, c) }
                } );
            }
        } ) .map_err (|e| warn! ("failed reading global colors, using defaults : {}", e));
        gc
    }

    fn save_global_color (&self, kind:GlobalColorKind, color:Rgb) -> PersistResult<()> {
        let ok = self.with_doc (true, |doc| {
            Self::globals_table(doc) .map (|t| t [global_color_key(kind)] = rgb_item(color)) .is_some()
        } )?;
        if ok { Ok(()) } else { Err ( self.format_err ("'globals' is not a table") ) }
    }

    fn load_start_minimized (&self) -> bool {
        self.with_doc (false, |doc| {
            doc.get(GLOBALS_TABLE) .and_then (|t| t.get(START_MINIMIZED)) .and_then (|v| v.as_bool()) .unwrap_or(false)
        } ) .unwrap_or(false)
    }

    fn save_start_minimized (&self, start_minimized:bool) -> PersistResult<()> {
        let ok = self.with_doc (true, |doc| {
            Self::globals_table(doc) .map (|t| t [START_MINIMIZED] = value(start_minimized)) .is_some()
        } )?;
        if ok { Ok(()) } else { Err ( self.format_err ("'globals' is not a table") ) }
    }
}




/// version stamp for single-profile export files
pub const EXPORT_FORMAT_VERSION : i64 = 1;

/// Writes one profile as a standalone toml doc (a single `[profile]` table) for sharing/backup
pub fn export_profile (profile:&AppProfile, path:&Path) -> PersistResult<()> {
    let mut doc = DocumentMut::new();
    let mut t = Table::new();
    t ["format"] = value (EXPORT_FORMAT_VERSION);
    write_profile_fields (&mut t, profile);
    doc [PROFILES_ARRAY] = Item::Table (t);
    write_doc (path, &doc)
}

/// Reads a profile back from an export file
pub fn import_profile (path:&Path) -> PersistResult<AppProfile> {
    let fmt_err = |details:&str| PersistError::Format { path: path.display().to_string(), details: details.to_string() };
    if !path.exists() {
        return Err ( PersistError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new (std::io::ErrorKind::NotFound, "no such file"),
        } )
    }
    let doc = read_doc (path)?;
    let t = doc.get(PROFILES_ARRAY) .and_then (|i| i.as_table()) .ok_or_else (|| fmt_err ("missing [profile] table"))?;
    match t.get("format") .and_then (|v| v.as_integer()) {
        Some(v) if v > EXPORT_FORMAT_VERSION => return Err ( fmt_err (&format! ("unsupported format version {}", v)) ),
        _ => { }
    }
    read_profile_fields (t) .ok_or_else (|| fmt_err ("profile has no name"))
}




#[cfg(test)]
mod tests {
    use super::*;

    fn sample () -> AppProfile {
        let mut p = AppProfile::new ("chrome.exe");
        p.app_color = Rgb::new (10, 20, 30);
        p.lock_keys_enabled = false;
        p.highlight_keys = vec![LogiKey::ESC, LogiKey::F5];
        p.action_keys = vec![LogiKey::SPACE];
        p
    }

    #[test]
    fn missing_file_loads_empty_with_default_globals () {
        let dir = tempfile::tempdir().unwrap();
        let f = TomlProfilesFile::new (dir.path().join("nope.toml"));
        assert! (f.load_profiles().unwrap().is_empty());
        assert_eq! (f.load_global_colors(), GlobalColors::default());
        assert! (!f.load_start_minimized());
    }

    #[test]
    fn profiles_survive_a_fresh_reader_in_order () {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        let f = TomlProfilesFile::new (&path);
        f.save_profile (&sample()).unwrap();
        f.save_profile (&AppProfile::new ("code.exe")).unwrap();
        let mut updated = sample();
        updated.highlight_color = Rgb::RED;
        f.save_profile (&updated).unwrap();

        let loaded = TomlProfilesFile::new (&path).load_profiles().unwrap();
        assert_eq! (loaded.iter().map(|p| p.app_name.as_str()).collect::<Vec<_>>(), vec!["chrome.exe", "code.exe"]);
        assert_eq! (loaded[0], updated);
    }

    #[test]
    fn delete_removes_every_case_variant () {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        fs::write (&path, "[[profile]]\nname = \"x.exe\"\n\n[[profile]]\nname = \"b.exe\"\n\n[[profile]]\nname = \"X.EXE\"\n").unwrap();
        let f = TomlProfilesFile::new (&path);
        assert_eq! (f.load_profiles().unwrap().len(), 3);
        f.delete_profile ("x.exe").unwrap();
        let left = f.load_profiles().unwrap();
        assert_eq! (left.len(), 1);
        assert_eq! (left[0].app_name, "b.exe");
    }

    #[test]
    fn save_folds_case_variant_dupes_into_one_entry () {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        fs::write (&path, "[[profile]]\nname = \"x.exe\"\n\n[[profile]]\nname = \"X.EXE\"\n").unwrap();
        let f = TomlProfilesFile::new (&path);
        let mut p = AppProfile::new ("x.exe");
        p.app_color = Rgb::GREEN;
        f.save_profile (&p).unwrap();
        let got = f.load_profiles().unwrap();
        assert_eq! (got.len(), 1);
        assert_eq! (got[0].app_color, Rgb::GREEN);
    }

    #[test]
    fn globals_round_trip () {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        let f = TomlProfilesFile::new (&path);
        f.save_global_color (GlobalColorKind::CapsLock, Rgb::GREEN).unwrap();
        f.save_start_minimized (true).unwrap();
        let g = TomlProfilesFile::new (&path);
        let gc = g.load_global_colors();
        assert_eq! (gc.caps_lock_color, Rgb::GREEN);
        assert_eq! (gc.default_color, GlobalColors::default().default_color);
        assert! (g.load_start_minimized());
    }

    #[test]
    fn hand_edited_junk_is_skipped () {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        fs::write (&path, r#"
# my profiles
[[profile]]
name = "game.exe"
app_color = [1, 2, 999]
highlight_keys = ["w", "A", "bogus", "W"]

[[profile]]
app_color = [1, 2, 3]
"#).unwrap();
        let loaded = TomlProfilesFile::new (&path).load_profiles().unwrap();
        assert_eq! (loaded.len(), 1);
        assert_eq! (loaded[0].app_color, AppProfile::DEFAULT_APP_COLOR);
        assert_eq! (loaded[0].highlight_keys, vec![LogiKey::W, LogiKey::A]);
        assert! (loaded[0].lock_keys_enabled);
    }

    #[test]
    fn saving_keeps_comments () {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        fs::write (&path, "# keep me\n[globals]\nstart_minimized = false\n").unwrap();
        let f = TomlProfilesFile::new (&path);
        f.save_profile (&sample()).unwrap();
        let txt = fs::read_to_string (&path).unwrap();
        assert! (txt.contains ("# keep me"));
        assert! (txt.contains ("[[profile]]"));
    }

    #[test]
    fn unparseable_file_is_an_error () {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        fs::write (&path, "this is = = not toml").unwrap();
        assert! (matches! (TomlProfilesFile::new(&path).load_profiles(), Err(PersistError::Parse{..})));
    }

    #[test]
    fn export_then_import () {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("chrome.profile.toml");
        export_profile (&sample(), &path).unwrap();
        assert_eq! (import_profile (&path).unwrap(), sample());
    }

    #[test]
    fn import_rejects_bad_files () {
        let dir = tempfile::tempdir().unwrap();
        assert! (matches! (import_profile (&dir.path().join("missing.toml")), Err(PersistError::Io{..})));

        let path = dir.path().join("future.toml");
        fs::write (&path, "[profile]\nformat = 99\nname = \"x.exe\"\n").unwrap();
        assert! (matches! (import_profile (&path), Err(PersistError::Format{..})));

        let path = dir.path().join("nameless.toml");
        fs::write (&path, "[profile]\nformat = 1\n").unwrap();
        assert! (matches! (import_profile (&path), Err(PersistError::Format{..})));
    }
}
