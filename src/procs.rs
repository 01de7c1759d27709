use std::collections::BTreeMap;
use std::sync::RwLock;



/// Set of app (process image) names seen w a qualifying visible window at one instant.
/// Lookups are case-insensitive, but the first-seen spelling is kept for display
# [ derive (Debug, Default, Clone, Eq, PartialEq) ]
pub struct ProcSnapshot {
    names : BTreeMap <String, String>,    // lowercased -> as reported
}

impl ProcSnapshot {

    pub fn new () -> ProcSnapshot { ProcSnapshot::default() }

    pub fn insert (&mut self, name:&str) {
        let name = name.trim();
        if name.is_empty() { return }
        self.names .entry (name.to_lowercase()) .or_insert_with (|| name.to_string());
    }

    pub fn contains (&self, name:&str) -> bool {
        self.names.contains_key (&name.trim().to_lowercase())
    }

    pub fn len (&self) -> usize { self.names.len() }

    pub fn is_empty (&self) -> bool { self.names.is_empty() }

    /// names as reported by the OS, sorted case-insensitively .. this is what the add-profile picker lists
    pub fn names_sorted (&self) -> Vec<String> {
        self.names.values().cloned().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ProcSnapshot {
    fn from_iter<I: IntoIterator<Item=S>> (iter:I) -> Self {
        let mut snap = ProcSnapshot::new();
        iter .into_iter() .for_each (|n| snap.insert (n.as_ref()));
        snap
    }
}



/// Anything that can list currently visible apps .. a pure query, failures show up as an empty snapshot
pub trait ProcessSource : Send + Sync {
    fn snapshot (&self) -> ProcSnapshot;
}



/// Process source w an externally set snapshot .. used for headless runs (no win32) and in tests
# [ derive (Debug, Default) ]
pub struct ManualProcessSource {
    snap : RwLock <ProcSnapshot>,
}

impl ManualProcessSource {
    pub fn new () -> ManualProcessSource { ManualProcessSource::default() }

    pub fn with_running<S: AsRef<str>> (names: impl IntoIterator<Item=S>) -> ManualProcessSource {
        let src = ManualProcessSource::new();
        src.set_running (names);
        src
    }

    pub fn set_running<S: AsRef<str>> (&self, names: impl IntoIterator<Item=S>) {
        let snap = names.into_iter().collect::<ProcSnapshot>();
        if let Ok(mut s) = self.snap.write() { *s = snap }
    }
}

impl ProcessSource for ManualProcessSource {
    fn snapshot (&self) -> ProcSnapshot {
        self.snap .read() .map (|s| s.clone()) .unwrap_or_default()
    }
}



/// The real thing: enumerates top-level windows via win32 and collects owning exe names
# [ cfg (windows) ]
# [ derive (Debug, Default) ]
pub struct OsProcessSource;

# [ cfg (windows) ]
impl ProcessSource for OsProcessSource {
    fn snapshot (&self) -> ProcSnapshot {
        crate::win_apis::get_visible_app_names() .into_iter() .collect()
    }
}


/// Last path component of an exe path (handles both separators), None if that ends up empty
pub fn exe_name_from_path (path:&str) -> Option<String> {
    let name = path .rsplit (|c| c == '\\' || c == '/') .next() .unwrap_or_default() .trim();
    if name.is_empty() { None } else { Some (name.to_string()) }
}




#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_lookups_are_case_insensitive () {
        let snap = ["Notepad.EXE", "code.exe"] .into_iter() .collect::<ProcSnapshot>();
        assert! (snap.contains ("notepad.exe"));
        assert! (snap.contains ("CODE.EXE"));
        assert! (!snap.contains ("chrome.exe"));
    }

    #[test]
    fn snapshot_dedupes_and_skips_blank_names () {
        let snap = ["a.exe", "A.exe", "  ", ""] .into_iter() .collect::<ProcSnapshot>();
        assert_eq! (snap.len(), 1);
        assert_eq! (snap.names_sorted(), vec!["a.exe".to_string()]);
    }

    #[test]
    fn manual_source_reports_what_was_set () {
        let src = ManualProcessSource::with_running (["chrome.exe"]);
        assert! (src.snapshot().contains ("chrome.exe"));
        src.set_running (Vec::<String>::new());
        assert! (src.snapshot().is_empty());
    }

    #[test]
    fn exe_names_from_paths () {
        assert_eq! (exe_name_from_path (r"C:\Windows\notepad.exe"), Some("notepad.exe".to_string()));
        assert_eq! (exe_name_from_path ("/usr/bin/code"), Some("code".to_string()));
        assert_eq! (exe_name_from_path (r"C:\dir\"), None);
    }
}
