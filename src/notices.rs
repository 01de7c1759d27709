#![ allow (non_camel_case_types) ]

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use tracing::{debug, warn};

use crate::profiles::AppProfile;



/// Events pushed out to whatever ui front-end is attached
# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, AsRefStr, Serialize, Deserialize) ]
# [ serde (rename_all = "snake_case") ]
pub enum Backend_Event {
    updated_profiles,
    updated_in_use,
    backend_notice,
}
impl Backend_Event {
    pub fn str (&self) -> &str { self.as_ref() }
}


/// One-off notices (sent as the `msg` of a backend_notice event)
# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, AsRefStr, Serialize, Deserialize) ]
# [ serde (rename_all = "snake_case") ]
pub enum Backend_Notice {
    device_unavailable,
    profile_imported,
    import_failed,
}
impl Backend_Notice {
    pub fn str (&self) -> &str { self.as_ref() }
}



# [ derive (Debug, Eq, PartialEq, Clone, Serialize, Deserialize) ]
pub struct BackendNotice_Pl {
    pub msg    : String,
    pub detail : Option <String>,
}

# [ derive (Debug, Eq, PartialEq, Clone, Serialize, Deserialize) ]
pub struct Profiles_Pl {
    pub profiles : Vec <AppProfile>,
}

# [ derive (Debug, Eq, PartialEq, Clone, Serialize, Deserialize) ]
pub struct InUse_Pl {
    pub app_name : Option <String>,
}



/// Receiver of (event-name, json-payload) pairs .. this is the ui app-handle's emit in disguise
pub type NoticeSink = Arc < dyn Fn (&str, String) + Send + Sync + 'static >;


/// Forwards notices to the registered sink (if any), otherwise just logs them
# [ derive (Clone, Default) ]
pub struct Notifier {
    sink : Arc <RwLock <Option <NoticeSink>>>,
}

impl Notifier {

    pub fn new () -> Notifier { Notifier::default() }

    pub fn register_sink (&self, sink:NoticeSink) {
        *self.sink.write() .unwrap_or_else (|e| e.into_inner()) = Some(sink);
    }
    pub fn clear_sink (&self) {
        *self.sink.write() .unwrap_or_else (|e| e.into_inner()) = None;
    }

    fn emit<T: Serialize> (&self, ev:Backend_Event, pl:&T) {
        let pl = match serde_json::to_string (pl) {
            Ok(pl) => pl,
            Err(e) => { warn! ("{} payload serialization failed: {:?}", ev.str(), e); return }
        };
        // clone the sink out so a sink that calls back into us cant deadlock on the lock
        let sink = self.sink.read() .unwrap_or_else (|e| e.into_inner()) .clone();
        match sink {
            Some(sink) => sink (ev.str(), pl),
            None => debug! ("(no ui attached) {} : {}", ev.str(), pl),
        }
    }

    pub fn emit_profiles (&self, profiles:Vec<AppProfile>) {
        self.emit (Backend_Event::updated_profiles, &Profiles_Pl { profiles })
    }

    pub fn emit_in_use (&self, app_name:Option<String>) {
        self.emit (Backend_Event::updated_in_use, &InUse_Pl { app_name })
    }

    pub fn emit_backend_notice (&self, notice:Backend_Notice, detail:Option<String>) {
        self.emit (Backend_Event::backend_notice, &BackendNotice_Pl { msg: notice.str().to_string(), detail })
    }
}




#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capturing () -> (Notifier, Arc<Mutex<Vec<(String, String)>>>) {
        let got = Arc::new (Mutex::new (vec![]));
        let n = Notifier::new();
        let g = got.clone();
        n.register_sink (Arc::new (move |ev:&str, pl:String| g.lock().unwrap().push ((ev.to_string(), pl))));
        (n, got)
    }

    #[test]
    fn events_carry_snake_case_names_and_json () {
        let (n, got) = capturing();
        n.emit_in_use (Some("chrome.exe".into()));
        n.emit_in_use (None);
        n.emit_backend_notice (Backend_Notice::device_unavailable, None);
        let got = got.lock().unwrap();
        assert_eq! (got[0], ("updated_in_use".to_string(), r#"{"app_name":"chrome.exe"}"#.to_string()));
        assert_eq! (got[1].1, r#"{"app_name":null}"#);
        assert_eq! (got[2].0, "backend_notice");
        assert_eq! (got[2].1, r#"{"msg":"device_unavailable","detail":null}"#);
    }

    #[test]
    fn profiles_payload_lists_profiles () {
        let (n, got) = capturing();
        n.emit_profiles (vec![AppProfile::new ("a.exe")]);
        let got = got.lock().unwrap();
        assert_eq! (got[0].0, "updated_profiles");
        let pl : Profiles_Pl = serde_json::from_str (&got[0].1).unwrap();
        assert_eq! (pl.profiles[0].app_name, "a.exe");
    }

    #[test]
    fn without_a_sink_nothing_breaks () {
        let (n, got) = capturing();
        n.clear_sink();
        n.emit_profiles (vec![]);
        assert! (got.lock().unwrap().is_empty());
    }
}
