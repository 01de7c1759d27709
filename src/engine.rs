//! Profile resolution .. decides which single profile (if any) the keyboard should be showing.
//!
//! These fns operate on the already-locked [`StoreState`], so a whole cycle (running flags, in-use pick, history update)
//! is atomic wrt the ui thread and the monitoring loop. The store wraps them as `ProfileStore::resolve` / `activate`.

use tracing::{debug, info, warn};

use crate::history::names_match;
use crate::profiles::{AppProfile, StoreState};
use crate::procs::ProcSnapshot;



/// Outcome of a resolution cycle
# [ derive (Debug, Clone, PartialEq, Eq) ]
pub struct Resolution {
    /// whether the in-use profile was set, switched, or cleared by this cycle
    pub changed  : bool,
    /// copy of the profile now in use (if any), safe to use after the store lock is released
    pub in_use   : Option <AppProfile>,
    /// name of the profile that was in use before the cycle
    pub previous : Option <String>,
}

impl Resolution {
    pub fn in_use_name (&self) -> Option<&str> {
        self.in_use .as_ref() .map (|p| p.app_name.as_str())
    }
}



/// clears any extra in-use flags beyond the first, returning the index of the one left (if any)
fn repair_in_use_flags (st:&mut StoreState) -> Option<usize> {
    let mut first : Option<usize> = None;
    for (i, p) in st.profiles.iter_mut().enumerate() {
        if !p.is_profile_in_use { continue }
        if first.is_none() { first = Some(i); continue }
        warn! ("clearing stray in-use flag on {:?}", p.app_name);
        p.is_profile_in_use = false;
    }
    first
}

fn set_in_use (st:&mut StoreState, idx:Option<usize>) {
    st.profiles .iter_mut() .enumerate() .for_each (|(i,p)| p.is_profile_in_use = Some(i) == idx);
}



/// One resolution cycle against a fresh snapshot of visible apps
pub fn resolve (st:&mut StoreState, snap:&ProcSnapshot) -> Resolution {

    let prev_idx = repair_in_use_flags (st);
    let previous = prev_idx .map (|i| st.profiles[i].app_name.clone());

    // 1. refresh running flags
    st.profiles .iter_mut() .for_each (|p| p.is_app_running = snap.contains (&p.app_name));

    // 2. stability .. a still-running in-use profile is never pre-empted by some other app starting up
    if let Some(i) = prev_idx {
        if st.profiles[i].is_app_running {
            return Resolution { changed: false, in_use: Some (st.profiles[i].clone()), previous }
        }
    }

    // 3. nothing in use, or the in-use app just went away .. pick from whats running
    let winner_idx = {
        let from_history = st.history .best_fallback ( previous.as_deref(), |n| {
            st.profiles .iter() .any (|p| p.is_app_running && p.matches(n))
        } );
        from_history
            .and_then (|n| st.find_idx (&n))
            .or_else  (|| st.profiles .iter() .position (|p| p.is_app_running))
        // ^^ w no usable history, first running profile in store (insertion) order wins
    };

    set_in_use (st, winner_idx);

    let in_use = winner_idx .map (|i| st.profiles[i].clone());
    if let Some(p) = in_use.as_ref() {
        st.history.record_activation (&p.app_name);
    }

    let changed = match (previous.as_deref(), in_use.as_ref()) {
        (None, None)        => false,
        (Some(a), Some(b))  => !names_match (a, &b.app_name),
        _                   => true,
    };
    if changed {
        info! ("in-use profile: {:?} -> {:?}", previous, in_use.as_ref().map(|p| &p.app_name));
    } else {
        debug! ("resolution cycle: no change (in use: {:?})", previous);
    }
    Resolution { changed, in_use, previous }
}



/// Manual switch .. makes a running profile the in-use one. None if unknown or not running.
pub fn activate (st:&mut StoreState, name:&str) -> Option<Resolution> {
    let idx = st.find_idx (name) .filter (|&i| st.profiles[i].is_app_running)?;
    let previous = repair_in_use_flags (st) .map (|i| st.profiles[i].app_name.clone());
    set_in_use (st, Some(idx));
    let app_name = st.profiles[idx].app_name.clone();
    st.history.record_activation (&app_name);
    let changed = previous .as_deref() .map_or (true, |p| !names_match (p, &app_name));
    if changed { info! ("manually switched in-use profile: {:?} -> {:?}", previous, app_name) }
    Some ( Resolution { changed, in_use: Some (st.profiles[idx].clone()), previous } )
}
