use std::collections::VecDeque;



/// Bounded recency list of app names that have been the in-use profile .. most recent at the back
# [ derive (Debug, Default, Clone) ]
pub struct ActivationHistory {
    names : VecDeque <String>,
}

impl ActivationHistory {

    pub const MAX_LEN : usize = 10;

    pub fn new () -> ActivationHistory { ActivationHistory::default() }

    pub fn record_activation (&mut self, name:&str) {
        // dedupe first so a re-activation moves the name to the back instead of growing the list
        self.names.retain (|n| !names_match (n, name));
        self.names.push_back (name.to_string());
        while self.names.len() > Self::MAX_LEN {
            self.names.pop_front();
        }
    }

    /// Most recently activated name (other than `excluding`) for which `is_running` holds
    pub fn best_fallback (&self, excluding:Option<&str>, is_running: impl Fn(&str) -> bool) -> Option<String> {
        self.iter_recent_first()
            .filter (|n| excluding .map_or (true, |ex| !names_match (n, ex)))
            .find (|n| is_running(n))
            .map (|n| n.to_string())
    }

    pub fn clear (&mut self) { self.names.clear() }

    pub fn len (&self) -> usize { self.names.len() }

    pub fn is_empty (&self) -> bool { self.names.is_empty() }

    pub fn iter_recent_first (&self) -> impl Iterator<Item=&str> {
        self.names .iter() .rev() .map (|n| n.as_str())
    }
}


/// app names are process image names, matched case-insensitively everywhere
pub fn names_match (a:&str, b:&str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}
