use std::collections::HashSet;

use crate::model::Alternative;

/// Capped, best-first, identity-unique list of alternatives.
///
/// Sources are pushed in priority order; an entry whose identity key is
/// already present is dropped no matter where it came from.
#[derive(Debug)]
pub struct Assembler {
    max: usize,
    keys: HashSet<String>,
    items: Vec<Alternative>,
}

impl Assembler {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            keys: HashSet::new(),
            items: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max
    }

    pub fn remaining(&self) -> usize {
        self.max.saturating_sub(self.items.len())
    }

    /// Returns `true` when the alternative was kept.
    pub fn push(&mut self, alternative: Alternative) -> bool {
        if self.is_full() || self.keys.contains(alternative.identity_key()) {
            return false;
        }
        self.keys.insert(alternative.identity_key().to_string());
        self.items.push(alternative);
        true
    }

    /// Appends a whole source list, keeping its order. Returns how many were kept.
    pub fn extend(&mut self, alternatives: impl IntoIterator<Item = Alternative>) -> usize {
        let mut kept = 0;
        for alternative in alternatives {
            if self.push(alternative) {
                kept += 1;
            }
        }
        kept
    }

    pub fn finish(self) -> Vec<Alternative> {
        self.items
    }
}

/// One-shot merge of several best-first lists.
pub fn assemble(lists: Vec<Vec<Alternative>>, max: usize) -> Vec<Alternative> {
    let mut assembler = Assembler::new(max);
    for list in lists {
        if assembler.is_full() {
            break;
        }
        assembler.extend(list);
    }
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlternativeOrigin, EcoBucket};

    fn alt(name: &str, link: Option<&str>, source: AlternativeOrigin) -> Alternative {
        Alternative {
            name: name.to_string(),
            link: link.map(str::to_string),
            score: 5,
            score_label: EcoBucket::High,
            materials: "glass".to_string(),
            recyclability: None,
            recycled_percentage: None,
            biodegradability: None,
            is_renewed: false,
            source,
        }
    }

    #[test]
    fn merge_dedups_and_caps_in_order() {
        let live = vec![
            alt("Bottle A", Some("https://s/dp/A"), AlternativeOrigin::Live),
            alt("Bottle A copy", Some("https://s/dp/A"), AlternativeOrigin::Live),
            alt("Bottle B", Some("https://s/dp/B"), AlternativeOrigin::Live),
        ];
        let catalog = vec![
            alt("Glass Bottle", None, AlternativeOrigin::Catalog),
            alt("Glass Bottle", None, AlternativeOrigin::Catalog),
            alt("Steel Bottle", None, AlternativeOrigin::Catalog),
            alt("Hemp Bag", None, AlternativeOrigin::Catalog),
        ];
        let merged = assemble(vec![live, catalog], 4);
        let keys: Vec<&str> = merged.iter().map(|a| a.identity_key()).collect();
        assert_eq!(keys, vec!["https://s/dp/A", "https://s/dp/B", "Glass Bottle", "Steel Bottle"]);
    }

    #[test]
    fn remaining_tracks_capacity() {
        let mut assembler = Assembler::new(2);
        assert_eq!(assembler.remaining(), 2);
        assert!(assembler.push(alt("X", None, AlternativeOrigin::Catalog)));
        assert!(!assembler.push(alt("X", None, AlternativeOrigin::Catalog)));
        assert_eq!(assembler.remaining(), 1);
        assert_eq!(assembler.extend(vec![alt("Y", None, AlternativeOrigin::Catalog), alt("Z", None, AlternativeOrigin::Catalog)]), 1);
        assert!(assembler.is_full());
        assert!(assemble(vec![], 3).is_empty());
    }
}
