use std::collections::{BTreeMap, HashSet};

pub type FunctionId = u64;

/// Focus target when nothing at or below the stale focus survives a refresh.
pub const FALLBACK_FOCUS: FunctionId = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionCatalog {
    entries: BTreeMap<FunctionId, String>,
}

impl FunctionCatalog {
    pub fn get(&self, id: FunctionId) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    pub fn contains(&self, id: FunctionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, &str)> {
        self.entries.iter().map(|(id, name)| (*id, name.as_str()))
    }

    /// Greatest id in the catalog that is `<= bound`.
    pub fn greatest_at_most(&self, bound: FunctionId) -> Option<FunctionId> {
        self.entries.range(..=bound).next_back().map(|(id, _)| *id)
    }
}

impl FromIterator<(FunctionId, String)> for FunctionCatalog {
    fn from_iter<I: IntoIterator<Item = (FunctionId, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A parsed `lfa` body: the new catalog plus ids in the order the service listed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionListing {
    catalog: FunctionCatalog,
    order: Vec<FunctionId>,
    rejected: Vec<String>,
}

impl FunctionListing {
    pub fn catalog(&self) -> &FunctionCatalog {
        &self.catalog
    }

    pub fn into_catalog(self) -> FunctionCatalog {
        self.catalog
    }

    pub fn order(&self) -> &[FunctionId] {
        &self.order
    }

    /// Non-empty lines whose leading token is not an integer id.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }
}

/// Parses newline-delimited `<id> <name>` records. Returns `None` for a blank body.
pub fn parse_listing(body: &str) -> Option<FunctionListing> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut entries = BTreeMap::new();
    let mut order = Vec::new();
    let mut rejected = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (id_token, name) = match line.split_once(char::is_whitespace) {
            Some((id_token, rest)) => (id_token, rest.trim()),
            None => (line, ""),
        };
        match id_token.parse::<FunctionId>() {
            Ok(id) => {
                entries.insert(id, name.to_string());
                order.push(id);
            }
            Err(_) => rejected.push(line.to_string()),
        }
    }

    Some(FunctionListing {
        catalog: FunctionCatalog { entries },
        order,
        rejected,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    /// First id in listing order that the previous catalog did not have.
    NewFunction(FunctionId),
    /// The focused id vanished; moved to the nearest surviving id at or below it.
    StaleFocus(FunctionId),
}

impl FocusChange {
    pub fn target(self) -> FunctionId {
        match self {
            FocusChange::NewFunction(id) | FocusChange::StaleFocus(id) => id,
        }
    }
}

/// Decides where focus goes after a catalog refresh. `None` keeps the current focus.
pub fn select_focus(
    previous: &FunctionCatalog,
    listing: &FunctionListing,
    focus: FunctionId,
) -> Option<FocusChange> {
    let mut seen = HashSet::new();
    let newcomer = listing
        .order
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .find(|id| !previous.contains(*id));
    if let Some(id) = newcomer {
        return Some(FocusChange::NewFunction(id));
    }

    if listing.catalog.contains(focus) {
        return None;
    }
    let target = listing
        .catalog
        .greatest_at_most(focus)
        .unwrap_or(FALLBACK_FOCUS);
    Some(FocusChange::StaleFocus(target))
}
