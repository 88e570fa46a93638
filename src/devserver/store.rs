//! In-memory gig store behind the dev backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::gigs::{Assignment, GentState, Gig, GigPatch, GigSeed};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("email regex is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("gig not found")]
    GigNotFound,
    #[error("unknown gent id")]
    UnknownGent,
    #[error("invalid email")]
    InvalidEmail,
}

/// Gigs in creation order plus their gent assignments.
#[derive(Debug, Default)]
pub struct GigStore {
    gigs: Vec<Gig>,
    assignments: HashMap<String, BTreeSet<String>>,
    gents: Vec<String>,
}

impl GigStore {
    pub fn new(gents: Vec<String>) -> Self {
        Self {
            gigs: Vec::new(),
            assignments: HashMap::new(),
            gents,
        }
    }

    pub fn is_known_gent(&self, gent_id: &str) -> bool {
        self.gents.iter().any(|g| g == gent_id)
    }

    fn check_gent(&self, gent_id: &str) -> Result<(), StoreError> {
        if self.is_known_gent(gent_id) {
            Ok(())
        } else {
            Err(StoreError::UnknownGent)
        }
    }

    fn gig_mut(&mut self, id: &str) -> Result<&mut Gig, StoreError> {
        self.gigs
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(StoreError::GigNotFound)
    }

    /// Gents assigned to `id`, sorted.
    pub fn assigned(&self, id: &str) -> Vec<String> {
        self.assignments
            .get(id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn create(&mut self, seed: GigSeed) -> Result<Gig, StoreError> {
        if !EMAIL_RE.is_match(&seed.client_email) {
            return Err(StoreError::InvalidEmail);
        }
        let gig = Gig {
            id: uuid::Uuid::new_v4().to_string(),
            date: seed.date,
            client_email: seed.client_email,
            fee_cents: seed.fee_cents,
            assigned_gents: None,
        };
        self.assignments.insert(gig.id.clone(), BTreeSet::new());
        self.gigs.push(gig.clone());
        Ok(gig)
    }

    /// Apply the present fields of `patch`. Returns the updated gig and the
    /// gents assigned to it.
    pub fn update(&mut self, id: &str, patch: GigPatch) -> Result<(Gig, Vec<String>), StoreError> {
        if let Some(ref email) = patch.client_email
            && !EMAIL_RE.is_match(email)
        {
            // Check existence first so a bad id still reports 404.
            self.gig_mut(id)?;
            return Err(StoreError::InvalidEmail);
        }
        let gig = self.gig_mut(id)?;
        if let Some(date) = patch.date {
            gig.date = date;
        }
        if let Some(email) = patch.client_email {
            gig.client_email = email;
        }
        if let Some(fee) = patch.fee_cents {
            gig.fee_cents = fee;
        }
        let gig = gig.clone();
        Ok((gig, self.assigned(id)))
    }

    /// Assign or unassign a gent. The flag is true when the set changed.
    pub fn assign(
        &mut self,
        id: &str,
        gent_id: &str,
        assigned: bool,
    ) -> Result<(Assignment, bool), StoreError> {
        self.check_gent(gent_id)?;
        self.gig_mut(id)?;
        let set = self.assignments.entry(id.to_string()).or_default();
        let changed = if assigned {
            set.insert(gent_id.to_string())
        } else {
            set.remove(gent_id)
        };
        Ok((
            Assignment {
                id: id.to_string(),
                gents: set.iter().cloned().collect(),
            },
            changed,
        ))
    }

    /// Remove a gig. Returns the gents that were assigned to it.
    pub fn delete(&mut self, id: &str) -> Result<Vec<String>, StoreError> {
        let before = self.gigs.len();
        self.gigs.retain(|g| g.id != id);
        if self.gigs.len() == before {
            return Err(StoreError::GigNotFound);
        }
        Ok(self
            .assignments
            .remove(id)
            .map(|s| s.into_iter().collect())
            .unwrap_or_default())
    }

    /// Every gig in creation order, with its sorted gent list.
    pub fn manager_gigs(&self) -> Vec<Gig> {
        self.gigs
            .iter()
            .map(|g| Gig {
                assigned_gents: Some(self.assigned(&g.id)),
                ..g.clone()
            })
            .collect()
    }

    /// Gigs assigned to `gent_id`, ordered by date then id, without gent lists.
    pub fn gent_gigs(&self, gent_id: &str) -> Result<Vec<Gig>, StoreError> {
        self.check_gent(gent_id)?;
        let mut out: Vec<Gig> = self
            .gigs
            .iter()
            .filter(|g| {
                self.assignments
                    .get(&g.id)
                    .is_some_and(|s| s.contains(gent_id))
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.date, &a.id).cmp(&(b.date, &b.id)));
        Ok(out)
    }

    /// A gent is "red" while it has at least one assigned gig.
    pub fn gent_state(&self, gent_id: &str) -> Result<GentState, StoreError> {
        self.check_gent(gent_id)?;
        let red = self.assignments.values().any(|s| s.contains(gent_id));
        Ok(GentState { red })
    }
}
