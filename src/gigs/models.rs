use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// Wire form of the manager identity.
pub const MANAGER_USER_ID: &str = "manager";

// ── Identity ─────────────────────────────────────────────────────────

/// Who is looking at the gigs: the manager or one worker ("gent").
///
/// Worker ids are opaque strings such as `gent-2`; the set of valid gents is
/// owned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Manager,
    Gent(String),
}

impl Identity {
    /// Build a worker identity, rejecting ids that cannot travel in a URL path.
    pub fn gent(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case(MANAGER_USER_ID)
            || trimmed.contains(|c: char| c.is_whitespace() || c == '/' || c == '?' || c == '#')
        {
            return Err(SyncError::InvalidIdentity(id));
        }
        Ok(Identity::Gent(trimmed.to_string()))
    }

    /// The `user_id` this identity connects to the push channel with.
    pub fn user_id(&self) -> &str {
        match self {
            Identity::Manager => MANAGER_USER_ID,
            Identity::Gent(id) => id,
        }
    }

    pub fn is_manager(&self) -> bool {
        matches!(self, Identity::Manager)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.user_id())
    }
}

impl std::str::FromStr for Identity {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(MANAGER_USER_ID) {
            Ok(Identity::Manager)
        } else {
            Identity::gent(s)
        }
    }
}

// ── Gig ──────────────────────────────────────────────────────────────

/// A scheduled job as the server reports it.
///
/// Collections are keyed by `id`; two gigs with the same `id` are the same
/// gig regardless of their other fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gig {
    pub id: String,
    pub date: NaiveDate,
    pub client_email: String,
    #[serde(rename = "fee")]
    pub fee_cents: i64,
    /// Only present in manager-scope responses.
    #[serde(rename = "gents", default, skip_serializing_if = "Option::is_none")]
    pub assigned_gents: Option<Vec<String>>,
}

/// `{ "gigs": [...] }` envelope returned by both list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GigList {
    pub gigs: Vec<Gig>,
}

/// Find a gig in a collection by id.
pub fn find_gig<'a>(gigs: &'a [Gig], id: &str) -> Option<&'a Gig> {
    gigs.iter().find(|g| g.id == id)
}

/// Put `gig` at the front of the collection, dropping any older copy with the
/// same id so the collection never holds duplicates.
pub fn prepend_gig(gigs: &mut Vec<Gig>, gig: Gig) {
    gigs.retain(|g| g.id != gig.id);
    gigs.insert(0, gig);
}

/// Replace the gig with the same id in place. Returns false if it is absent.
pub fn replace_gig(gigs: &mut [Gig], gig: &Gig) -> bool {
    match gigs.iter_mut().find(|g| g.id == gig.id) {
        Some(slot) => {
            *slot = gig.clone();
            true
        }
        None => false,
    }
}

// ── Request bodies ───────────────────────────────────────────────────

/// Body of `POST /gigs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GigSeed {
    pub date: NaiveDate,
    pub client_email: String,
    #[serde(rename = "fee")]
    pub fee_cents: i64,
}

impl GigSeed {
    /// Minimal valid seed: the given day, a placeholder client and no fee.
    pub fn placeholder(date: NaiveDate, placeholder_email: &str) -> Self {
        Self {
            date,
            client_email: placeholder_email.to_string(),
            fee_cents: 0,
        }
    }

    /// Placeholder seed dated today in local time.
    pub fn for_today(placeholder_email: &str) -> Self {
        Self::placeholder(chrono::Local::now().date_naive(), placeholder_email)
    }
}

/// Partial edit of a gig; only present fields are sent with `PATCH /gigs/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    #[serde(rename = "fee", default, skip_serializing_if = "Option::is_none")]
    pub fee_cents: Option<i64>,
}

impl GigPatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.client_email.is_none() && self.fee_cents.is_none()
    }

    /// Keep only the fields whose value differs from the server's copy.
    pub fn diff_against(&self, server: &Gig) -> GigPatch {
        GigPatch {
            date: self.date.filter(|d| *d != server.date),
            client_email: self
                .client_email
                .clone()
                .filter(|e| *e != server.client_email),
            fee_cents: self.fee_cents.filter(|f| *f != server.fee_cents),
        }
    }

    /// Names of the fields this patch touches, in wire form.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.date.is_some() {
            names.push("date");
        }
        if self.client_email.is_some() {
            names.push("client_email");
        }
        if self.fee_cents.is_some() {
            names.push("fee");
        }
        names
    }
}

/// Body of `POST /gigs/{id}/assign`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub gent_id: String,
    pub assigned: bool,
}

/// Assignment set of a gig after an assign/unassign call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub gents: Vec<String>,
}

/// Legacy per-worker signal from `GET /gent/{id}/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GentState {
    pub red: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gig(id: &str, fee: i64) -> Gig {
        Gig {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            client_email: "client@example.com".to_string(),
            fee_cents: fee,
            assigned_gents: None,
        }
    }

    #[test]
    fn test_identity_parsing() {
        assert_eq!("manager".parse::<Identity>().unwrap(), Identity::Manager);
        assert_eq!("MANAGER".parse::<Identity>().unwrap(), Identity::Manager);
        assert_eq!(
            "gent-3".parse::<Identity>().unwrap(),
            Identity::Gent("gent-3".to_string())
        );
        // Worker ids are not limited to a fixed set.
        assert_eq!(
            "gent-42".parse::<Identity>().unwrap().user_id(),
            "gent-42"
        );
    }

    #[test]
    fn test_identity_rejects_unroutable_ids() {
        assert!("".parse::<Identity>().is_err());
        assert!("  ".parse::<Identity>().is_err());
        assert!("gent/1".parse::<Identity>().is_err());
        assert!("gent 1".parse::<Identity>().is_err());
        assert!(Identity::gent("manager").is_err());
    }

    #[test]
    fn test_gig_decodes_manager_shape() {
        let json = r#"{"id":"a1","date":"2025-03-14","client_email":"x@y.io","fee":1500,"gents":["gent-1","gent-2"]}"#;
        let g: Gig = serde_json::from_str(json).unwrap();
        assert_eq!(g.id, "a1");
        assert_eq!(g.fee_cents, 1500);
        assert_eq!(
            g.assigned_gents,
            Some(vec!["gent-1".to_string(), "gent-2".to_string()])
        );
    }

    #[test]
    fn test_gig_decodes_worker_shape_without_gents() {
        let json = r#"{"id":"a1","date":"2025-03-14","client_email":"x@y.io","fee":0}"#;
        let g: Gig = serde_json::from_str(json).unwrap();
        assert!(g.assigned_gents.is_none());
        let back = serde_json::to_string(&g).unwrap();
        assert!(!back.contains("gents"));
    }

    #[test]
    fn test_gig_rejects_malformed_date() {
        let json = r#"{"id":"a1","date":"14/03/2025","client_email":"x@y.io","fee":0}"#;
        assert!(serde_json::from_str::<Gig>(json).is_err());
    }

    #[test]
    fn test_seed_uses_wire_names() {
        let seed = GigSeed::placeholder(
            NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            "client@example.com",
        );
        let json = serde_json::to_value(&seed).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"date": "2025-01-02", "client_email": "client@example.com", "fee": 0})
        );
    }

    #[test]
    fn test_patch_diff_drops_unchanged_fields() {
        let server = gig("a", 500);
        let edits = GigPatch {
            date: Some(server.date),
            client_email: Some("new@example.com".to_string()),
            fee_cents: Some(500),
        };
        let diff = edits.diff_against(&server);
        assert_eq!(diff.date, None);
        assert_eq!(diff.fee_cents, None);
        assert_eq!(diff.client_email.as_deref(), Some("new@example.com"));
        assert_eq!(diff.field_names(), vec!["client_email"]);
    }

    #[test]
    fn test_patch_diff_of_identical_edit_is_empty() {
        let server = gig("a", 500);
        let edits = GigPatch {
            fee_cents: Some(500),
            ..Default::default()
        };
        assert!(edits.diff_against(&server).is_empty());
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = GigPatch {
            fee_cents: Some(750),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"fee":750}"#);
    }

    #[test]
    fn test_prepend_replaces_existing_copy() {
        let mut gigs = vec![gig("a", 1), gig("b", 2)];
        prepend_gig(&mut gigs, gig("b", 99));
        let ids: Vec<_> = gigs.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(gigs[0].fee_cents, 99);
    }

    #[test]
    fn test_replace_gig_by_id() {
        let mut gigs = vec![gig("a", 1), gig("b", 2)];
        assert!(replace_gig(&mut gigs, &gig("b", 20)));
        assert_eq!(find_gig(&gigs, "b").unwrap().fee_cents, 20);
        assert!(!replace_gig(&mut gigs, &gig("zzz", 0)));
    }
}
