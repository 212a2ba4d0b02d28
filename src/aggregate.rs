use serde::{Deserialize, Serialize};

/// One raw parent/guardian document record: a (role, type) slot with its
/// URL and type-specific metadata, optionally carrying a persisted status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDocument {
    pub role: String,
    pub doc_type: String,
    pub url: String,
    #[serde(default)]
    pub pass_type: Option<String>,
    #[serde(default)]
    pub pass_expiry_date: Option<String>,
    #[serde(default)]
    pub passport_number: Option<String>,
    #[serde(default)]
    pub passport_expiry_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Flat per-role, per-type view-model consumed by both the upload step
/// and the read-only document viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementView {
    pub mother_pass: String,
    pub mother_pass_type: String,
    pub mother_pass_expiry_date: String,
    pub mother_passport: String,
    pub mother_passport_number: String,
    pub mother_passport_expiry_date: String,
    pub father_pass: String,
    pub father_pass_type: String,
    pub father_pass_expiry_date: String,
    pub father_passport: String,
    pub father_passport_number: String,
    pub father_passport_expiry_date: String,
    pub guardian_pass: String,
    pub guardian_pass_type: String,
    pub guardian_pass_expiry_date: String,
    pub guardian_passport: String,
    pub guardian_passport_number: String,
    pub guardian_passport_expiry_date: String,
    pub has_father_info: bool,
    pub has_guardian_info: bool,
}

/// One display card for the read-only viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCard {
    pub role: String,
    pub doc_type: String,
    pub url: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_expiry_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_expiry_date: Option<String>,
}

fn opt_string(v: &Option<String>) -> String {
    v.as_deref().unwrap_or("").to_string()
}

/// Fold raw role documents into the flat view-model. The first record per
/// (role, type) pair wins; later duplicates are ignored. Presence flags are
/// derived from whether that role ended up with any document at all.
pub fn aggregate_requirements(docs: &[RoleDocument]) -> RequirementView {
    let mut view = RequirementView::default();

    for doc in docs {
        if doc.url.is_empty() {
            continue;
        }
        let role = doc.role.to_ascii_lowercase();
        let doc_type = doc.doc_type.to_ascii_lowercase();
        match (role.as_str(), doc_type.as_str()) {
            ("mother", "pass") if view.mother_pass.is_empty() => {
                view.mother_pass = doc.url.clone();
                view.mother_pass_type = opt_string(&doc.pass_type);
                view.mother_pass_expiry_date = opt_string(&doc.pass_expiry_date);
            }
            ("mother", "passport") if view.mother_passport.is_empty() => {
                view.mother_passport = doc.url.clone();
                view.mother_passport_number = opt_string(&doc.passport_number);
                view.mother_passport_expiry_date = opt_string(&doc.passport_expiry_date);
            }
            ("father", "pass") if view.father_pass.is_empty() => {
                view.father_pass = doc.url.clone();
                view.father_pass_type = opt_string(&doc.pass_type);
                view.father_pass_expiry_date = opt_string(&doc.pass_expiry_date);
            }
            ("father", "passport") if view.father_passport.is_empty() => {
                view.father_passport = doc.url.clone();
                view.father_passport_number = opt_string(&doc.passport_number);
                view.father_passport_expiry_date = opt_string(&doc.passport_expiry_date);
            }
            ("guardian", "pass") if view.guardian_pass.is_empty() => {
                view.guardian_pass = doc.url.clone();
                view.guardian_pass_type = opt_string(&doc.pass_type);
                view.guardian_pass_expiry_date = opt_string(&doc.pass_expiry_date);
            }
            ("guardian", "passport") if view.guardian_passport.is_empty() => {
                view.guardian_passport = doc.url.clone();
                view.guardian_passport_number = opt_string(&doc.passport_number);
                view.guardian_passport_expiry_date = opt_string(&doc.passport_expiry_date);
            }
            _ => {}
        }
    }

    view.has_father_info = !view.father_pass.is_empty() || !view.father_passport.is_empty();
    view.has_guardian_info = !view.guardian_pass.is_empty() || !view.guardian_passport.is_empty();
    view
}

/// Synthesize one viewer card per non-empty (role, type) slot. Records with
/// no persisted status show as "pending" (freshly derived requirement data).
pub fn requirement_cards(docs: &[RoleDocument]) -> Vec<DocumentCard> {
    let mut seen: Vec<(String, String)> = Vec::new();
    let mut cards = Vec::new();

    for doc in docs {
        if doc.url.is_empty() {
            continue;
        }
        let key = (
            doc.role.to_ascii_lowercase(),
            doc.doc_type.to_ascii_lowercase(),
        );
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        cards.push(DocumentCard {
            role: doc.role.to_ascii_lowercase(),
            doc_type: doc.doc_type.to_ascii_lowercase(),
            url: doc.url.clone(),
            status: doc
                .status
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "pending".to_string()),
            pass_type: doc.pass_type.clone(),
            pass_expiry_date: doc.pass_expiry_date.clone(),
            passport_number: doc.passport_number.clone(),
            passport_expiry_date: doc.passport_expiry_date.clone(),
        });
    }

    cards
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass_doc(role: &str, url: &str) -> RoleDocument {
        RoleDocument {
            role: role.to_string(),
            doc_type: "Pass".to_string(),
            url: url.to_string(),
            pass_type: Some("EP".to_string()),
            pass_expiry_date: Some("2027-01-31".to_string()),
            passport_number: None,
            passport_expiry_date: None,
            status: None,
        }
    }

    fn passport_doc(role: &str, url: &str) -> RoleDocument {
        RoleDocument {
            role: role.to_string(),
            doc_type: "Passport".to_string(),
            url: url.to_string(),
            pass_type: None,
            pass_expiry_date: None,
            passport_number: Some("P1234567".to_string()),
            passport_expiry_date: Some("2030-05-01".to_string()),
            status: Some("Uploaded".to_string()),
        }
    }

    #[test]
    fn first_match_per_role_and_type_wins() {
        let docs = vec![
            pass_doc("mother", "url-a"),
            pass_doc("mother", "url-b"),
            passport_doc("mother", "url-c"),
        ];
        let view = aggregate_requirements(&docs);
        assert_eq!(view.mother_pass, "url-a");
        assert_eq!(view.mother_pass_type, "EP");
        assert_eq!(view.mother_passport, "url-c");
        assert_eq!(view.mother_passport_number, "P1234567");
    }

    #[test]
    fn presence_flags_follow_aggregated_documents() {
        let docs = vec![pass_doc("mother", "m"), passport_doc("father", "f")];
        let view = aggregate_requirements(&docs);
        assert!(view.has_father_info);
        assert!(!view.has_guardian_info);

        let none: Vec<RoleDocument> = Vec::new();
        let view = aggregate_requirements(&none);
        assert!(!view.has_father_info);
        assert!(!view.has_guardian_info);
    }

    #[test]
    fn cards_default_missing_status_to_pending() {
        let docs = vec![pass_doc("guardian", "g"), passport_doc("mother", "m")];
        let cards = requirement_cards(&docs);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].status, "pending");
        assert_eq!(cards[1].status, "Uploaded");
    }

    #[test]
    fn duplicate_and_empty_urls_produce_no_cards() {
        let docs = vec![
            pass_doc("mother", ""),
            pass_doc("mother", "first"),
            pass_doc("mother", "second"),
        ];
        let cards = requirement_cards(&docs);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].url, "first");
    }
}
