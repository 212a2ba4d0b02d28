use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde_json::json;

use crate::aggregate::{aggregate_requirements, requirement_cards, RoleDocument};
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bad_params, ensure_year_tables, get_required_str, require_db, require_session, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::submit::STATUS_UPLOADED;

/// Slot name as exposed over IPC, its URL column, and its status column.
const STUDENT_SLOTS: [(&str, &str, &str); 7] = [
    ("form12", "form12", "form12_status"),
    ("medical", "medical", "medical_status"),
    ("passport", "passport", "passport_status"),
    ("pass", "pass", "pass_status"),
    ("birthCert", "birth_cert", "birth_cert_status"),
    ("educCert", "educ_cert", "educ_cert_status"),
    ("idPicture", "id_picture", "id_picture_status"),
];

const PARENT_ROLES: [&str; 3] = ["mother", "father", "guardian"];

fn db_query_failed(e: impl ToString) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn not_found(message: &str) -> HandlerErr {
    HandlerErr {
        code: "not_found",
        message: message.to_string(),
        details: None,
    }
}

/// Documents are keyed by student number only, so ownership is checked
/// against the matching application row.
fn check_ownership(
    conn: &Connection,
    academic_year: &str,
    student_number: &str,
    user_id: &str,
) -> Result<(), HandlerErr> {
    let applications =
        db::applications_table(academic_year).map_err(|e| bad_params(e.to_string()))?;
    let exists: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {applications} WHERE student_number = ? AND parent_user_id = ?"),
            (student_number, user_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_query_failed)?;
    if exists.is_none() {
        return Err(not_found("application not found"));
    }
    Ok(())
}

fn role_documents_from_row(row: &Row) -> rusqlite::Result<Vec<RoleDocument>> {
    let mut docs = Vec::new();
    for role in PARENT_ROLES {
        let pass: Option<String> = row.get(format!("{role}_pass").as_str())?;
        if let Some(url) = pass.filter(|s| !s.is_empty()) {
            docs.push(RoleDocument {
                role: role.to_string(),
                doc_type: "pass".to_string(),
                url,
                pass_type: row.get(format!("{role}_pass_type").as_str())?,
                pass_expiry_date: row.get(format!("{role}_pass_expiry_date").as_str())?,
                passport_number: None,
                passport_expiry_date: None,
                status: Some(row.get(format!("{role}_pass_status").as_str())?),
            });
        }
        let passport: Option<String> = row.get(format!("{role}_passport").as_str())?;
        if let Some(url) = passport.filter(|s| !s.is_empty()) {
            docs.push(RoleDocument {
                role: role.to_string(),
                doc_type: "passport".to_string(),
                url,
                pass_type: None,
                pass_expiry_date: None,
                passport_number: row.get(format!("{role}_passport_number").as_str())?,
                passport_expiry_date: row.get(format!("{role}_passport_expiry_date").as_str())?,
                status: Some(row.get(format!("{role}_passport_status").as_str())?),
            });
        }
    }
    Ok(docs)
}

struct DocumentsView {
    enrolee_number: String,
    student_slots: Vec<serde_json::Value>,
    role_documents: Vec<RoleDocument>,
}

fn fetch_documents(
    conn: &Connection,
    academic_year: &str,
    student_number: &str,
) -> Result<Option<DocumentsView>, HandlerErr> {
    let documents = db::documents_table(academic_year).map_err(|e| bad_params(e.to_string()))?;
    conn.query_row(
        &format!("SELECT * FROM {documents} WHERE student_number = ?"),
        [student_number],
        |row| {
            let mut student_slots = Vec::new();
            for (slot, url_col, status_col) in STUDENT_SLOTS {
                let url: Option<String> = row.get(url_col)?;
                let status: String = row.get(status_col)?;
                student_slots.push(json!({
                    "slot": slot,
                    "url": url,
                    "status": status,
                }));
            }
            Ok(DocumentsView {
                enrolee_number: row.get("enrolee_number")?,
                student_slots,
                role_documents: role_documents_from_row(row)?,
            })
        },
    )
    .optional()
    .map_err(db_query_failed)
}

fn handle_documents_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_session(state) {
        Ok(u) => u,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let academic_year = match get_required_str(&req.params, "academicYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_number = match get_required_str(&req.params, "studentNumber") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = ensure_year_tables(conn, &academic_year) {
        return e.response(&req.id);
    }
    if let Err(e) = check_ownership(conn, &academic_year, &student_number, &session.id) {
        return e.response(&req.id);
    }

    match fetch_documents(conn, &academic_year, &student_number) {
        Ok(Some(view)) => ok(
            &req.id,
            json!({
                "studentNumber": student_number,
                "enroleeNumber": view.enrolee_number,
                "studentSlots": view.student_slots,
                "parentCards": requirement_cards(&view.role_documents),
            }),
        ),
        Ok(None) => not_found("documents row not found").response(&req.id),
        Err(e) => e.response(&req.id),
    }
}

fn handle_documents_requirements(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_session(state) {
        Ok(u) => u,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let academic_year = match get_required_str(&req.params, "academicYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_number = match get_required_str(&req.params, "studentNumber") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = ensure_year_tables(conn, &academic_year) {
        return e.response(&req.id);
    }
    if let Err(e) = check_ownership(conn, &academic_year, &student_number, &session.id) {
        return e.response(&req.id);
    }

    match fetch_documents(conn, &academic_year, &student_number) {
        Ok(Some(view)) => {
            let requirements = aggregate_requirements(&view.role_documents);
            match serde_json::to_value(&requirements) {
                Ok(value) => ok(&req.id, json!({ "requirements": value })),
                Err(e) => HandlerErr {
                    code: "server_error",
                    message: e.to_string(),
                    details: None,
                }
                .response(&req.id),
            }
        }
        Ok(None) => not_found("documents row not found").response(&req.id),
        Err(e) => e.response(&req.id),
    }
}

/// Metadata param keys accepted per slot, mapped to their columns.
fn slot_columns(
    slot: &str,
) -> Option<(
    &'static str,
    &'static str,
    &'static [(&'static str, &'static str)],
)> {
    for (name, url_col, status_col) in STUDENT_SLOTS {
        if name == slot {
            return Some((url_col, status_col, &[]));
        }
    }
    match slot {
        "motherPass" => Some((
            "mother_pass",
            "mother_pass_status",
            &[
                ("passType", "mother_pass_type"),
                ("passExpiryDate", "mother_pass_expiry_date"),
            ],
        )),
        "motherPassport" => Some((
            "mother_passport",
            "mother_passport_status",
            &[
                ("passportNumber", "mother_passport_number"),
                ("passportExpiryDate", "mother_passport_expiry_date"),
            ],
        )),
        "fatherPass" => Some((
            "father_pass",
            "father_pass_status",
            &[
                ("passType", "father_pass_type"),
                ("passExpiryDate", "father_pass_expiry_date"),
            ],
        )),
        "fatherPassport" => Some((
            "father_passport",
            "father_passport_status",
            &[
                ("passportNumber", "father_passport_number"),
                ("passportExpiryDate", "father_passport_expiry_date"),
            ],
        )),
        "guardianPass" => Some((
            "guardian_pass",
            "guardian_pass_status",
            &[
                ("passType", "guardian_pass_type"),
                ("passExpiryDate", "guardian_pass_expiry_date"),
            ],
        )),
        "guardianPassport" => Some((
            "guardian_passport",
            "guardian_passport_status",
            &[
                ("passportNumber", "guardian_passport_number"),
                ("passportExpiryDate", "guardian_passport_expiry_date"),
            ],
        )),
        _ => None,
    }
}

fn handle_documents_update_slot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_session(state) {
        Ok(u) => u,
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let academic_year = match get_required_str(&req.params, "academicYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_number = match get_required_str(&req.params, "studentNumber") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let slot = match get_required_str(&req.params, "slot") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let url = match get_required_str(&req.params, "url") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let Some((url_col, status_col, metadata_cols)) = slot_columns(&slot) else {
        return bad_params(format!("unknown slot: {}", slot)).response(&req.id);
    };

    if let Err(e) = ensure_year_tables(conn, &academic_year) {
        return e.response(&req.id);
    }
    if let Err(e) = check_ownership(conn, &academic_year, &student_number, &session.id) {
        return e.response(&req.id);
    }
    let documents = match db::documents_table(&academic_year) {
        Ok(t) => t,
        Err(e) => return bad_params(e.to_string()).response(&req.id),
    };

    let metadata = req.params.get("metadata").cloned().unwrap_or(json!({}));
    let mut sets = vec![format!("{} = ?", url_col)];
    let mut binds = vec![Value::Text(url)];
    for (param_key, column) in metadata_cols {
        if let Some(v) = metadata.get(param_key).and_then(|v| v.as_str()) {
            sets.push(format!("{} = ?", column));
            binds.push(Value::Text(v.trim().to_string()));
        }
    }
    sets.push(format!("{} = '{}'", status_col, STATUS_UPLOADED));
    binds.push(Value::Text(student_number.clone()));

    let updated = conn.execute(
        &format!(
            "UPDATE {} SET {} WHERE student_number = ?",
            documents,
            sets.join(", ")
        ),
        params_from_iter(binds),
    );
    match updated {
        Ok(0) => not_found("documents row not found").response(&req.id),
        Ok(_) => ok(
            &req.id,
            json!({ "slot": slot, "status": STATUS_UPLOADED }),
        ),
        Err(e) => HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "slot": slot })),
        }
        .response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "documents.get" => Some(handle_documents_get(state, req)),
        "documents.requirements" => Some(handle_documents_requirements(state, req)),
        "documents.updateSlot" => Some(handle_documents_update_slot(state, req)),
        _ => None,
    }
}
