use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::forms::{flatten_application, ApplicationRow, EnrollmentForm, ParentUploads};
use crate::idents;

/// School-local calendar dates (Asia/Singapore, UTC+08:00).
const SCHOOL_UTC_OFFSET_HOURS: i64 = 8;

pub const STATUS_SUBMITTED: &str = "Submitted";
pub const STATUS_UPLOADED: &str = "Uploaded";

/// Explicitly injected session identity; owner-scoped operations never
/// fetch ambient auth state.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnroleeType {
    New,
    Current,
}

impl EnroleeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnroleeType::New => "New",
            EnroleeType::Current => "Current",
        }
    }
}

#[derive(Debug)]
pub struct SubmitError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

fn serr(code: &'static str, message: impl Into<String>) -> SubmitError {
    SubmitError {
        code,
        message: message.into(),
        details: None,
    }
}

fn serr_with(
    code: &'static str,
    message: impl Into<String>,
    details: serde_json::Value,
) -> SubmitError {
    SubmitError {
        code,
        message: message.into(),
        details: Some(details),
    }
}

/// Today's date on the school calendar.
pub fn school_today() -> NaiveDate {
    (Utc::now() + Duration::hours(SCHOOL_UTC_OFFSET_HOURS)).date_naive()
}

/// Normalize a birth-date input to the school's local calendar date.
/// Accepts plain `YYYY-MM-DD` or an RFC 3339 timestamp; anything else
/// is passed through trimmed for raw comparison.
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.format("%Y-%m-%d").to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        let local = dt.with_timezone(&Utc) + Duration::hours(SCHOOL_UTC_OFFSET_HOURS);
        return local.date_naive().format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}

#[derive(Debug, Clone)]
pub struct DedupKey {
    pub full_name: String,
    pub birth_date: String,
    pub mother_email: String,
    pub father_email: Option<String>,
}

/// Best-effort pre-submission duplicate check: case-insensitive full name,
/// exact normalized birth date, and either parent email matching, scoped to
/// the year's applications table. Advisory only; there is no storage-level
/// uniqueness constraint behind it.
pub fn already_enrolled(
    conn: &Connection,
    academic_year: &str,
    key: &DedupKey,
) -> Result<bool, SubmitError> {
    let table = db::applications_table(academic_year)
        .map_err(|e| serr("bad_params", e.to_string()))?;
    let birth_date = normalize_date(&key.birth_date);
    let father_email = key.father_email.clone().unwrap_or_default();

    let count: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM {table}
                 WHERE LOWER(full_name) = LOWER(?1)
                   AND birth_date = ?2
                   AND (LOWER(mother_email) = LOWER(?3)
                        OR (?4 <> '' AND LOWER(father_email) = LOWER(?4)))"
            ),
            rusqlite::params![key.full_name.trim(), birth_date, key.mother_email.trim(), father_email.trim()],
            |r| r.get(0),
        )
        .map_err(|e| serr("db_query_failed", e.to_string()))?;

    Ok(count > 0)
}

#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub application_id: i64,
    pub student_number: String,
    pub enrolee_number: String,
}

/// One named member of the step-5 document-slot batch.
struct SlotPlan {
    name: &'static str,
    status_column: &'static str,
    assignments: Vec<(&'static str, String)>,
}

/// Compensating action registered by a completed saga step.
struct Compensation {
    label: &'static str,
    sql: String,
    bind: Value,
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn push_student_slot(
    plans: &mut Vec<SlotPlan>,
    name: &'static str,
    column: &'static str,
    status_column: &'static str,
    url: &Option<String>,
) {
    if let Some(url) = non_empty(url) {
        plans.push(SlotPlan {
            name,
            status_column,
            assignments: vec![(column, url)],
        });
    }
}

fn push_role_slot(
    plans: &mut Vec<SlotPlan>,
    name: &'static str,
    url_column: &'static str,
    status_column: &'static str,
    url: &Option<String>,
    metadata: &[(&'static str, &Option<String>)],
) {
    let Some(url) = non_empty(url) else {
        return;
    };
    let mut assignments = vec![(url_column, url)];
    for (column, value) in metadata {
        if let Some(v) = non_empty(value) {
            assignments.push((*column, v));
        }
    }
    plans.push(SlotPlan {
        name,
        status_column,
        assignments,
    });
}

/// Expand the upload step's URLs into the ordered, named slot batch:
/// the 7 student-owned slots first, then pass + passport for the mother
/// and each present parent role.
fn build_slot_plans(row: &ApplicationRow, form: &EnrollmentForm) -> Vec<SlotPlan> {
    let student = &form.upload_requirements.student_upload_requirements;
    let parents = &form.upload_requirements.parent_guardian_upload_requirements;
    let mut plans = Vec::new();

    push_student_slot(&mut plans, "form12", "form12", "form12_status", &student.form12);
    push_student_slot(&mut plans, "medical", "medical", "medical_status", &student.medical);
    push_student_slot(&mut plans, "passport", "passport", "passport_status", &student.passport);
    push_student_slot(&mut plans, "pass", "pass", "pass_status", &student.pass);
    push_student_slot(
        &mut plans,
        "birthCert",
        "birth_cert",
        "birth_cert_status",
        &student.birth_cert,
    );
    push_student_slot(
        &mut plans,
        "educCert",
        "educ_cert",
        "educ_cert_status",
        &student.educ_cert,
    );
    push_student_slot(
        &mut plans,
        "idPicture",
        "id_picture",
        "id_picture_status",
        &student.id_picture,
    );

    push_role_slot(
        &mut plans,
        "motherPass",
        "mother_pass",
        "mother_pass_status",
        &parents.mother_pass,
        &[
            ("mother_pass_type", &parents.mother_pass_type),
            ("mother_pass_expiry_date", &parents.mother_pass_expiry_date),
        ],
    );
    push_role_slot(
        &mut plans,
        "motherPassport",
        "mother_passport",
        "mother_passport_status",
        &parents.mother_passport,
        &[
            ("mother_passport_number", &parents.mother_passport_number),
            (
                "mother_passport_expiry_date",
                &parents.mother_passport_expiry_date,
            ),
        ],
    );
    if row.has_father_info {
        push_role_slot(
            &mut plans,
            "fatherPass",
            "father_pass",
            "father_pass_status",
            &parents.father_pass,
            &[
                ("father_pass_type", &parents.father_pass_type),
                ("father_pass_expiry_date", &parents.father_pass_expiry_date),
            ],
        );
        push_role_slot(
            &mut plans,
            "fatherPassport",
            "father_passport",
            "father_passport_status",
            &parents.father_passport,
            &[
                ("father_passport_number", &parents.father_passport_number),
                (
                    "father_passport_expiry_date",
                    &parents.father_passport_expiry_date,
                ),
            ],
        );
    }
    if row.has_guardian_info {
        push_role_slot(
            &mut plans,
            "guardianPass",
            "guardian_pass",
            "guardian_pass_status",
            &parents.guardian_pass,
            &[
                ("guardian_pass_type", &parents.guardian_pass_type),
                (
                    "guardian_pass_expiry_date",
                    &parents.guardian_pass_expiry_date,
                ),
            ],
        );
        push_role_slot(
            &mut plans,
            "guardianPassport",
            "guardian_passport",
            "guardian_passport_status",
            &parents.guardian_passport,
            &[
                (
                    "guardian_passport_number",
                    &parents.guardian_passport_number,
                ),
                (
                    "guardian_passport_expiry_date",
                    &parents.guardian_passport_expiry_date,
                ),
            ],
        );
    }

    plans
}

/// Pass/passport expiry dates must not be in the past on the school
/// calendar. Only slots that actually carry a URL are checked.
fn validate_upload_expiry(parents: &ParentUploads, today: NaiveDate) -> Result<(), SubmitError> {
    let checks: [(&str, &Option<String>, &Option<String>); 6] = [
        ("mother's pass", &parents.mother_pass, &parents.mother_pass_expiry_date),
        (
            "mother's passport",
            &parents.mother_passport,
            &parents.mother_passport_expiry_date,
        ),
        ("father's pass", &parents.father_pass, &parents.father_pass_expiry_date),
        (
            "father's passport",
            &parents.father_passport,
            &parents.father_passport_expiry_date,
        ),
        (
            "guardian's pass",
            &parents.guardian_pass,
            &parents.guardian_pass_expiry_date,
        ),
        (
            "guardian's passport",
            &parents.guardian_passport,
            &parents.guardian_passport_expiry_date,
        ),
    ];

    for (label, url, expiry) in checks {
        if non_empty(url).is_none() {
            continue;
        }
        let Some(expiry) = non_empty(expiry) else {
            continue;
        };
        if let Ok(d) = NaiveDate::parse_from_str(&expiry, "%Y-%m-%d") {
            if d < today {
                return Err(serr_with(
                    "validation_failed",
                    format!("{} is expired", label),
                    json!({ "expiryDate": expiry }),
                ));
            }
        }
    }
    Ok(())
}

fn opt_text(v: Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s),
        None => Value::Null,
    }
}

const APPLICATION_COLUMNS: &str = "application_status, enrolee_type, academic_year, enrolment_date,
     parent_user_id, parent_email,
     full_name, last_name, first_name, middle_name, gender, birth_date,
     nationality, religion, grade_level, previous_school,
     address_line, city, postal_code, home_phone, referrer_name,
     mother_full_name, mother_last_name, mother_first_name, mother_middle_name,
     mother_religion, mother_email, mother_mobile, mother_occupation, mother_employer,
     father_full_name, father_last_name, father_first_name, father_middle_name,
     father_religion, father_email, father_mobile, father_occupation, father_employer,
     guardian_full_name, guardian_last_name, guardian_first_name, guardian_middle_name,
     guardian_relationship, guardian_religion, guardian_email, guardian_mobile,
     guardian_occupation, guardian_employer,
     sibling_full_name_1, sibling_birth_day_1, sibling_religion_1,
     sibling_school_company_1, sibling_education_occupation_1,
     sibling_full_name_2, sibling_birth_day_2, sibling_religion_2,
     sibling_school_company_2, sibling_education_occupation_2,
     sibling_full_name_3, sibling_birth_day_3, sibling_religion_3,
     sibling_school_company_3, sibling_education_occupation_3,
     sibling_full_name_4, sibling_birth_day_4, sibling_religion_4,
     sibling_school_company_4, sibling_education_occupation_4,
     sibling_full_name_5, sibling_birth_day_5, sibling_religion_5,
     sibling_school_company_5, sibling_education_occupation_5,
     discount_1, discount_2, discount_3, discount_4, discount_5";

fn application_binds(
    row: &ApplicationRow,
    user: &CurrentUser,
    academic_year: &str,
    enrolee_type: EnroleeType,
    enrolment_date: &str,
) -> Vec<Value> {
    let mut binds: Vec<Value> = vec![
        Value::Text(STATUS_SUBMITTED.to_string()),
        Value::Text(enrolee_type.as_str().to_string()),
        Value::Text(academic_year.to_string()),
        Value::Text(enrolment_date.to_string()),
        Value::Text(user.id.clone()),
        Value::Text(user.email.clone()),
        Value::Text(row.full_name.clone()),
        Value::Text(row.last_name.clone()),
        Value::Text(row.first_name.clone()),
        Value::Text(row.middle_name.clone()),
        Value::Text(row.gender.clone()),
        Value::Text(normalize_date(&row.birth_date)),
        Value::Text(row.nationality.clone()),
        Value::Text(row.religion.clone()),
        Value::Text(row.grade_level.clone()),
        opt_text(row.previous_school.clone()),
        Value::Text(row.address_line.clone()),
        Value::Text(row.city.clone()),
        Value::Text(row.postal_code.clone()),
        Value::Text(row.home_phone.clone()),
        Value::Text(row.referrer_name.clone()),
    ];

    for parent in [&row.mother, &row.father] {
        binds.push(Value::Text(parent.full_name.clone()));
        binds.push(Value::Text(parent.last_name.clone()));
        binds.push(Value::Text(parent.first_name.clone()));
        binds.push(Value::Text(parent.middle_name.clone()));
        binds.push(Value::Text(parent.religion.clone()));
        binds.push(Value::Text(parent.email.clone()));
        binds.push(Value::Text(parent.mobile.clone()));
        binds.push(Value::Text(parent.occupation.clone()));
        binds.push(Value::Text(parent.employer.clone()));
    }

    binds.push(Value::Text(row.guardian.full_name.clone()));
    binds.push(Value::Text(row.guardian.last_name.clone()));
    binds.push(Value::Text(row.guardian.first_name.clone()));
    binds.push(Value::Text(row.guardian.middle_name.clone()));
    binds.push(Value::Text(row.guardian_relationship.clone()));
    binds.push(Value::Text(row.guardian.religion.clone()));
    binds.push(Value::Text(row.guardian.email.clone()));
    binds.push(Value::Text(row.guardian.mobile.clone()));
    binds.push(Value::Text(row.guardian.occupation.clone()));
    binds.push(Value::Text(row.guardian.employer.clone()));

    for i in 0..5 {
        match row.siblings.get(i) {
            Some(s) => {
                binds.push(Value::Text(s.full_name.clone()));
                binds.push(Value::Text(s.birth_day.clone()));
                binds.push(Value::Text(s.religion.clone()));
                binds.push(Value::Text(s.school_company.clone()));
                binds.push(Value::Text(s.education_occupation.clone()));
            }
            None => {
                for _ in 0..5 {
                    binds.push(Value::Null);
                }
            }
        }
    }

    for i in 0..5 {
        binds.push(opt_text(row.discounts.get(i).cloned()));
    }

    binds
}

fn run_compensations(
    conn: &Connection,
    compensations: &[Compensation],
) -> (Vec<&'static str>, Vec<serde_json::Value>) {
    let mut compensated = Vec::new();
    let mut failures = Vec::new();
    for comp in compensations.iter().rev() {
        match conn.execute(&comp.sql, [&comp.bind]) {
            Ok(_) => compensated.push(comp.label),
            Err(e) => failures.push(json!({ "step": comp.label, "message": e.to_string() })),
        }
    }
    (compensated, failures)
}

/// Undo prior steps and fold the compensation outcome into the error
/// details. Compensation failures never mask the original error.
fn abort(conn: &Connection, compensations: &[Compensation], mut err: SubmitError) -> SubmitError {
    let (compensated, failures) = run_compensations(conn, compensations);
    let mut details = err.details.take().unwrap_or_else(|| json!({}));
    details["compensated"] = json!(compensated);
    if !failures.is_empty() {
        details["compensationFailures"] = json!(failures);
    }
    err.details = Some(details);
    err
}

/// The submission pipeline: validate, dedup-check, then the write saga
/// (insert application, derive + back-fill both public numbers, insert the
/// documents row, apply the named document-slot batch, append the status
/// snapshot). Strict order, abort-on-first-error; completed steps are
/// compensated (deleted) on abort.
pub fn submit_enrollment(
    conn: &Connection,
    user: &CurrentUser,
    academic_year: &str,
    enrolee_type: EnroleeType,
    form: &EnrollmentForm,
) -> Result<SubmissionOutcome, SubmitError> {
    let row = flatten_application(form).map_err(|e| serr("validation_failed", e.message))?;
    validate_upload_expiry(
        &form.upload_requirements.parent_guardian_upload_requirements,
        school_today(),
    )?;

    // Table names validate the year format, so derive them before touching
    // the database; a malformed year is a parameter error, not an init one.
    let applications = db::applications_table(academic_year)
        .map_err(|e| serr("bad_params", e.to_string()))?;
    let documents = db::documents_table(academic_year)
        .map_err(|e| serr("bad_params", e.to_string()))?;
    let status_history = db::status_history_table(academic_year)
        .map_err(|e| serr("bad_params", e.to_string()))?;
    db::ensure_year_tables(conn, academic_year)
        .map_err(|e| serr("db_init_failed", e.to_string()))?;

    let key = DedupKey {
        full_name: row.full_name.clone(),
        birth_date: row.birth_date.clone(),
        mother_email: row.mother.email.clone(),
        father_email: if row.has_father_info && !row.father.email.is_empty() {
            Some(row.father.email.clone())
        } else {
            None
        },
    };
    if already_enrolled(conn, academic_year, &key)? {
        return Err(serr_with(
            "already_enrolled",
            "an application for this student already exists",
            json!({ "fullName": row.full_name, "birthDate": normalize_date(&row.birth_date) }),
        ));
    }

    let mut compensations: Vec<Compensation> = Vec::new();
    let enrolment_date = school_today().format("%Y-%m-%d").to_string();

    // Step 1: application row with status Submitted; numeric id comes back
    // from AUTOINCREMENT.
    let binds = application_binds(&row, user, academic_year, enrolee_type, &enrolment_date);
    let placeholders = vec!["?"; binds.len()].join(", ");
    if let Err(e) = conn.execute(
        &format!("INSERT INTO {applications}({APPLICATION_COLUMNS}) VALUES({placeholders})"),
        params_from_iter(binds),
    ) {
        return Err(serr_with(
            "db_insert_failed",
            e.to_string(),
            json!({ "table": applications, "step": "insertApplication" }),
        ));
    }
    let application_id = conn.last_insert_rowid();
    compensations.push(Compensation {
        label: "insertApplication",
        sql: format!("DELETE FROM {applications} WHERE id = ?"),
        bind: Value::Integer(application_id),
    });

    // Step 2/3: derive and back-fill both public numbers. The enrollee
    // number update is keyed by the freshly set student number.
    let numbers = match idents::derive_numbers(academic_year, application_id) {
        Ok(n) => n,
        Err(e) => {
            return Err(abort(
                conn,
                &compensations,
                serr_with(
                    "id_out_of_range",
                    e.to_string(),
                    json!({ "step": "deriveNumbers", "applicationId": application_id }),
                ),
            ))
        }
    };

    match conn.execute(
        &format!("UPDATE {applications} SET student_number = ?1 WHERE id = ?2"),
        rusqlite::params![numbers.student_number, application_id],
    ) {
        Ok(1) => {}
        Ok(_) => {
            return Err(abort(
                conn,
                &compensations,
                serr_with(
                    "db_update_failed",
                    "student number update matched no row",
                    json!({ "step": "setStudentNumber" }),
                ),
            ))
        }
        Err(e) => {
            return Err(abort(
                conn,
                &compensations,
                serr_with(
                    "db_update_failed",
                    e.to_string(),
                    json!({ "step": "setStudentNumber" }),
                ),
            ))
        }
    }

    match conn.execute(
        &format!("UPDATE {applications} SET enrolee_number = ?1 WHERE student_number = ?2"),
        rusqlite::params![numbers.enrolee_number, numbers.student_number],
    ) {
        Ok(1) => {}
        Ok(_) => {
            return Err(abort(
                conn,
                &compensations,
                serr_with(
                    "db_update_failed",
                    "enrollee number update matched no row",
                    json!({ "step": "setEnroleeNumber" }),
                ),
            ))
        }
        Err(e) => {
            return Err(abort(
                conn,
                &compensations,
                serr_with(
                    "db_update_failed",
                    e.to_string(),
                    json!({ "step": "setEnroleeNumber" }),
                ),
            ))
        }
    }

    // Step 4: empty documents row keyed by the derived pair.
    let documents_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        &format!(
            "INSERT INTO {documents}(id, student_number, enrolee_number) VALUES(?1, ?2, ?3)"
        ),
        rusqlite::params![documents_id, numbers.student_number, numbers.enrolee_number],
    ) {
        return Err(abort(
            conn,
            &compensations,
            serr_with(
                "db_insert_failed",
                e.to_string(),
                json!({ "table": documents, "step": "insertDocuments" }),
            ),
        ));
    }
    compensations.push(Compensation {
        label: "insertDocuments",
        sql: format!("DELETE FROM {documents} WHERE id = ?"),
        bind: Value::Text(documents_id),
    });

    // Step 5: the named slot batch. Every member is applied and judged as a
    // whole; the first failed slot (in slot order) aborts the submission.
    let plans = build_slot_plans(&row, form);
    let mut first_failure: Option<SubmitError> = None;
    for plan in &plans {
        if let Err(e) = apply_slot(conn, &documents, &numbers.student_number, plan) {
            if first_failure.is_none() {
                first_failure = Some(e);
            }
        }
    }
    if let Some(e) = first_failure {
        return Err(abort(conn, &compensations, e));
    }

    // Step 6: append-only status snapshot.
    if let Err(e) = conn.execute(
        &format!(
            "INSERT INTO {status_history}(id, enrolee_number, enrolment_date, full_name,
                 enrolee_type, application_status, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        rusqlite::params![
            Uuid::new_v4().to_string(),
            numbers.enrolee_number,
            enrolment_date,
            row.full_name,
            enrolee_type.as_str(),
            STATUS_SUBMITTED,
            Utc::now().to_rfc3339(),
        ],
    ) {
        return Err(abort(
            conn,
            &compensations,
            serr_with(
                "db_insert_failed",
                e.to_string(),
                json!({ "table": status_history, "step": "insertStatusHistory" }),
            ),
        ));
    }

    Ok(SubmissionOutcome {
        application_id,
        student_number: numbers.student_number,
        enrolee_number: numbers.enrolee_number,
    })
}

fn apply_slot(
    conn: &Connection,
    documents_table: &str,
    student_number: &str,
    plan: &SlotPlan,
) -> Result<(), SubmitError> {
    let mut sets: Vec<String> = plan
        .assignments
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect();
    sets.push(format!("{} = '{}'", plan.status_column, STATUS_UPLOADED));

    let sql = format!(
        "UPDATE {} SET {} WHERE student_number = ?",
        documents_table,
        sets.join(", ")
    );
    let mut binds: Vec<Value> = plan
        .assignments
        .iter()
        .map(|(_, value)| Value::Text(value.clone()))
        .collect();
    binds.push(Value::Text(student_number.to_string()));

    let updated = conn
        .execute(&sql, params_from_iter(binds))
        .map_err(|e| {
            serr_with(
                "db_update_failed",
                e.to_string(),
                json!({ "step": "applyDocumentSlots", "slot": plan.name }),
            )
        })?;
    if updated == 0 {
        return Err(serr_with(
            "not_found",
            "documents row not found for slot update",
            json!({ "step": "applyDocumentSlots", "slot": plan.name }),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::ensure_year_tables(&conn, "2026").expect("create year tables");
        conn
    }

    fn test_user() -> CurrentUser {
        CurrentUser {
            id: "user-1".to_string(),
            email: "mom@example.com".to_string(),
        }
    }

    fn full_form() -> EnrollmentForm {
        serde_json::from_value(json!({
            "studentInfo": {
                "studentDetails": {
                    "lastName": "Dela Cruz",
                    "firstName": "Juan",
                    "gender": "M",
                    "birthDate": "2015-06-01",
                    "nationality": "Filipino",
                    "religion": "Catholic",
                    "gradeLevel": "Grade 4"
                },
                "addressContact": {
                    "addressLine": "12 Sample St",
                    "city": "Singapore",
                    "postalCode": "238801",
                    "homePhone": "6555 0000"
                }
            },
            "familyInfo": {
                "motherInfo": {
                    "lastName": "Dela Cruz",
                    "firstName": "Maria",
                    "religion": "Catholic",
                    "email": "mom@example.com",
                    "mobile": "9000 0001"
                }
            },
            "enrollmentInfo": {
                "referrerName": "School Fair",
                "discounts": ["AY260H01EN"]
            },
            "uploadRequirements": {
                "studentUploadRequirements": {
                    "form12": "u/form12.pdf",
                    "medical": "u/medical.pdf",
                    "passport": "u/passport.pdf",
                    "pass": "u/pass.pdf",
                    "birthCert": "u/birth.pdf",
                    "educCert": "u/educ.pdf",
                    "idPicture": "u/id.jpg"
                },
                "parentGuardianUploadRequirements": {
                    "motherPass": "u/mother-pass.pdf",
                    "motherPassType": "EP",
                    "motherPassExpiryDate": "2099-01-31"
                }
            }
        }))
        .expect("deserialize form")
    }

    #[test]
    fn happy_path_writes_all_three_tables() {
        let conn = test_conn();
        let outcome = submit_enrollment(&conn, &test_user(), "2026", EnroleeType::New, &full_form())
            .expect("submit");

        assert_eq!(outcome.student_number, "H260001");
        assert_eq!(outcome.enrolee_number, "E260001");

        let (status, d1, d2, father_name): (String, Option<String>, Option<String>, String) = conn
            .query_row(
                "SELECT application_status, discount_1, discount_2, father_full_name
                 FROM applications_26 WHERE id = ?",
                [outcome.application_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .expect("read application");
        assert_eq!(status, "Submitted");
        assert_eq!(d1.as_deref(), Some("AY260H01EN"));
        assert_eq!(d2, None);
        assert_eq!(father_name, "");

        let statuses: (String, String, String, String, String, String, String) = conn
            .query_row(
                "SELECT form12_status, medical_status, passport_status, pass_status,
                        birth_cert_status, educ_cert_status, id_picture_status
                 FROM documents_26 WHERE student_number = ?",
                [&outcome.student_number],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                    ))
                },
            )
            .expect("read documents");
        assert_eq!(
            statuses,
            (
                "Uploaded".to_string(),
                "Uploaded".to_string(),
                "Uploaded".to_string(),
                "Uploaded".to_string(),
                "Uploaded".to_string(),
                "Uploaded".to_string(),
                "Uploaded".to_string(),
            )
        );

        let mother_pass_status: String = conn
            .query_row(
                "SELECT mother_pass_status FROM documents_26 WHERE student_number = ?",
                [&outcome.student_number],
                |r| r.get(0),
            )
            .expect("read mother pass status");
        assert_eq!(mother_pass_status, "Uploaded");

        let (etype, hist_status): (String, String) = conn
            .query_row(
                "SELECT enrolee_type, application_status FROM status_history_26
                 WHERE enrolee_number = ?",
                [&outcome.enrolee_number],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .expect("read status history");
        assert_eq!(etype, "New");
        assert_eq!(hist_status, "Submitted");
    }

    #[test]
    fn mid_saga_failure_compensates_earlier_writes() {
        let conn = test_conn();
        // Occupy the pair the saga will derive so step 4's insert hits the
        // UNIQUE(student_number, enrolee_number) constraint.
        conn.execute(
            "INSERT INTO documents_26(id, student_number, enrolee_number)
             VALUES('seeded', 'H260001', 'E260001')",
            [],
        )
        .expect("seed conflicting documents row");

        let err = submit_enrollment(&conn, &test_user(), "2026", EnroleeType::New, &full_form())
            .expect_err("submit must fail");
        assert_eq!(err.code, "db_insert_failed");
        let details = err.details.expect("details");
        assert_eq!(details["step"], "insertDocuments");
        assert_eq!(details["compensated"][0], "insertApplication");

        let apps: i64 = conn
            .query_row("SELECT COUNT(*) FROM applications_26", [], |r| r.get(0))
            .expect("count apps");
        assert_eq!(apps, 0);
        let history: i64 = conn
            .query_row("SELECT COUNT(*) FROM status_history_26", [], |r| r.get(0))
            .expect("count history");
        assert_eq!(history, 0);
    }

    #[test]
    fn id_past_number_format_aborts_and_compensates() {
        let conn = test_conn();
        submit_enrollment(&conn, &test_user(), "2026", EnroleeType::New, &full_form())
            .expect("first submit");
        // Next AUTOINCREMENT id will be 10000, past the 4-digit format.
        conn.execute(
            "UPDATE sqlite_sequence SET seq = 9999 WHERE name = 'applications_26'",
            [],
        )
        .expect("seed sequence");

        let mut form = full_form();
        form.student_info.student_details.first_name = "Pedro".to_string();
        let err = submit_enrollment(&conn, &test_user(), "2026", EnroleeType::New, &form)
            .expect_err("id past 9999 must abort");
        assert_eq!(err.code, "id_out_of_range");
        let details = err.details.expect("details");
        assert_eq!(details["step"], "deriveNumbers");
        assert_eq!(details["compensated"][0], "insertApplication");

        let apps: i64 = conn
            .query_row("SELECT COUNT(*) FROM applications_26", [], |r| r.get(0))
            .expect("count apps");
        assert_eq!(apps, 1);
    }

    #[test]
    fn malformed_year_is_a_parameter_error() {
        let conn = test_conn();
        let err = submit_enrollment(&conn, &test_user(), "26", EnroleeType::New, &full_form())
            .expect_err("two-digit year rejected");
        assert_eq!(err.code, "bad_params");
    }

    #[test]
    fn dedup_guard_blocks_second_submission() {
        let conn = test_conn();
        submit_enrollment(&conn, &test_user(), "2026", EnroleeType::New, &full_form())
            .expect("first submit");

        let key = DedupKey {
            full_name: "dela cruz, juan".to_string(),
            birth_date: "2015-06-01".to_string(),
            mother_email: "MOM@EXAMPLE.COM".to_string(),
            father_email: None,
        };
        assert!(already_enrolled(&conn, "2026", &key).expect("guard"));

        let err = submit_enrollment(&conn, &test_user(), "2026", EnroleeType::New, &full_form())
            .expect_err("second submit blocked");
        assert_eq!(err.code, "already_enrolled");

        let apps: i64 = conn
            .query_row("SELECT COUNT(*) FROM applications_26", [], |r| r.get(0))
            .expect("count apps");
        assert_eq!(apps, 1);
    }

    #[test]
    fn dedup_guard_requires_all_three_predicates() {
        let conn = test_conn();
        submit_enrollment(&conn, &test_user(), "2026", EnroleeType::New, &full_form())
            .expect("submit");

        let mismatched_date = DedupKey {
            full_name: "DELA CRUZ, JUAN".to_string(),
            birth_date: "2015-06-02".to_string(),
            mother_email: "mom@example.com".to_string(),
            father_email: None,
        };
        assert!(!already_enrolled(&conn, "2026", &mismatched_date).expect("guard"));

        let mismatched_email = DedupKey {
            full_name: "DELA CRUZ, JUAN".to_string(),
            birth_date: "2015-06-01".to_string(),
            mother_email: "other@example.com".to_string(),
            father_email: Some("also-other@example.com".to_string()),
        };
        assert!(!already_enrolled(&conn, "2026", &mismatched_email).expect("guard"));
    }

    #[test]
    fn rfc3339_birth_dates_normalize_to_school_calendar() {
        // 17:00 UTC on May 31st is already June 1st at UTC+08:00.
        assert_eq!(normalize_date("2015-05-31T17:00:00Z"), "2015-06-01");
        assert_eq!(normalize_date(" 2015-06-01 "), "2015-06-01");
        assert_eq!(normalize_date("junk"), "junk");
    }

    #[test]
    fn expired_mother_pass_blocks_submission() {
        let conn = test_conn();
        let mut form = full_form();
        form.upload_requirements
            .parent_guardian_upload_requirements
            .mother_pass_expiry_date = Some("2001-01-01".to_string());

        let err = submit_enrollment(&conn, &test_user(), "2026", EnroleeType::New, &form)
            .expect_err("expired pass must block");
        assert_eq!(err.code, "validation_failed");
        assert!(err.message.contains("mother's pass"));
    }

    #[test]
    fn slot_batch_skips_absent_parent_roles() {
        let conn = test_conn();
        let outcome = submit_enrollment(&conn, &test_user(), "2026", EnroleeType::Current, &full_form())
            .expect("submit");

        let (father_status, guardian_status): (String, String) = conn
            .query_row(
                "SELECT father_pass_status, guardian_pass_status FROM documents_26
                 WHERE student_number = ?",
                [&outcome.student_number],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .expect("read role statuses");
        assert_eq!(father_status, "Missing");
        assert_eq!(guardian_status, "Missing");
    }
}
