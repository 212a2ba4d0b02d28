use rusqlite::{OptionalExtension, Row};
use serde_json::json;

use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bad_params, ensure_year_tables, get_required_str, require_db, require_session, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn year_table(academic_year: &str) -> Result<String, HandlerErr> {
    db::applications_table(academic_year).map_err(|e| bad_params(e.to_string()))
}

fn handle_applications_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    if let Err(e) = ensure_year_tables(conn, &academic_year) {
        return e.response(&req.id);
    }
    let table = match year_table(&academic_year) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(&format!(
        "SELECT id, student_number, enrolee_number, full_name, grade_level,
                enrolee_type, application_status, enrolment_date
         FROM {table}
         WHERE parent_user_id = ?
         ORDER BY id"
    )) {
        Ok(s) => s,
        Err(e) => {
            return HandlerErr {
                code: "db_query_failed",
                message: e.to_string(),
                details: None,
            }
            .response(&req.id)
        }
    };

    let rows = stmt
        .query_map([&session.id], |row| {
            Ok(json!({
                "applicationId": row.get::<_, i64>(0)?,
                "studentNumber": row.get::<_, Option<String>>(1)?,
                "enroleeNumber": row.get::<_, Option<String>>(2)?,
                "fullName": row.get::<_, String>(3)?,
                "gradeLevel": row.get::<_, String>(4)?,
                "enroleeType": row.get::<_, String>(5)?,
                "applicationStatus": row.get::<_, String>(6)?,
                "enrolmentDate": row.get::<_, String>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(applications) => ok(&req.id, json!({ "applications": applications })),
        Err(e) => HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
        .response(&req.id),
    }
}

fn discounts_json(row: &Row, base: usize) -> rusqlite::Result<Vec<String>> {
    let mut out = Vec::new();
    for i in 0..5 {
        if let Some(v) = row.get::<_, Option<String>>(base + i)? {
            out.push(v);
        }
    }
    Ok(out)
}

fn handle_applications_get(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let table = match year_table(&academic_year) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };

    let row = conn
        .query_row(
            &format!(
                "SELECT id, student_number, enrolee_number, application_status, enrolee_type,
                        academic_year, enrolment_date, full_name, last_name, first_name,
                        middle_name, gender, birth_date, nationality, religion, grade_level,
                        previous_school, address_line, city, postal_code, home_phone,
                        referrer_name,
                        discount_1, discount_2, discount_3, discount_4, discount_5
                 FROM {table}
                 WHERE student_number = ? AND parent_user_id = ?"
            ),
            (&student_number, &session.id),
            |row| {
                Ok(json!({
                    "applicationId": row.get::<_, i64>(0)?,
                    "studentNumber": row.get::<_, Option<String>>(1)?,
                    "enroleeNumber": row.get::<_, Option<String>>(2)?,
                    "applicationStatus": row.get::<_, String>(3)?,
                    "enroleeType": row.get::<_, String>(4)?,
                    "academicYear": row.get::<_, String>(5)?,
                    "enrolmentDate": row.get::<_, String>(6)?,
                    "fullName": row.get::<_, String>(7)?,
                    "lastName": row.get::<_, String>(8)?,
                    "firstName": row.get::<_, String>(9)?,
                    "middleName": row.get::<_, String>(10)?,
                    "gender": row.get::<_, String>(11)?,
                    "birthDate": row.get::<_, String>(12)?,
                    "nationality": row.get::<_, String>(13)?,
                    "religion": row.get::<_, String>(14)?,
                    "gradeLevel": row.get::<_, String>(15)?,
                    "previousSchool": row.get::<_, Option<String>>(16)?,
                    "addressLine": row.get::<_, String>(17)?,
                    "city": row.get::<_, String>(18)?,
                    "postalCode": row.get::<_, String>(19)?,
                    "homePhone": row.get::<_, String>(20)?,
                    "referrerName": row.get::<_, String>(21)?,
                    "discounts": discounts_json(row, 22)?,
                }))
            },
        )
        .optional();

    match row {
        Ok(Some(application)) => ok(&req.id, json!({ "application": application })),
        Ok(None) => HandlerErr {
            code: "not_found",
            message: "application not found".to_string(),
            details: None,
        }
        .response(&req.id),
        Err(e) => HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
        .response(&req.id),
    }
}

fn parent_json(row: &Row, base: usize) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "fullName": row.get::<_, String>(base)?,
        "lastName": row.get::<_, String>(base + 1)?,
        "firstName": row.get::<_, String>(base + 2)?,
        "middleName": row.get::<_, String>(base + 3)?,
        "religion": row.get::<_, String>(base + 4)?,
        "email": row.get::<_, String>(base + 5)?,
        "mobile": row.get::<_, String>(base + 6)?,
        "occupation": row.get::<_, String>(base + 7)?,
        "employer": row.get::<_, String>(base + 8)?,
    }))
}

fn handle_family_get(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let table = match year_table(&academic_year) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };

    let row = conn
        .query_row(
            &format!(
                "SELECT mother_full_name, mother_last_name, mother_first_name,
                        mother_middle_name, mother_religion, mother_email, mother_mobile,
                        mother_occupation, mother_employer,
                        father_full_name, father_last_name, father_first_name,
                        father_middle_name, father_religion, father_email, father_mobile,
                        father_occupation, father_employer,
                        guardian_full_name, guardian_last_name, guardian_first_name,
                        guardian_middle_name, guardian_religion, guardian_email,
                        guardian_mobile, guardian_occupation, guardian_employer,
                        guardian_relationship,
                        sibling_full_name_1, sibling_birth_day_1, sibling_religion_1,
                        sibling_school_company_1, sibling_education_occupation_1,
                        sibling_full_name_2, sibling_birth_day_2, sibling_religion_2,
                        sibling_school_company_2, sibling_education_occupation_2,
                        sibling_full_name_3, sibling_birth_day_3, sibling_religion_3,
                        sibling_school_company_3, sibling_education_occupation_3,
                        sibling_full_name_4, sibling_birth_day_4, sibling_religion_4,
                        sibling_school_company_4, sibling_education_occupation_4,
                        sibling_full_name_5, sibling_birth_day_5, sibling_religion_5,
                        sibling_school_company_5, sibling_education_occupation_5
                 FROM {table}
                 WHERE student_number = ? AND parent_user_id = ?"
            ),
            (&student_number, &session.id),
            |row| {
                let mother = parent_json(row, 0)?;
                let father = parent_json(row, 9)?;
                let mut guardian = parent_json(row, 18)?;
                guardian["relationship"] = json!(row.get::<_, String>(27)?);

                // Presence is inferred from the composed full name: it is
                // only ever set when that role's data was entered.
                let has_father = father["fullName"].as_str().is_some_and(|s| !s.is_empty());
                let has_guardian = guardian["fullName"].as_str().is_some_and(|s| !s.is_empty());

                let mut siblings = Vec::new();
                for i in 0..5 {
                    let base = 28 + i * 5;
                    let full_name: Option<String> = row.get(base)?;
                    let Some(full_name) = full_name.filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    siblings.push(json!({
                        "fullName": full_name,
                        "birthDay": row.get::<_, Option<String>>(base + 1)?,
                        "religion": row.get::<_, Option<String>>(base + 2)?,
                        "schoolCompany": row.get::<_, Option<String>>(base + 3)?,
                        "educationOccupation": row.get::<_, Option<String>>(base + 4)?,
                    }));
                }

                Ok(json!({
                    "motherInfo": mother,
                    "fatherInfo": if has_father { father } else { serde_json::Value::Null },
                    "guardianInfo": if has_guardian { guardian } else { serde_json::Value::Null },
                    "hasFatherInfo": has_father,
                    "hasGuardianInfo": has_guardian,
                    "siblings": siblings,
                }))
            },
        )
        .optional();

    match row {
        Ok(Some(family)) => ok(&req.id, json!({ "family": family })),
        Ok(None) => HandlerErr {
            code: "not_found",
            message: "application not found".to_string(),
            details: None,
        }
        .response(&req.id),
        Err(e) => HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
        .response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "applications.list" => Some(handle_applications_list(state, req)),
        "applications.get" => Some(handle_applications_get(state, req)),
        "family.get" => Some(handle_family_get(state, req)),
        _ => None,
    }
}
