use serde_json::json;

use crate::forms::EnrollmentForm;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    bad_params, ensure_year_tables, get_opt_str, get_required_str, require_db, require_session,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::submit::{already_enrolled, submit_enrollment, DedupKey, EnroleeType};

const DRAFT_FLOWS: [&str; 2] = ["new", "existing"];

fn get_flow(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let flow = get_required_str(params, "flow")?;
    if !DRAFT_FLOWS.contains(&flow.as_str()) {
        return Err(bad_params("flow must be one of: new, existing"));
    }
    Ok(flow)
}

fn handle_draft_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let flow = match get_flow(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(draft) = req.params.get("state") else {
        return err(&req.id, "bad_params", "missing state", None);
    };
    if !draft.is_object() {
        return err(&req.id, "bad_params", "state must be an object", None);
    }

    state.drafts.insert(flow.clone(), draft.clone());
    ok(&req.id, json!({ "flow": flow, "saved": true }))
}

fn handle_draft_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let flow = match get_flow(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let draft = state.drafts.get(&flow).cloned();
    ok(&req.id, json!({ "flow": flow, "state": draft }))
}

fn handle_draft_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let flow = match get_flow(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    // Idempotent: clearing an absent draft is a no-op.
    state.drafts.remove(&flow);
    ok(&req.id, json!({ "flow": flow, "cleared": true }))
}

fn handle_check_existing(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let academic_year = match get_required_str(&req.params, "academicYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let full_name = match get_required_str(&req.params, "fullName") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let birth_date = match get_required_str(&req.params, "birthDate") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let mother_email = match get_required_str(&req.params, "motherEmail") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let father_email = get_opt_str(&req.params, "fatherEmail");

    if let Err(e) = ensure_year_tables(conn, &academic_year) {
        return e.response(&req.id);
    }

    let key = DedupKey {
        full_name,
        birth_date,
        mother_email,
        father_email,
    };
    match already_enrolled(conn, &academic_year, &key) {
        Ok(found) => ok(&req.id, json!({ "alreadyEnrolled": found })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_submit(
    state: &mut AppState,
    req: &Request,
    enrolee_type: EnroleeType,
    flow: &str,
) -> serde_json::Value {
    let session = match require_session(state) {
        Ok(u) => u,
        Err(e) => return e.response(&req.id),
    };
    let academic_year = match get_required_str(&req.params, "academicYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(form_value) = req.params.get("form") else {
        return err(&req.id, "bad_params", "missing form", None);
    };
    let form: EnrollmentForm = match serde_json::from_value(form_value.clone()) {
        Ok(f) => f,
        Err(e) => return err(&req.id, "bad_params", format!("invalid form: {}", e), None),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };

    match submit_enrollment(conn, &session, &academic_year, enrolee_type, &form) {
        Ok(outcome) => {
            state.drafts.remove(flow);
            ok(
                &req.id,
                json!({
                    "applicationId": outcome.application_id,
                    "studentNumber": outcome.student_number,
                    "enroleeNumber": outcome.enrolee_number,
                    "applicationStatus": "Submitted"
                }),
            )
        }
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollment.draft.save" => Some(handle_draft_save(state, req)),
        "enrollment.draft.get" => Some(handle_draft_get(state, req)),
        "enrollment.draft.clear" => Some(handle_draft_clear(state, req)),
        "enrollment.checkExisting" => Some(handle_check_existing(state, req)),
        "enrollment.submitNew" => Some(handle_submit(state, req, EnroleeType::New, "new")),
        "enrollment.submitExisting" => {
            Some(handle_submit(state, req, EnroleeType::Current, "existing"))
        }
        _ => None,
    }
}
