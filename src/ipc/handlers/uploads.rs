use std::path::PathBuf;

use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{bad_params, get_required_str};
use crate::ipc::types::{AppState, Request};

const UPLOADS_DIR: &str = "uploads";

const UPLOAD_ROLES: [&str; 4] = ["student", "mother", "father", "guardian"];

fn sanitize_doc_type(doc_type: &str) -> Result<String, String> {
    let cleaned: String = doc_type
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if cleaned.is_empty() {
        return Err("docType must contain letters or digits".to_string());
    }
    Ok(cleaned)
}

/// Stage a local file into the workspace's uploads directory and hand back
/// a workspace-relative URL for the document slots. The stored name is
/// unique per call so re-uploads never clobber an earlier file.
fn handle_uploads_store(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let source_path = match get_required_str(&req.params, "sourcePath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let role = match get_required_str(&req.params, "role") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if !UPLOAD_ROLES.contains(&role.as_str()) {
        return bad_params("role must be one of: student, mother, father, guardian")
            .response(&req.id);
    }
    let doc_type = match get_required_str(&req.params, "docType") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let doc_type = match sanitize_doc_type(&doc_type) {
        Ok(v) => v,
        Err(m) => return bad_params(m).response(&req.id),
    };

    let src = PathBuf::from(&source_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "source file not found",
            Some(json!({ "path": source_path })),
        );
    }

    let bytes = match std::fs::read(&src) {
        Ok(b) => b,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": source_path })),
            )
        }
    };
    let digest = Sha256::digest(&bytes);
    let sha256 = format!("{:x}", digest);

    let ext = src
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    let file_name = format!("{}-{}-{}{}", role, doc_type, Uuid::new_v4(), ext);

    let uploads_dir = workspace.join(UPLOADS_DIR);
    if let Err(e) = std::fs::create_dir_all(&uploads_dir) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": uploads_dir.to_string_lossy() })),
        );
    }
    let dst = uploads_dir.join(&file_name);
    if let Err(e) = std::fs::write(&dst, &bytes) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": dst.to_string_lossy() })),
        );
    }

    ok(
        &req.id,
        json!({
            "path": format!("{}/{}", UPLOADS_DIR, file_name),
            "fileName": file_name,
            "sha256": sha256,
            "size": bytes.len(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "uploads.store" => Some(handle_uploads_store(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_is_reduced_to_alphanumerics() {
        assert_eq!(sanitize_doc_type("birth-cert").unwrap(), "birthcert");
        assert_eq!(sanitize_doc_type("Form12").unwrap(), "Form12");
        assert!(sanitize_doc_type("../..").is_err());
    }
}
