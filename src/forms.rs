use serde::Deserialize;
use std::fmt;

pub const MAX_SIBLINGS: usize = 5;
pub const MAX_DISCOUNTS: usize = 5;

/// Nested multi-step wizard state as staged by the portal UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentForm {
    pub student_info: StudentInfo,
    pub family_info: FamilyInfo,
    pub enrollment_info: EnrollmentInfo,
    #[serde(default)]
    pub upload_requirements: UploadRequirements,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub student_details: StudentDetails,
    pub address_contact: AddressContact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetails {
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    pub gender: String,
    pub birth_date: String,
    pub nationality: String,
    pub religion: String,
    #[serde(default)]
    pub other_religion: Option<String>,
    pub grade_level: String,
    #[serde(default)]
    pub previous_school: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressContact {
    pub address_line: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub home_phone: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyInfo {
    pub mother_info: ParentInfo,
    #[serde(default)]
    pub has_father_info: bool,
    #[serde(default)]
    pub father_info: Option<ParentInfo>,
    #[serde(default)]
    pub has_guardian_info: bool,
    #[serde(default)]
    pub guardian_info: Option<GuardianInfo>,
    #[serde(default)]
    pub siblings_info: Vec<SiblingInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentInfo {
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    #[serde(default)]
    pub religion: String,
    #[serde(default)]
    pub other_religion: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub employer: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianInfo {
    #[serde(default)]
    pub relationship: String,
    #[serde(flatten)]
    pub parent: ParentInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingInfo {
    pub full_name: String,
    #[serde(default)]
    pub birth_day: String,
    #[serde(default)]
    pub religion: String,
    #[serde(default)]
    pub school_company: String,
    #[serde(default)]
    pub education_occupation: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentInfo {
    #[serde(default)]
    pub referrer_name: String,
    #[serde(default)]
    pub discounts: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequirements {
    #[serde(default)]
    pub student_upload_requirements: StudentUploads,
    #[serde(default)]
    pub parent_guardian_upload_requirements: ParentUploads,
}

/// URLs returned by the upload step for the 7 student-owned slots.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentUploads {
    pub form12: Option<String>,
    pub medical: Option<String>,
    pub passport: Option<String>,
    pub pass: Option<String>,
    pub birth_cert: Option<String>,
    pub educ_cert: Option<String>,
    pub id_picture: Option<String>,
}

/// Pass/passport slots plus metadata for each parent role.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentUploads {
    pub mother_pass: Option<String>,
    pub mother_pass_type: Option<String>,
    pub mother_pass_expiry_date: Option<String>,
    pub mother_passport: Option<String>,
    pub mother_passport_number: Option<String>,
    pub mother_passport_expiry_date: Option<String>,
    pub father_pass: Option<String>,
    pub father_pass_type: Option<String>,
    pub father_pass_expiry_date: Option<String>,
    pub father_passport: Option<String>,
    pub father_passport_number: Option<String>,
    pub father_passport_expiry_date: Option<String>,
    pub guardian_pass: Option<String>,
    pub guardian_pass_type: Option<String>,
    pub guardian_pass_expiry_date: Option<String>,
    pub guardian_passport: Option<String>,
    pub guardian_passport_number: Option<String>,
    pub guardian_passport_expiry_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FormError {
    pub message: String,
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FormError {}

fn form_err(message: impl Into<String>) -> FormError {
    FormError {
        message: message.into(),
    }
}

/// One parent role's columns on the flattened application row.
/// Absent roles keep every field as an empty string so the columns
/// always exist regardless of which family members were entered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentColumns {
    pub full_name: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub religion: String,
    pub email: String,
    pub mobile: String,
    pub occupation: String,
    pub employer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiblingColumns {
    pub full_name: String,
    pub birth_day: String,
    pub religion: String,
    pub school_company: String,
    pub education_occupation: String,
}

/// Flat record matching the applications table columns.
#[derive(Debug, Clone)]
pub struct ApplicationRow {
    pub full_name: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub gender: String,
    pub birth_date: String,
    pub nationality: String,
    pub religion: String,
    pub grade_level: String,
    pub previous_school: Option<String>,
    pub address_line: String,
    pub city: String,
    pub postal_code: String,
    pub home_phone: String,
    pub referrer_name: String,
    pub mother: ParentColumns,
    pub father: ParentColumns,
    pub guardian: ParentColumns,
    pub guardian_relationship: String,
    pub siblings: Vec<SiblingColumns>,
    pub discounts: Vec<String>,
    pub has_father_info: bool,
    pub has_guardian_info: bool,
}

/// `"LAST, FIRST, MIDDLE"` in upper case; the middle segment is omitted
/// when blank.
pub fn compose_full_name(last: &str, first: &str, middle: &str) -> String {
    let last = last.trim().to_uppercase();
    let first = first.trim().to_uppercase();
    let middle = middle.trim().to_uppercase();
    if middle.is_empty() {
        format!("{}, {}", last, first)
    } else {
        format!("{}, {}, {}", last, first, middle)
    }
}

/// Canonicalize "other, please specify" religion inputs: a non-blank
/// free-text override replaces the enum value and is dropped.
fn effective_religion(religion: &str, other: &Option<String>) -> String {
    match other {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => religion.trim().to_string(),
    }
}

fn parent_columns(info: &ParentInfo) -> ParentColumns {
    ParentColumns {
        full_name: compose_full_name(&info.last_name, &info.first_name, &info.middle_name),
        last_name: info.last_name.trim().to_string(),
        first_name: info.first_name.trim().to_string(),
        middle_name: info.middle_name.trim().to_string(),
        religion: effective_religion(&info.religion, &info.other_religion),
        email: info.email.trim().to_string(),
        mobile: info.mobile.trim().to_string(),
        occupation: info.occupation.trim().to_string(),
        employer: info.employer.trim().to_string(),
    }
}

/// Merge the nested wizard state into one flat record matching the
/// applications table. Pure transform; validation failures carry the
/// user-facing message.
pub fn flatten_application(form: &EnrollmentForm) -> Result<ApplicationRow, FormError> {
    let details = &form.student_info.student_details;
    let address = &form.student_info.address_contact;
    let family = &form.family_info;
    let enrollment = &form.enrollment_info;

    if details.last_name.trim().is_empty() || details.first_name.trim().is_empty() {
        return Err(form_err("student name is required"));
    }
    if enrollment.referrer_name.trim().is_empty() {
        return Err(form_err("referrer name is required"));
    }
    if family.mother_info.email.trim().is_empty() {
        return Err(form_err("mother's email is required"));
    }
    if family.siblings_info.len() > MAX_SIBLINGS {
        return Err(form_err(format!(
            "at most {} siblings are supported, got {}",
            MAX_SIBLINGS,
            family.siblings_info.len()
        )));
    }
    if enrollment.discounts.len() > MAX_DISCOUNTS {
        return Err(form_err(format!(
            "at most {} discounts are supported, got {}",
            MAX_DISCOUNTS,
            enrollment.discounts.len()
        )));
    }
    if family.has_father_info && family.father_info.is_none() {
        return Err(form_err("father info flagged as present but missing"));
    }
    if family.has_guardian_info && family.guardian_info.is_none() {
        return Err(form_err("guardian info flagged as present but missing"));
    }

    // Father/guardian columns are pre-seeded empty and only overwritten
    // when that role's presence flag is set.
    let father = match (&family.father_info, family.has_father_info) {
        (Some(info), true) => parent_columns(info),
        _ => ParentColumns::default(),
    };
    let (guardian, guardian_relationship) = match (&family.guardian_info, family.has_guardian_info)
    {
        (Some(info), true) => (
            parent_columns(&info.parent),
            info.relationship.trim().to_string(),
        ),
        _ => (ParentColumns::default(), String::new()),
    };

    let siblings = family
        .siblings_info
        .iter()
        .map(|s| SiblingColumns {
            full_name: s.full_name.trim().to_string(),
            birth_day: s.birth_day.trim().to_string(),
            religion: s.religion.trim().to_string(),
            school_company: s.school_company.trim().to_string(),
            education_occupation: s.education_occupation.trim().to_string(),
        })
        .collect();

    Ok(ApplicationRow {
        full_name: compose_full_name(&details.last_name, &details.first_name, ""),
        last_name: details.last_name.trim().to_string(),
        first_name: details.first_name.trim().to_string(),
        middle_name: details.middle_name.trim().to_string(),
        gender: details.gender.trim().to_string(),
        birth_date: details.birth_date.trim().to_string(),
        nationality: details.nationality.trim().to_string(),
        religion: effective_religion(&details.religion, &details.other_religion),
        grade_level: details.grade_level.trim().to_string(),
        previous_school: details
            .previous_school
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        address_line: address.address_line.trim().to_string(),
        city: address.city.trim().to_string(),
        postal_code: address.postal_code.trim().to_string(),
        home_phone: address.home_phone.trim().to_string(),
        referrer_name: enrollment.referrer_name.trim().to_string(),
        mother: parent_columns(&family.mother_info),
        father,
        guardian,
        guardian_relationship,
        siblings,
        discounts: enrollment
            .discounts
            .iter()
            .map(|d| d.trim().to_string())
            .collect(),
        has_father_info: family.has_father_info,
        has_guardian_info: family.has_guardian_info,
    })
}
