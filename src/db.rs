use anyhow::anyhow;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "enroll.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    Ok(conn)
}

/// Last two digits of a 4-digit academic year, e.g. "2026" -> "26".
/// Table names are derived from this suffix, so reject anything else.
pub fn year_suffix(academic_year: &str) -> anyhow::Result<String> {
    if academic_year.len() != 4 || !academic_year.bytes().all(|b| b.is_ascii_digit()) {
        return Err(anyhow!(
            "academic year must be 4 digits, got '{}'",
            academic_year
        ));
    }
    Ok(academic_year[2..].to_string())
}

pub fn applications_table(academic_year: &str) -> anyhow::Result<String> {
    Ok(format!("applications_{}", year_suffix(academic_year)?))
}

pub fn documents_table(academic_year: &str) -> anyhow::Result<String> {
    Ok(format!("documents_{}", year_suffix(academic_year)?))
}

pub fn status_history_table(academic_year: &str) -> anyhow::Result<String> {
    Ok(format!("status_history_{}", year_suffix(academic_year)?))
}

/// Create the academic-year table family (applications, documents,
/// status history) for the given intake year if it does not exist yet.
pub fn ensure_year_tables(conn: &Connection, academic_year: &str) -> anyhow::Result<()> {
    let yy = year_suffix(academic_year)?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS applications_{yy}(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_number TEXT,
                enrolee_number TEXT,
                application_status TEXT NOT NULL,
                enrolee_type TEXT NOT NULL,
                academic_year TEXT NOT NULL,
                enrolment_date TEXT NOT NULL,
                parent_user_id TEXT NOT NULL,
                parent_email TEXT NOT NULL,
                full_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                first_name TEXT NOT NULL,
                middle_name TEXT NOT NULL DEFAULT '',
                gender TEXT NOT NULL,
                birth_date TEXT NOT NULL,
                nationality TEXT NOT NULL,
                religion TEXT NOT NULL,
                grade_level TEXT NOT NULL,
                previous_school TEXT,
                address_line TEXT NOT NULL,
                city TEXT NOT NULL,
                postal_code TEXT NOT NULL,
                home_phone TEXT NOT NULL,
                referrer_name TEXT NOT NULL,
                mother_full_name TEXT NOT NULL,
                mother_last_name TEXT NOT NULL,
                mother_first_name TEXT NOT NULL,
                mother_middle_name TEXT NOT NULL DEFAULT '',
                mother_religion TEXT NOT NULL,
                mother_email TEXT NOT NULL,
                mother_mobile TEXT NOT NULL,
                mother_occupation TEXT NOT NULL DEFAULT '',
                mother_employer TEXT NOT NULL DEFAULT '',
                father_full_name TEXT NOT NULL DEFAULT '',
                father_last_name TEXT NOT NULL DEFAULT '',
                father_first_name TEXT NOT NULL DEFAULT '',
                father_middle_name TEXT NOT NULL DEFAULT '',
                father_religion TEXT NOT NULL DEFAULT '',
                father_email TEXT NOT NULL DEFAULT '',
                father_mobile TEXT NOT NULL DEFAULT '',
                father_occupation TEXT NOT NULL DEFAULT '',
                father_employer TEXT NOT NULL DEFAULT '',
                guardian_full_name TEXT NOT NULL DEFAULT '',
                guardian_last_name TEXT NOT NULL DEFAULT '',
                guardian_first_name TEXT NOT NULL DEFAULT '',
                guardian_middle_name TEXT NOT NULL DEFAULT '',
                guardian_relationship TEXT NOT NULL DEFAULT '',
                guardian_religion TEXT NOT NULL DEFAULT '',
                guardian_email TEXT NOT NULL DEFAULT '',
                guardian_mobile TEXT NOT NULL DEFAULT '',
                guardian_occupation TEXT NOT NULL DEFAULT '',
                guardian_employer TEXT NOT NULL DEFAULT '',
                sibling_full_name_1 TEXT,
                sibling_birth_day_1 TEXT,
                sibling_religion_1 TEXT,
                sibling_school_company_1 TEXT,
                sibling_education_occupation_1 TEXT,
                sibling_full_name_2 TEXT,
                sibling_birth_day_2 TEXT,
                sibling_religion_2 TEXT,
                sibling_school_company_2 TEXT,
                sibling_education_occupation_2 TEXT,
                sibling_full_name_3 TEXT,
                sibling_birth_day_3 TEXT,
                sibling_religion_3 TEXT,
                sibling_school_company_3 TEXT,
                sibling_education_occupation_3 TEXT,
                sibling_full_name_4 TEXT,
                sibling_birth_day_4 TEXT,
                sibling_religion_4 TEXT,
                sibling_school_company_4 TEXT,
                sibling_education_occupation_4 TEXT,
                sibling_full_name_5 TEXT,
                sibling_birth_day_5 TEXT,
                sibling_religion_5 TEXT,
                sibling_school_company_5 TEXT,
                sibling_education_occupation_5 TEXT,
                discount_1 TEXT,
                discount_2 TEXT,
                discount_3 TEXT,
                discount_4 TEXT,
                discount_5 TEXT
            )"
        ),
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS idx_applications_{yy}_parent
             ON applications_{yy}(parent_user_id)"
        ),
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS idx_applications_{yy}_student_number
             ON applications_{yy}(student_number)"
        ),
        [],
    )?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS documents_{yy}(
                id TEXT PRIMARY KEY,
                student_number TEXT NOT NULL,
                enrolee_number TEXT NOT NULL,
                form12 TEXT,
                form12_status TEXT NOT NULL DEFAULT 'Missing',
                medical TEXT,
                medical_status TEXT NOT NULL DEFAULT 'Missing',
                passport TEXT,
                passport_status TEXT NOT NULL DEFAULT 'Missing',
                pass TEXT,
                pass_status TEXT NOT NULL DEFAULT 'Missing',
                birth_cert TEXT,
                birth_cert_status TEXT NOT NULL DEFAULT 'Missing',
                educ_cert TEXT,
                educ_cert_status TEXT NOT NULL DEFAULT 'Missing',
                id_picture TEXT,
                id_picture_status TEXT NOT NULL DEFAULT 'Missing',
                mother_pass TEXT,
                mother_pass_type TEXT,
                mother_pass_expiry_date TEXT,
                mother_pass_status TEXT NOT NULL DEFAULT 'Missing',
                mother_passport TEXT,
                mother_passport_number TEXT,
                mother_passport_expiry_date TEXT,
                mother_passport_status TEXT NOT NULL DEFAULT 'Missing',
                father_pass TEXT,
                father_pass_type TEXT,
                father_pass_expiry_date TEXT,
                father_pass_status TEXT NOT NULL DEFAULT 'Missing',
                father_passport TEXT,
                father_passport_number TEXT,
                father_passport_expiry_date TEXT,
                father_passport_status TEXT NOT NULL DEFAULT 'Missing',
                guardian_pass TEXT,
                guardian_pass_type TEXT,
                guardian_pass_expiry_date TEXT,
                guardian_pass_status TEXT NOT NULL DEFAULT 'Missing',
                guardian_passport TEXT,
                guardian_passport_number TEXT,
                guardian_passport_expiry_date TEXT,
                guardian_passport_status TEXT NOT NULL DEFAULT 'Missing',
                UNIQUE(student_number, enrolee_number)
            )"
        ),
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS idx_documents_{yy}_student_number
             ON documents_{yy}(student_number)"
        ),
        [],
    )?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS status_history_{yy}(
                id TEXT PRIMARY KEY,
                enrolee_number TEXT NOT NULL,
                enrolment_date TEXT NOT NULL,
                full_name TEXT NOT NULL,
                enrolee_type TEXT NOT NULL,
                application_status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"
        ),
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS idx_status_history_{yy}_enrolee
             ON status_history_{yy}(enrolee_number)"
        ),
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_suffix_accepts_four_digit_years_only() {
        assert_eq!(year_suffix("2026").unwrap(), "26");
        assert!(year_suffix("26").is_err());
        assert!(year_suffix("20266").is_err());
        assert!(year_suffix("20x6").is_err());
    }

    #[test]
    fn ensure_year_tables_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        ensure_year_tables(&conn, "2026").expect("first create");
        ensure_year_tables(&conn, "2026").expect("second create");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN
                   ('applications_26', 'documents_26', 'status_history_26')",
                [],
                |r| r.get(0),
            )
            .expect("count tables");
        assert_eq!(count, 3);
    }
}
