use anyhow::anyhow;

use crate::db::year_suffix;

/// Public identifiers derived from an application row's numeric primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedNumbers {
    pub student_number: String,
    pub enrolee_number: String,
}

/// Format the public student/enrollee numbers for a freshly inserted
/// application row. The numeric id comes from the persistence layer
/// (AUTOINCREMENT); this never generates ids itself.
///
/// Ids above 9999 would widen past the fixed 4-digit suffix, so they are
/// rejected instead of silently producing a longer number.
pub fn derive_numbers(academic_year: &str, numeric_id: i64) -> anyhow::Result<DerivedNumbers> {
    if !(1..=9999).contains(&numeric_id) {
        return Err(anyhow!(
            "application id {} is outside the supported range 1..=9999",
            numeric_id
        ));
    }
    let yy = year_suffix(academic_year)?;
    Ok(DerivedNumbers {
        student_number: format!("H{}{:04}", yy, numeric_id),
        enrolee_number: format!("E{}{:04}", yy, numeric_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_share_year_suffix_and_padding() {
        let n = derive_numbers("2026", 1).expect("derive");
        assert_eq!(n.student_number, "H260001");
        assert_eq!(n.enrolee_number, "E260001");

        let n = derive_numbers("2026", 9999).expect("derive max");
        assert_eq!(n.student_number, "H269999");
        assert_eq!(n.enrolee_number, "E269999");

        let n = derive_numbers("2031", 42).expect("derive");
        assert_eq!(n.student_number, "H310042");
        assert_eq!(n.enrolee_number, "E310042");
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        assert!(derive_numbers("2026", 0).is_err());
        assert!(derive_numbers("2026", -3).is_err());
        assert!(derive_numbers("2026", 10000).is_err());
    }

    #[test]
    fn bad_year_is_rejected() {
        assert!(derive_numbers("26", 1).is_err());
    }
}
