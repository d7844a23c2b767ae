//! Pure input predicates shared by the ledger and the CSV importer.

pub const KINDS: [&str; 4] = ["deposit", "withdrawal", "expense", "reimbursement"];

pub fn is_valid_kind(kind: &str) -> bool {
    KINDS.contains(&kind.to_lowercase().as_str())
}

pub fn is_valid_date(date: &str) -> bool {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}

/// First validation failure for a transaction payload, or `None` when the
/// payload is acceptable. Amount and description need no checks here: the
/// types already guarantee an integer and text.
pub fn check_transaction_input(kind: &str, date: &str) -> Option<String> {
    if !is_valid_kind(kind) {
        return Some(format!(
            "invalid kind \"{kind}\": expected deposit, withdrawal, expense or reimbursement"
        ));
    }
    if !is_valid_date(date) {
        return Some(format!(
            "invalid date \"{date}\": expected an ISO calendar date (YYYY-MM-DD)"
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_case_insensitive() {
        assert!(is_valid_kind("deposit"));
        assert!(is_valid_kind("Expense"));
        assert!(is_valid_kind("REIMBURSEMENT"));
        assert!(!is_valid_kind("transfer"));
        assert!(!is_valid_kind(""));
    }

    #[test]
    fn test_date_must_be_iso_calendar_date() {
        assert!(is_valid_date("2024-01-05"));
        assert!(is_valid_date("2000-02-29"));
        assert!(!is_valid_date("2023-02-29"));
        assert!(!is_valid_date("05.01.2024"));
        assert!(!is_valid_date("2024-13-01"));
        assert!(!is_valid_date("yesterday"));
    }

    #[test]
    fn test_check_transaction_input_reports_first_failure() {
        assert!(check_transaction_input("expense", "2024-01-05").is_none());
        let msg = check_transaction_input("transfer", "2024-01-05").unwrap();
        assert!(msg.contains("transfer"));
        let msg = check_transaction_input("expense", "not-a-date").unwrap();
        assert!(msg.contains("not-a-date"));
    }
}
