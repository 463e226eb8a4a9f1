use lazy_static::lazy_static;
use regex::Regex;

use crate::actor::InvalidName;

lazy_static! {
    static ref NAME_RGX: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").expect("name regex");
    static ref SEGMENT_RGX: Regex = Regex::new(r"^\$?[a-zA-Z0-9_.-]+$").expect("segment regex");
}

pub fn validate_name(name: &str) -> Result<(), InvalidName> {
    if NAME_RGX.is_match(name) {
        Ok(())
    } else {
        Err(InvalidName { name: name.into() })
    }
}

/// Path segments additionally allow `.` and the `$` prefix used by
/// anonymous actors.
pub fn validate_segment(segment: &str) -> bool {
    SEGMENT_RGX.is_match(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(validate_name("counter-1").is_ok());
        assert!(validate_name("a_b").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a b").is_err());
        assert!(validate_name("*").is_err());
    }

    #[test]
    fn segments() {
        assert!(validate_segment("user"));
        assert!(validate_segment("$anon-42"));
        assert!(!validate_segment("a b"));
        assert!(!validate_segment(""));
    }
}
