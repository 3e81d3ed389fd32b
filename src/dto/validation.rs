//! Validation helpers for DTOs.

use validator::ValidationError;

const ROOM_ID_MIN: usize = 4;
const ROOM_ID_MAX: usize = 32;

/// Validates that a room id is a lowercase slug of 4 to 32 characters.
///
/// # Examples
///
/// ```ignore
/// validate_room_id("sprint-42")  // Ok
/// validate_room_id("Sprint-42")  // Err - uppercase
/// validate_room_id("ab")         // Err - too short
/// ```
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    if id.len() < ROOM_ID_MIN || id.len() > ROOM_ID_MAX {
        let mut err = ValidationError::new("room_id_length");
        err.message = Some(
            format!(
                "Room id must be {} to {} characters (got {})",
                ROOM_ID_MIN,
                ROOM_ID_MAX,
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        let mut err = ValidationError::new("room_id_format");
        err.message =
            Some("Room id must contain only lowercase letters, digits, and dashes".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_id_valid() {
        assert!(validate_room_id("sprint-42").is_ok());
        assert!(validate_room_id("abcd").is_ok());
        assert!(validate_room_id("a1b2-c3d4").is_ok());
    }

    #[test]
    fn test_validate_room_id_invalid_length() {
        assert!(validate_room_id("abc").is_err()); // too short
        assert!(validate_room_id(&"a".repeat(33)).is_err()); // too long
        assert!(validate_room_id("").is_err()); // empty
    }

    #[test]
    fn test_validate_room_id_invalid_format() {
        assert!(validate_room_id("Sprint-42").is_err()); // uppercase
        assert!(validate_room_id("sprint 42").is_err()); // space
        assert!(validate_room_id("sprint_42").is_err()); // underscore
    }
}
