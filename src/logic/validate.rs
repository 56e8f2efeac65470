use crate::model::{BlockSpec, BlockType, NewBlock, RegistrationForm, UnknownBlockType};

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_SEQUENCE_LENGTH: usize = 100;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MIN_PASSWORD_LENGTH: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwertyuiop", "qwerty123", "iloveyou", "sunshine", "princess", "football",
    "baseball", "welcome1", "abc12345", "letmein1", "trustno1", "superman",
    "starwars", "whatever", "passw0rd", "11111111", "00000000", "aaaaaaaa",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    BlockType(#[from] UnknownBlockType),
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be at most {max} characters (got {len})")]
    TooLong { field: &'static str, max: usize, len: usize },
    #[error("{field} must be at least {min} (got {value})")]
    BelowMinimum { field: &'static str, min: i64, value: i64 },
    #[error("{field} is too large (got {value})")]
    TooLarge { field: &'static str, value: i64 },
}

/// Trims a name-like field and checks it is non-empty and short enough.
pub fn clean_name(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, max, len });
    }
    Ok(value.to_string())
}

fn clean_int(field: &'static str, value: i64, min: i64) -> Result<i32, ValidationError> {
    if value < min {
        return Err(ValidationError::BelowMinimum { field, min, value });
    }
    i32::try_from(value).map_err(|_| ValidationError::TooLarge { field, value })
}

/// Validates a block spec and converts it into an insertable block.
///
/// The block type is checked first, then each field against its column
/// constraints, stopping at the first failure.
pub fn clean_block(spec: BlockSpec) -> Result<NewBlock, ValidationError> {
    let block_type: BlockType = spec.block_type.parse()?;
    let sequence = spec.sequence.into_string();
    let sequence = clean_name("sequence", &sequence, MAX_SEQUENCE_LENGTH)?;

    Ok(NewBlock {
        sequence,
        block_type,
        max_time: clean_int("max_time", spec.max_time, 0)?,
        max_time_per_trial: clean_int("max_time_per_trial", spec.max_time_per_trial, 0)?,
        resting_time: clean_int("resting_time", spec.resting_time, 0)?,
        num_trials: clean_int("num_trials", spec.num_trials, 1)?,
    })
}

/// Checks a sign-up form. Returns every problem found, not just the first.
/// Username uniqueness needs the store and is checked by the caller.
pub fn validate_registration(form: &RegistrationForm) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let username = form.username.trim();

    if username.is_empty() {
        errors.push("username: this field is required".to_string());
    } else if username.chars().count() > MAX_USERNAME_LENGTH {
        errors.push(format!(
            "username: ensure this value has at most {} characters",
            MAX_USERNAME_LENGTH
        ));
    } else if !username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        errors.push(
            "username: may contain only letters, numbers, and @/./+/-/_ characters".to_string(),
        );
    }

    if let Some(email) = form.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            errors.push("email: enter a valid email address".to_string());
        }
    }

    if form.password1 != form.password2 {
        errors.push("password2: the two password fields didn't match".to_string());
    } else {
        errors.extend(password_problems(&form.password1, username));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn password_problems(password: &str, username: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let lowered = password.to_lowercase();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "password1: this password is too short, it must contain at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("password1: this password is entirely numeric".to_string());
    }
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("password1: this password is too common".to_string());
    }
    let username = username.to_lowercase();
    if username.chars().count() >= 3 && (lowered.contains(&username) || username.contains(&lowered)) {
        problems.push("password1: the password is too similar to the username".to_string());
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextOrNumber;

    fn spec(block_type: &str) -> BlockSpec {
        BlockSpec {
            sequence: TextOrNumber::Text("41324".to_string()),
            max_time_per_trial: 5,
            resting_time: 10,
            block_type: block_type.to_string(),
            max_time: 30,
            num_trials: 12,
        }
    }

    fn form(username: &str, password1: &str, password2: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.to_string(),
            email: None,
            password1: password1.to_string(),
            password2: password2.to_string(),
        }
    }

    #[test]
    fn test_clean_block_accepts_valid_spec() {
        let block = clean_block(spec("training")).unwrap();
        assert_eq!(block.block_type, BlockType::Training);
        assert_eq!(block.sequence, "41324");
        assert_eq!(block.num_trials, 12);
    }

    #[test]
    fn test_clean_block_rejects_unknown_type() {
        let err = clean_block(spec("warmup")).unwrap_err();
        assert_eq!(err, ValidationError::BlockType(UnknownBlockType("warmup".to_string())));
    }

    #[test]
    fn test_clean_block_field_constraints() {
        let mut negative = spec("test");
        negative.resting_time = -1;
        assert!(matches!(
            clean_block(negative),
            Err(ValidationError::BelowMinimum { field: "resting_time", .. })
        ));

        let mut no_trials = spec("test");
        no_trials.num_trials = 0;
        assert!(matches!(
            clean_block(no_trials),
            Err(ValidationError::BelowMinimum { field: "num_trials", min: 1, .. })
        ));

        let mut huge = spec("test");
        huge.max_time = i64::from(i32::MAX) + 1;
        assert!(matches!(
            clean_block(huge),
            Err(ValidationError::TooLarge { field: "max_time", .. })
        ));

        let mut blank = spec("test");
        blank.sequence = TextOrNumber::Text("   ".to_string());
        assert_eq!(
            clean_block(blank),
            Err(ValidationError::Empty { field: "sequence" })
        );
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("name", "  Pilot  ", 10).unwrap(), "Pilot");
        assert!(matches!(
            clean_name("name", "abcdefghijk", 10),
            Err(ValidationError::TooLong { len: 11, .. })
        ));
    }

    #[test]
    fn test_registration_accepts_good_form() {
        assert!(validate_registration(&form("researcher", "tapping-lab-42", "tapping-lab-42")).is_ok());
    }

    #[test]
    fn test_registration_rejects_bad_passwords() {
        let mismatch = validate_registration(&form("researcher", "tapping-lab-42", "tapping-lab-43"))
            .unwrap_err();
        assert_eq!(mismatch.len(), 1);
        assert!(mismatch[0].contains("didn't match"));

        let short = validate_registration(&form("researcher", "abc", "abc")).unwrap_err();
        assert!(short.iter().any(|e| e.contains("too short")));

        let numeric = validate_registration(&form("researcher", "8675309123", "8675309123")).unwrap_err();
        assert!(numeric.iter().any(|e| e.contains("entirely numeric")));

        let common = validate_registration(&form("researcher", "Password123", "Password123")).unwrap_err();
        assert!(common.iter().any(|e| e.contains("too common")));

        let similar = validate_registration(&form("researcher", "researcher2021", "researcher2021")).unwrap_err();
        assert!(similar.iter().any(|e| e.contains("too similar")));
    }

    #[test]
    fn test_registration_rejects_bad_username() {
        let errors = validate_registration(&form("bad name!", "tapping-lab-42", "tapping-lab-42")).unwrap_err();
        assert!(errors[0].starts_with("username"));

        let errors = validate_registration(&form("", "tapping-lab-42", "tapping-lab-42")).unwrap_err();
        assert!(errors[0].contains("required"));
    }
}
