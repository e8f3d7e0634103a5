//! Password policy: length, character-class, and a small denylist.

const COMMON_PASSWORDS: &[&str] = &[
    "password123!",
    "password1234",
    "qwertyuiop123",
    "letmein12345!",
    "admin12345678",
    "iloveyou12345",
    "welcome123456",
    "solana1234567",
];

pub fn check_password_policy(password: &str) -> Result<(), String> {
    if password.chars().count() < 12 {
        return Err("password must be at least 12 characters".into());
    }
    if password.chars().count() > 128 {
        return Err("password must be at most 128 characters".into());
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(has_lower && has_upper && has_digit && has_symbol) {
        return Err(
            "password must contain lowercase, uppercase, a digit, and a non-alphanumeric character"
                .into(),
        );
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.iter().any(|common| lowered == *common) {
        return Err("password is too common".into());
    }

    let mut run_len = 1usize;
    let chars: Vec<char> = password.chars().collect();
    for window in chars.windows(2) {
        if window[0] == window[1] {
            run_len += 1;
            if run_len >= 6 {
                return Err("password contains a run of 6 or more identical characters".into());
            }
        } else {
            run_len = 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_strong_password() {
        assert!(check_password_policy("Correct-Horse-Battery-9!").is_ok());
    }

    #[test]
    fn rejects_too_short() {
        assert!(check_password_policy("Abc123!").is_err());
    }

    #[test]
    fn rejects_missing_character_classes() {
        assert!(check_password_policy("alllowercase123").is_err());
        assert!(check_password_policy("ALLUPPERCASE123").is_err());
        assert!(check_password_policy("NoDigitsHereAtAll!").is_err());
        assert!(check_password_policy("NoSymbolsHere1234").is_err());
    }

    #[test]
    fn rejects_identical_character_run() {
        assert!(check_password_policy("Aaaaaa1!bbbbbb").is_err());
    }

    #[test]
    fn rejects_common_password() {
        assert!(check_password_policy("Password123!").is_err());
    }
}
