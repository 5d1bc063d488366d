//! Password policy.
//!
//! A [`PasswordValidators`] registry runs every registered
//! [`PasswordValidator`] against a candidate and reports all violations
//! together.
//!
//! # Validators
//!
//! - [`MinimumLengthValidator`] - Enforces a minimum number of characters
//! - [`UserAttributeSimilarityValidator`] - Rejects passwords resembling principal attributes
//! - [`CommonPasswordValidator`] - Rejects common passwords
//! - [`NumericPasswordValidator`] - Rejects all-numeric passwords

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use central_core::error::{CentralResult, ValidationError};
use central_core::settings::PasswordPolicySettings;

use crate::principal::Principal;

/// A single password rule.
pub trait PasswordValidator: Send + Sync {
    /// Checks `password`, returning the violation message on failure.
    ///
    /// `principal` is the account the password is for, when known.
    fn validate(&self, password: &str, principal: Option<&Principal>) -> Result<(), String>;

    /// Describes the rule to end users.
    fn help_text(&self) -> String;
}

/// Requires at least `min_length` characters.
#[derive(Debug, Clone, Copy)]
pub struct MinimumLengthValidator {
    pub min_length: usize,
}

impl Default for MinimumLengthValidator {
    fn default() -> Self {
        Self { min_length: 6 }
    }
}

impl PasswordValidator for MinimumLengthValidator {
    fn validate(&self, password: &str, _principal: Option<&Principal>) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            Err(format!(
                "This password is too short. It must contain at least {} characters.",
                self.min_length
            ))
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        format!(
            "Your password must contain at least {} characters.",
            self.min_length
        )
    }
}

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Rejects passwords too similar to the principal's own attributes.
///
/// Each attribute value is compared whole and split on non-word characters,
/// so `jane.doe@example.com` also guards `jane`, `doe` and `example`.
#[derive(Debug, Clone)]
pub struct UserAttributeSimilarityValidator {
    /// Attribute names looked up through [`Principal::attribute`].
    pub user_attributes: Vec<String>,
    /// Similarity ratio (0.0 to 1.0) at which a password is rejected.
    pub max_similarity: f64,
}

impl Default for UserAttributeSimilarityValidator {
    fn default() -> Self {
        Self {
            user_attributes: vec![
                "email".to_string(),
                "first_name".to_string(),
                "last_name".to_string(),
            ],
            max_similarity: 0.7,
        }
    }
}

impl PasswordValidator for UserAttributeSimilarityValidator {
    fn validate(&self, password: &str, principal: Option<&Principal>) -> Result<(), String> {
        let Some(principal) = principal else {
            return Ok(());
        };
        let password = password.to_lowercase();

        for name in &self.user_attributes {
            let Some(value) = principal.attribute(name).filter(|v| !v.is_empty()) else {
                continue;
            };
            let value = value.to_lowercase();
            let parts = NON_WORD
                .split(&value)
                .chain(std::iter::once(value.as_str()));

            for part in parts {
                if exceeds_maximum_length_ratio(&password, self.max_similarity, part) {
                    continue;
                }
                if quick_ratio(&password, part) >= self.max_similarity {
                    return Err(format!(
                        "The password is too similar to the {}.",
                        name.replace('_', " ")
                    ));
                }
            }
        }
        Ok(())
    }

    fn help_text(&self) -> String {
        "Your password can't be too similar to your other personal information.".to_string()
    }
}

/// A value far shorter than the password cannot reach the similarity bound.
#[allow(clippy::cast_precision_loss)]
fn exceeds_maximum_length_ratio(password: &str, max_similarity: f64, value: &str) -> bool {
    let pwd_len = password.chars().count();
    let value_len = value.chars().count();
    let length_bound_similarity = max_similarity / 2.0 * pwd_len as f64;
    pwd_len >= 10 * value_len && (value_len as f64) < length_bound_similarity
}

/// Upper bound on the matching-blocks ratio: `2 * M / T` where `M` counts
/// characters the two strings share (as multisets) and `T` is their total length.
#[allow(clippy::cast_precision_loss)]
fn quick_ratio(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *available.entry(c).or_default() += 1;
    }
    let mut matches = 0usize;
    for c in a.chars() {
        if let Some(count) = available.get_mut(&c) {
            if *count > 0 {
                *count -= 1;
                matches += 1;
            }
        }
    }
    2.0 * matches as f64 / total as f64
}

const COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "696969", "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890",
    "michael", "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx",
    "123qwe", "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter",
    "buster", "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou",
    "2000", "charlie", "robert", "thomas", "hockey", "ranger", "daniel", "starwars",
    "klaster", "112233", "george", "computer", "michelle", "jessica", "pepper", "1111",
    "zxcvbn", "555555", "11111111", "131313", "freedom", "777777", "pass", "maggie",
    "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese", "amanda", "summer",
    "love", "ashley", "nicole", "chelsea", "biteme", "matthew", "access", "yankees",
    "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "admin", "password1",
    "welcome", "secret", "qwerty123", "passw0rd", "changeme", "letmein1", "test", "hello",
];

/// Rejects passwords found in a common-password list (case-insensitive).
#[derive(Debug, Clone)]
pub struct CommonPasswordValidator {
    passwords: HashSet<String>,
}

impl Default for CommonPasswordValidator {
    fn default() -> Self {
        Self::with_passwords(COMMON_PASSWORDS.iter().copied())
    }
}

impl CommonPasswordValidator {
    /// Builds a validator from a custom list.
    pub fn with_passwords<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            passwords: passwords
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .collect(),
        }
    }
}

impl PasswordValidator for CommonPasswordValidator {
    fn validate(&self, password: &str, _principal: Option<&Principal>) -> Result<(), String> {
        if self.passwords.contains(&password.trim().to_lowercase()) {
            Err("This password is too common.".to_string())
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        "Your password can't be a commonly used password.".to_string()
    }
}

/// Rejects passwords made only of digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericPasswordValidator;

impl PasswordValidator for NumericPasswordValidator {
    fn validate(&self, password: &str, _principal: Option<&Principal>) -> Result<(), String> {
        if !password.is_empty() && password.chars().all(char::is_numeric) {
            Err("This password is entirely numeric.".to_string())
        } else {
            Ok(())
        }
    }

    fn help_text(&self) -> String {
        "Your password can't be entirely numeric.".to_string()
    }
}

/// Ordered collection of password rules.
#[derive(Clone, Default)]
pub struct PasswordValidators {
    validators: Vec<Arc<dyn PasswordValidator>>,
}

impl std::fmt::Debug for PasswordValidators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordValidators")
            .field("len", &self.validators.len())
            .finish()
    }
}

impl PasswordValidators {
    /// Creates an empty registry. Every password passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the configured rule chain: minimum length, attribute
    /// similarity, common passwords, all-numeric.
    pub fn from_settings(policy: &PasswordPolicySettings) -> Self {
        let mut validators = Self::new();
        validators.register(MinimumLengthValidator {
            min_length: policy.min_length,
        });
        if !policy.user_attributes.is_empty() {
            validators.register(UserAttributeSimilarityValidator {
                user_attributes: policy.user_attributes.clone(),
                max_similarity: policy.max_similarity,
            });
        }
        if policy.reject_common {
            validators.register(CommonPasswordValidator::default());
        }
        if policy.reject_numeric {
            validators.register(NumericPasswordValidator);
        }
        validators
    }

    /// Appends a rule to the chain.
    pub fn register(&mut self, validator: impl PasswordValidator + 'static) -> &mut Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns `true` when no rule is registered.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Runs every rule. Fails with one non-field message per violated rule.
    pub fn validate(&self, password: &str, principal: Option<&Principal>) -> CentralResult<()> {
        let errors: Vec<String> = self
            .validators
            .iter()
            .filter_map(|v| v.validate(password, principal).err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::from_messages(errors).into())
        }
    }

    /// Help texts of every rule, in order.
    pub fn help_texts(&self) -> Vec<String> {
        self.validators.iter().map(|v| v.help_text()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::PrincipalKind;
    use central_core::CentralError;

    fn principal() -> Principal {
        Principal::new(PrincipalKind::Client, "jane.doe@example.com").with_names("Jane", "Doe")
    }

    fn messages(result: CentralResult<()>) -> Vec<String> {
        match result {
            Err(CentralError::ValidationError(err)) => err.messages,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    // ── Individual rules ─────────────────────────────────────────────

    #[test]
    fn test_minimum_length_counts_characters() {
        let v = MinimumLengthValidator { min_length: 6 };
        assert!(v.validate("abcde", None).is_err());
        assert!(v.validate("abcdef", None).is_ok());
        assert!(v.validate("ééééé", None).is_err());
        assert!(v.help_text().contains('6'));
    }

    #[test]
    fn test_common_password() {
        let v = CommonPasswordValidator::default();
        assert_eq!(v.validate("Password", None).unwrap_err(), "This password is too common.");
        assert!(v.validate(" qwerty ", None).is_err());
        assert!(v.validate("correct horse battery", None).is_ok());
    }

    #[test]
    fn test_common_password_custom_list() {
        let v = CommonPasswordValidator::with_passwords(["Central2024"]);
        assert!(v.validate("central2024", None).is_err());
        assert!(v.validate("password", None).is_ok());
    }

    #[test]
    fn test_numeric_password() {
        let v = NumericPasswordValidator;
        assert!(v.validate("12345678", None).is_err());
        assert!(v.validate("1234567a", None).is_ok());
        assert!(v.validate("", None).is_ok());
    }

    #[test]
    fn test_similarity_to_email() {
        let v = UserAttributeSimilarityValidator {
            user_attributes: vec!["email".into()],
            max_similarity: 0.7,
        };
        let p = principal();
        assert_eq!(
            v.validate("jane.doe@example.com", Some(&p)).unwrap_err(),
            "The password is too similar to the email."
        );
        assert!(v.validate("janedoe", Some(&p)).is_err());
        assert!(v.validate("v8#kLq2!wz", Some(&p)).is_ok());
    }

    #[test]
    fn test_similarity_skipped_without_principal() {
        let v = UserAttributeSimilarityValidator::default();
        assert!(v.validate("jane.doe@example.com", None).is_ok());
    }

    #[test]
    fn test_similarity_short_part_ignored_for_long_password() {
        let mut p = principal();
        p.first_name = "Al".into();
        let v = UserAttributeSimilarityValidator {
            user_attributes: vec!["first_name".into()],
            max_similarity: 0.7,
        };
        // "al" is far shorter than the password, so it cannot be too similar.
        assert!(v.validate("alphabetical-soup-xyz", Some(&p)).is_ok());
    }

    #[test]
    fn test_quick_ratio() {
        assert!((quick_ratio("abcd", "bcde") - 0.75).abs() < f64::EPSILON);
        assert!((quick_ratio("abc", "abc") - 1.0).abs() < f64::EPSILON);
        assert!(quick_ratio("abc", "xyz").abs() < f64::EPSILON);
    }

    // ── Registry ─────────────────────────────────────────────────────

    #[test]
    fn test_registry_aggregates_all_violations() {
        let validators = PasswordValidators::from_settings(&PasswordPolicySettings::default());
        let msgs = messages(validators.validate("123", Some(&principal())));
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].contains("too short"));
        assert!(msgs[1].contains("entirely numeric"));
    }

    #[test]
    fn test_registry_accepts_good_password() {
        let validators = PasswordValidators::from_settings(&PasswordPolicySettings::default());
        assert!(validators.validate("Tr0ub4dor&3", Some(&principal())).is_ok());
    }

    #[test]
    fn test_registry_respects_policy_switches() {
        let policy = PasswordPolicySettings {
            user_attributes: vec![],
            reject_common: false,
            reject_numeric: false,
            ..PasswordPolicySettings::default()
        };
        let validators = PasswordValidators::from_settings(&policy);
        assert_eq!(validators.len(), 1);
        assert!(validators.validate("123456", None).is_ok());
    }

    struct NoSpaces;

    impl PasswordValidator for NoSpaces {
        fn validate(&self, password: &str, _principal: Option<&Principal>) -> Result<(), String> {
            if password.contains(' ') {
                Err("This password contains spaces.".to_string())
            } else {
                Ok(())
            }
        }

        fn help_text(&self) -> String {
            "Your password can't contain spaces.".to_string()
        }
    }

    #[test]
    fn test_registry_runs_registered_rules() {
        let mut validators = PasswordValidators::from_settings(&PasswordPolicySettings::default());
        validators.register(NoSpaces);
        let msgs = messages(validators.validate("12 3", None));
        assert_eq!(
            msgs,
            vec![
                "This password is too short. It must contain at least 6 characters.".to_string(),
                "This password contains spaces.".to_string(),
            ]
        );
        assert_eq!(validators.help_texts().len(), 5);
        assert_eq!(
            validators.help_texts().last().map(String::as_str),
            Some("Your password can't contain spaces.")
        );
    }

    #[test]
    fn test_empty_registry() {
        let validators = PasswordValidators::new();
        assert!(validators.is_empty());
        assert!(validators.validate("", None).is_ok());
    }
}
