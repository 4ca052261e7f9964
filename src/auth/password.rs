//! Password hashing with PBKDF2-HMAC-SHA256.
//!
//! Hash records are self-describing: `pbkdf2_sha256$<iterations>$<salt>$<key>`
//! with hex-encoded salt and derived key, so verification never depends on
//! external configuration.

use std::num::NonZeroU32;

use rand::rngs::OsRng;
use rand::RngCore;
use ring::pbkdf2;
use subtle::ConstantTimeEq;

const ALGORITHM_TAG: &str = "pbkdf2_sha256";
const SALT_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

/// Default work factor. Tests use a much smaller value through
/// [`PasswordService::hash_password_with_iterations`].
pub const DEFAULT_ITERATIONS: u32 = 100_000;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
        }
    }
}

impl PasswordPolicy {
    pub fn complex(min_length: usize) -> Self {
        Self {
            min_length,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        if password.len() < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(PasswordPolicyError::MissingUppercase);
        }

        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(PasswordPolicyError::MissingLowercase);
        }

        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(PasswordPolicyError::MissingDigit);
        }

        if self.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err(PasswordPolicyError::MissingSpecial);
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum PasswordPolicyError {
    TooShort { min_length: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecial,
}

impl std::fmt::Display for PasswordPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordPolicyError::TooShort { min_length } => {
                write!(f, "Password must be at least {} characters", min_length)
            }
            PasswordPolicyError::MissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            PasswordPolicyError::MissingLowercase => {
                write!(f, "Password must contain at least one lowercase letter")
            }
            PasswordPolicyError::MissingDigit => {
                write!(f, "Password must contain at least one digit")
            }
            PasswordPolicyError::MissingSpecial => {
                write!(f, "Password must contain at least one special character")
            }
        }
    }
}

impl std::error::Error for PasswordPolicyError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Empty input password.
    EmptyPassword,
    /// Wrong tag, wrong field count, or undecodable salt/key.
    InvalidHashFormat,
    /// Iteration count is non-positive or not a number.
    InvalidIterations,
}

impl std::fmt::Display for HashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashError::EmptyPassword => write!(f, "Password must not be empty"),
            HashError::InvalidHashFormat => write!(f, "Malformed password hash record"),
            HashError::InvalidIterations => write!(f, "Invalid iteration count in hash record"),
        }
    }
}

impl std::error::Error for HashError {}

pub struct PasswordService;

impl PasswordService {
    pub fn hash_password(password: &str) -> Result<String, HashError> {
        Self::hash_password_with_iterations(password, DEFAULT_ITERATIONS)
    }

    /// Hashes a password with a fresh random 128-bit salt. The iteration
    /// count is embedded in the record, so records hashed under different
    /// settings keep verifying.
    pub fn hash_password_with_iterations(
        password: &str,
        iterations: u32,
    ) -> Result<String, HashError> {
        if password.is_empty() {
            return Err(HashError::EmptyPassword);
        }
        let iterations = NonZeroU32::new(iterations).ok_or(HashError::InvalidIterations)?;

        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);

        let mut key = [0u8; KEY_LENGTH];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            password.as_bytes(),
            &mut key,
        );

        Ok(format!(
            "{}${}${}${}",
            ALGORITHM_TAG,
            iterations,
            hex::encode(salt),
            hex::encode(key)
        ))
    }

    /// Re-derives with the record's embedded salt and iteration count and
    /// compares in constant time. A legitimate mismatch returns `Ok(false)`;
    /// errors indicate a corrupt record.
    pub fn verify_password(password: &str, record: &str) -> Result<bool, HashError> {
        let parts: Vec<&str> = record.split('$').collect();
        if parts.len() != 4 || parts[0] != ALGORITHM_TAG {
            return Err(HashError::InvalidHashFormat);
        }

        let iterations: i64 = parts[1].parse().map_err(|_| HashError::InvalidIterations)?;
        if iterations <= 0 {
            return Err(HashError::InvalidIterations);
        }
        let iterations = NonZeroU32::new(iterations as u32).ok_or(HashError::InvalidIterations)?;

        let salt = hex::decode(parts[2]).map_err(|_| HashError::InvalidHashFormat)?;
        let expected = hex::decode(parts[3]).map_err(|_| HashError::InvalidHashFormat)?;
        if salt.len() != SALT_LENGTH || expected.len() != KEY_LENGTH {
            return Err(HashError::InvalidHashFormat);
        }

        let mut derived = [0u8; KEY_LENGTH];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            password.as_bytes(),
            &mut derived,
        );

        Ok(derived.as_slice().ct_eq(expected.as_slice()).into())
    }
}
