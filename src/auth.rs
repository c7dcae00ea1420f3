//! Phone and one-time-code input handling for the login page.

use crate::error::ValidationError;

pub const OTP_RESEND_SECS: u32 = 30;

/// A phone number reduced to its digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(input: &str, required_digits: usize) -> Result<Self, ValidationError> {
        let digits: String = input.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != required_digits {
            return Err(ValidationError::PhoneLength {
                expected: required_digits,
                actual: digits.len(),
            });
        }
        Ok(Self(digits))
    }

    pub fn digits(&self) -> &str {
        &self.0
    }
}

/// Formats raw phone input for display, e.g. `12345678` as `1234-5678`.
/// Extra digits beyond `max_digits` are dropped.
pub fn format_phone(input: &str, max_digits: usize) -> String {
    let digits: String = input
        .chars()
        .filter(char::is_ascii_digit)
        .take(max_digits)
        .collect();
    if digits.len() > 4 {
        format!("{}-{}", &digits[..4], &digits[4..])
    } else {
        digits
    }
}

/// The per-digit code entry.
#[derive(Debug, Clone)]
pub struct OtpEntry {
    cells: Vec<Option<char>>,
}

impl OtpEntry {
    pub fn new(len: usize) -> Self {
        Self {
            cells: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Sets one cell. Accepts an empty string or a single digit; anything else
    /// leaves the cell untouched and returns `None`. On success returns the
    /// index that should receive focus next.
    pub fn set(&mut self, index: usize, value: &str) -> Option<usize> {
        if index >= self.cells.len() {
            return None;
        }
        let mut chars = value.chars();
        let cell = match (chars.next(), chars.next()) {
            (None, _) => None,
            (Some(c), None) if c.is_ascii_digit() => Some(c),
            _ => return None,
        };
        self.cells[index] = cell;
        if cell.is_some() && index + 1 < self.cells.len() {
            Some(index + 1)
        } else {
            Some(index)
        }
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = None);
    }

    pub fn code(&self) -> Result<String, ValidationError> {
        let code: String = self.cells.iter().flatten().collect();
        if code.len() != self.cells.len() {
            return Err(ValidationError::OtpLength {
                expected: self.cells.len(),
            });
        }
        Ok(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    Phone,
    Code,
}

/// Seconds until "resend code" becomes available again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendCountdown {
    remaining: u32,
}

impl ResendCountdown {
    pub fn start() -> Self {
        Self {
            remaining: OTP_RESEND_SECS,
        }
    }

    /// Advances one second. Returns false once the countdown is over.
    pub fn tick(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn can_resend(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_requires_exact_digit_count() {
        assert_eq!(
            PhoneNumber::parse("1234-567", 8),
            Err(ValidationError::PhoneLength { expected: 8, actual: 7 })
        );
        assert_eq!(
            PhoneNumber::parse("123456789", 8),
            Err(ValidationError::PhoneLength { expected: 8, actual: 9 })
        );
        assert_eq!(PhoneNumber::parse("1234-5678", 8).unwrap().digits(), "12345678");
        assert!(PhoneNumber::parse("", 8).is_err());
    }

    #[test]
    fn phone_formatting() {
        assert_eq!(format_phone("12", 8), "12");
        assert_eq!(format_phone("1234", 8), "1234");
        assert_eq!(format_phone("12345", 8), "1234-5");
        assert_eq!(format_phone("1234-5678 99", 8), "1234-5678");
    }

    #[test]
    fn otp_cells_accept_single_digits() {
        let mut otp = OtpEntry::new(6);
        assert_eq!(otp.set(0, "1"), Some(1));
        assert_eq!(otp.set(1, "a"), None);
        assert_eq!(otp.set(1, "12"), None);
        assert_eq!(otp.set(6, "1"), None);
        assert!(otp.code().is_err());

        for (i, d) in ["2", "3", "4", "5"].iter().enumerate() {
            otp.set(i + 1, d);
        }
        assert_eq!(otp.set(5, "6"), Some(5));
        assert_eq!(otp.code().unwrap(), "123456");

        assert_eq!(otp.set(2, ""), Some(2));
        assert_eq!(otp.code(), Err(ValidationError::OtpLength { expected: 6 }));
        otp.clear();
        assert!(otp.is_empty());
    }

    #[test]
    fn countdown_reaches_zero() {
        let mut countdown = ResendCountdown::start();
        assert!(!countdown.can_resend());
        let mut ticks = 1;
        while countdown.tick() {
            ticks += 1;
        }
        assert_eq!(ticks, OTP_RESEND_SECS);
        assert!(countdown.can_resend());
        assert!(!countdown.tick());
    }
}
