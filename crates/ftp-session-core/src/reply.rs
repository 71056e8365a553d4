//! Reply code decomposition

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 3-digit FTP reply code decomposed into its constituent digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyCode {
    /// Most significant digit (reply class)
    pub hundreds: u8,
    /// Middle digit (reply group)
    pub tens: u8,
    /// Least significant digit
    pub units: u8,
}

impl ReplyCode {
    /// Decompose a numeric reply code in [0, 999] into its three digits.
    ///
    /// Codes outside the range are a caller error and are not validated here;
    /// the upstream parser owns rejecting non-numeric status lines.
    pub fn decode(mut code: u16) -> Self {
        let units = (code % 10) as u8;
        code /= 10;
        let tens = (code % 10) as u8;
        code /= 10;
        let hundreds = (code % 10) as u8;
        Self {
            hundreds,
            tens,
            units,
        }
    }

    /// Recompose the numeric code
    pub fn value(&self) -> u16 {
        u16::from(self.hundreds) * 100 + u16::from(self.tens) * 10 + u16::from(self.units)
    }

    /// Returns true for 2xx replies (positive completion)
    pub fn is_success(&self) -> bool {
        self.hundreds == 2
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.hundreds, self.tens, self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_recomposes() {
        for code in 0u16..1000 {
            let decoded = ReplyCode::decode(code);
            assert_eq!(decoded.value(), code);
        }
    }

    #[test]
    fn test_digit_order() {
        let code = ReplyCode::decode(227);
        assert_eq!(code.hundreds, 2);
        assert_eq!(code.tens, 2);
        assert_eq!(code.units, 7);
        assert!(code.is_success());
        assert!(!ReplyCode::decode(550).is_success());
    }

    #[test]
    fn test_display() {
        assert_eq!(ReplyCode::decode(150).to_string(), "150");
    }
}
