//! Currency codes

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::Display;
use std::str::FromStr;

/// An uppercase three letter currency code such as `USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid_code(code: &str) -> bool {
        code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
    }
}

/// EUR, the reference currency of the European Central Bank rate files.
impl Default for Currency {
    fn default() -> Self {
        Currency("EUR".to_string())
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if Self::is_valid_code(code) {
            Ok(Currency(code.to_string()))
        } else {
            Err(anyhow::anyhow!("Invalid currency code: {:?}", s))
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl AsRef<str> for Currency {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Currency {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Currency {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Currency {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_parse() {
        let usd: Currency = "USD".parse().unwrap();
        assert_eq!(usd, "USD");
        assert_eq!(usd.to_string(), "USD");

        let padded: Currency = " JPY ".parse().unwrap();
        assert_eq!(padded.as_str(), "JPY");
    }

    #[test]
    fn test_currency_rejects_invalid_codes() {
        for code in ["usd", "US", "USDX", "U$D", ""] {
            assert!(code.parse::<Currency>().is_err(), "{code} should be rejected");
        }
    }

    #[test]
    fn test_currency_serde() {
        let currency: Currency = serde_yaml::from_str("GBP").unwrap();
        assert_eq!(currency, "GBP");
        assert!(serde_yaml::from_str::<Currency>("gbp").is_err());
    }
}
