use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::OnceLock;
use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;
use Error::*;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("version string is empty")]
    Empty,

    #[error("version {version:?} has {found} underscore-separated parts, expected <product>_<channel>_<MM-DD-YYYY>")]
    Segments {
        version: String,
        found: usize,
    },

    #[error("version {version:?} has an empty {part} part")]
    EmptyPart {
        version: String,
        part: &'static str,
    },

    #[error("version {version:?}: {part} {value:?} may only contain letters, digits, '.' and '-'")]
    InvalidPart {
        version: String,
        part: &'static str,
        value: String,
    },

    #[error("version {version:?}: release date {date:?} does not match MM-DD-YYYY")]
    DateFormat {
        version: String,
        date: String,
    },

    #[error("version {version:?}: release date {date:?} is not a calendar date")]
    Calendar {
        version: String,
        date: String,
    },
}

/// Agent version as reported by the vendor instance, e.g. `acme_stable_03-14-2024`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    raw: String,
    pub product: String,
    pub channel: String,
    pub month: String,
    pub day: String,
    pub year: String,
    pub released: NaiveDate,
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // unwrap ok, the pattern is a literal
    PATTERN.get_or_init(|| Regex::new(r"^(\d{2})-(\d{2})-(\d{4})$").unwrap())
}

fn part_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // unwrap ok, the pattern is a literal
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9.-]+$").unwrap())
}

impl ResolvedVersion {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Empty);
        }

        let parts: Vec<&str> = raw.split('_').collect();
        let [product, channel, date] = parts[..] else {
            return Err(Segments {
                version: raw.to_string(),
                found: parts.len(),
            });
        };

        for (part, value) in [("product", product), ("channel", channel), ("release date", date)] {
            if value.is_empty() {
                return Err(EmptyPart {
                    version: raw.to_string(),
                    part,
                });
            }
        }

        // The raw string becomes an image tag.
        for (part, value) in [("product", product), ("channel", channel)] {
            if !part_pattern().is_match(value) {
                return Err(InvalidPart {
                    version: raw.to_string(),
                    part,
                    value: value.to_string(),
                });
            }
        }

        let captures = date_pattern().captures(date).ok_or_else(|| DateFormat {
            version: raw.to_string(),
            date: date.to_string(),
        })?;
        let (month, day, year) = (&captures[1], &captures[2], &captures[3]);

        let released = match (year.parse::<i32>(), month.parse::<u32>(), day.parse::<u32>()) {
            (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d),
            _ => None,
        }
        .ok_or_else(|| Calendar {
            version: raw.to_string(),
            date: date.to_string(),
        })?;

        Ok(Self {
            raw: raw.to_string(),
            product: product.to_string(),
            channel: channel.to_string(),
            month: month.to_string(),
            day: day.to_string(),
            year: year.to_string(),
            released,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ResolvedVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for ResolvedVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_release_date() {
        let version = ResolvedVersion::parse("acme_stable_03-14-2024").unwrap();
        assert_eq!(version.product, "acme");
        assert_eq!(version.channel, "stable");
        assert_eq!(version.month, "03");
        assert_eq!(version.day, "14");
        assert_eq!(version.year, "2024");
        assert_eq!(version.released, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(version.to_string(), "acme_stable_03-14-2024");
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let version: ResolvedVersion = " acme_stable_03-14-2024\n".parse().unwrap();
        assert_eq!(version.as_str(), "acme_stable_03-14-2024");
    }

    #[test]
    fn wrong_delimiter_count() {
        assert_eq!(
            ResolvedVersion::parse("acme-stable-03-14-2024"),
            Err(Segments { version: "acme-stable-03-14-2024".into(), found: 1 })
        );
        assert_eq!(
            ResolvedVersion::parse("acme_stable_rc_03-14-2024"),
            Err(Segments { version: "acme_stable_rc_03-14-2024".into(), found: 4 })
        );
    }

    #[test]
    fn empty_parts_are_named() {
        assert_eq!(ResolvedVersion::parse(""), Err(Empty));
        assert_eq!(
            ResolvedVersion::parse("_stable_03-14-2024"),
            Err(EmptyPart { version: "_stable_03-14-2024".into(), part: "product" })
        );
        assert_eq!(
            ResolvedVersion::parse("acme_stable_"),
            Err(EmptyPart { version: "acme_stable_".into(), part: "release date" })
        );
    }

    #[test]
    fn product_and_channel_must_be_tag_safe() {
        assert_eq!(
            ResolvedVersion::parse("Acme Agent_stable_03-14-2024"),
            Err(InvalidPart {
                version: "Acme Agent_stable_03-14-2024".into(),
                part: "product",
                value: "Acme Agent".into(),
            })
        );
        assert!(matches!(
            ResolvedVersion::parse("acme_st@ble_03-14-2024"),
            Err(InvalidPart { part: "channel", .. })
        ));
        assert!(ResolvedVersion::parse("acme.v2_rc-1_03-14-2024").is_ok());
    }

    #[test]
    fn malformed_release_date() {
        assert!(matches!(ResolvedVersion::parse("acme_stable_3-14-2024"), Err(DateFormat { .. })));
        assert!(matches!(ResolvedVersion::parse("acme_stable_2024-03-14"), Err(DateFormat { .. })));
        assert!(matches!(ResolvedVersion::parse("acme_stable_02-30-2024"), Err(Calendar { .. })));
    }
}
