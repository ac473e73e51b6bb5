//! Country code ↔ display name table.
//!
//! Providers report countries either as ISO-3166 alpha-2 codes or as
//! English names (GDELT's `sourcecountry`). Rankings always key countries
//! by code and display them by the name below.

const COUNTRIES: &[(&str, &str)] = &[
    ("AE", "United Arab Emirates"),
    ("AR", "Argentina"),
    ("AU", "Australia"),
    ("AT", "Austria"),
    ("BE", "Belgium"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CL", "Chile"),
    ("CN", "China"),
    ("CO", "Colombia"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("EG", "Egypt"),
    ("ES", "Spain"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("GR", "Greece"),
    ("ID", "Indonesia"),
    ("IE", "Ireland"),
    ("IL", "Israel"),
    ("IN", "India"),
    ("IQ", "Iraq"),
    ("IS", "Iceland"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("KE", "Kenya"),
    ("KR", "South Korea"),
    ("KW", "Kuwait"),
    ("MX", "Mexico"),
    ("MY", "Malaysia"),
    ("NG", "Nigeria"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("NZ", "New Zealand"),
    ("PE", "Peru"),
    ("PH", "Philippines"),
    ("PK", "Pakistan"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("QA", "Qatar"),
    ("RU", "Russia"),
    ("SA", "Saudi Arabia"),
    ("SE", "Sweden"),
    ("SG", "Singapore"),
    ("TH", "Thailand"),
    ("TR", "Turkey"),
    ("UA", "Ukraine"),
    ("US", "United States"),
    ("VN", "Vietnam"),
    ("ZA", "South Africa"),
];

/// Alternate spellings seen in provider payloads.
const ALIASES: &[(&str, &str)] = &[
    ("usa", "US"),
    ("united states of america", "US"),
    ("uk", "GB"),
    ("great britain", "GB"),
    ("england", "GB"),
    ("korea, south", "KR"),
    ("republic of korea", "KR"),
    ("russian federation", "RU"),
    ("turkiye", "TR"),
    ("viet nam", "VN"),
    ("uae", "AE"),
];

/// Display name for an ISO-3166 alpha-2 code (case-insensitive).
#[must_use]
pub fn country_name(code: &str) -> Option<&'static str> {
    COUNTRIES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// ISO-3166 alpha-2 code for an English country name (case-insensitive).
#[must_use]
pub fn country_code(name: &str) -> Option<&'static str> {
    let needle = name.trim().to_lowercase();
    COUNTRIES
        .iter()
        .find(|(_, n)| n.to_lowercase() == needle)
        .map(|(code, _)| *code)
        .or_else(|| {
            ALIASES
                .iter()
                .find(|(alias, _)| *alias == needle)
                .map(|(_, code)| *code)
        })
}

#[must_use]
pub fn is_known_code(code: &str) -> bool {
    country_name(code).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_name_by_code() {
        assert_eq!(country_name("KW"), Some("Kuwait"));
        assert_eq!(country_name("us"), Some("United States"));
        assert_eq!(country_name("XX"), None);
    }

    #[test]
    fn looks_up_code_by_name_and_alias() {
        assert_eq!(country_code("United Kingdom"), Some("GB"));
        assert_eq!(country_code("  united states "), Some("US"));
        assert_eq!(country_code("Korea, South"), Some("KR"));
        assert_eq!(country_code("Atlantis"), None);
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<_> = COUNTRIES.iter().map(|(c, _)| *c).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), COUNTRIES.len());
    }
}
