//! Heuristic splitter for "Street number - District - Region" style addresses.

use crate::model::AddressComponents;
use regex::Regex;
use std::sync::LazyLock;

const BIO_BIO: &str = "BIO - BIO";

static HOUSE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("HOUSE_NUMBER is a compile-time constant"));

/// Split a free-text address into its components. Never fails; missing parts stay empty
/// and the house number falls back to "1".
pub fn parse_address(address: &str) -> AddressComponents {
    let number = HOUSE_NUMBER.find(address);
    let house_number = number.map_or("1", |m| m.as_str()).to_string();

    // Street ends at the first hyphen, or earlier at the house number when it
    // sits inside that segment.
    let head_end = address.find('-').unwrap_or(address.len());
    let street_end = match number {
        Some(m) if m.start() > 0 && m.start() < head_end => m.start(),
        _ => head_end,
    };
    let street = address[..street_end].trim().to_string();

    let (district, region) = match address.rfind(',') {
        Some(idx) => split_tail(address[idx + 1..].trim()),
        None => (String::new(), String::new()),
    };

    AddressComponents {
        street,
        house_number,
        district,
        region,
    }
}

fn split_tail(tail: &str) -> (String, String) {
    // ASCII upper-casing keeps byte offsets aligned with `tail`.
    if let Some(bio_idx) = tail.to_ascii_uppercase().find(BIO_BIO) {
        return match tail[..bio_idx].rfind('-') {
            Some(dash) => (tail[..dash].trim().to_string(), BIO_BIO.to_string()),
            None => (String::new(), String::new()),
        };
    }
    match tail.rfind('-') {
        Some(dash) => (
            tail[..dash].trim().to_string(),
            tail[dash + 1..].trim().to_string(),
        ),
        None => (tail.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_address_with_comma_tail() {
        let parsed = parse_address("Las Flores 123 - Centro, Maipú - Metropolitana");
        assert_eq!(parsed.street, "Las Flores");
        assert_eq!(parsed.house_number, "123");
        assert_eq!(parsed.district, "Maipú");
        assert_eq!(parsed.region, "Metropolitana");
    }

    #[test]
    fn no_comma_leaves_district_and_region_empty() {
        let parsed = parse_address("Los Alamos 45");
        assert_eq!(parsed.house_number, "45");
        assert_eq!(parsed.street, "Los Alamos");
        assert_eq!(parsed.district, "");
        assert_eq!(parsed.region, "");
    }

    #[test]
    fn bio_bio_region_is_kept_whole() {
        let parsed = parse_address("Ruta 5, Los Angeles - BIO - BIO");
        assert_eq!(parsed.region, "BIO - BIO");
        assert_eq!(parsed.district, "Los Angeles");

        let lower = parse_address("Calle 9, Chillán - Bio - Bio");
        assert_eq!(lower.region, "BIO - BIO");
        assert_eq!(lower.district, "Chillán");
    }

    #[test]
    fn bio_bio_without_preceding_hyphen_stays_empty() {
        let parsed = parse_address("Ruta 5, BIO - BIO");
        assert_eq!(parsed.district, "");
        assert_eq!(parsed.region, "");
    }

    #[test]
    fn missing_number_defaults_to_one() {
        let parsed = parse_address("Pasaje Sin Numero");
        assert_eq!(parsed.house_number, "1");
        assert_eq!(parsed.street, "Pasaje Sin Numero");
    }

    #[test]
    fn tail_without_hyphen_is_all_district() {
        let parsed = parse_address("Av. Grecia 1500, Ñuñoa");
        assert_eq!(parsed.street, "Av. Grecia");
        assert_eq!(parsed.district, "Ñuñoa");
        assert_eq!(parsed.region, "");
    }

    #[test]
    fn leading_number_keeps_whole_head_as_street() {
        let parsed = parse_address("12 de Octubre");
        assert_eq!(parsed.house_number, "12");
        assert_eq!(parsed.street, "12 de Octubre");
    }

    #[test]
    fn house_number_is_always_ascii_digits() {
        let inputs = [
            "",
            "   ",
            "-",
            ",",
            "٣٤ Calle árabe",
            "Depto 4B - Torre 2, Las Condes - RM",
            ", - ,",
            "Ñandú 0007",
        ];
        for input in inputs {
            let parsed = parse_address(input);
            assert!(!parsed.house_number.is_empty(), "empty for {input:?}");
            assert!(
                parsed.house_number.chars().all(|c| c.is_ascii_digit()),
                "non-digit number {:?} for {input:?}",
                parsed.house_number
            );
        }
    }
}
