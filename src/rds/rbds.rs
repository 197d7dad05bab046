//! North American RBDS program identification to call sign mapping.

const K_BASE: u16 = 0x1000;
const K_LAST: u16 = 0x54A7;
const W_BASE: u16 = 0x54A8;
const W_LAST: u16 = 0x994F;
const CANADA_BASE: u16 = 0xC001;
const CANADA_PREFIXES: [&str; 5] = ["CF", "CH", "CI", "CJ", "CK"];

/// Stations that kept 3-letter call signs, sorted by PI
static THREE_LETTER_CALLS: &[(u16, &str)] = &[
    (0x9950, "KEX"), (0x9951, "KFH"), (0x9952, "KFI"), (0x9953, "KGA"),
    (0x9954, "KGO"), (0x9955, "KGU"), (0x9956, "KGW"), (0x9957, "KGY"),
    (0x9958, "KID"), (0x9959, "KIT"), (0x995A, "KJR"), (0x995B, "KLO"),
    (0x995C, "KLZ"), (0x995D, "KMA"), (0x995E, "KMJ"), (0x995F, "KNX"),
    (0x9960, "KOA"), (0x9964, "KQV"), (0x9965, "KSL"), (0x9966, "KUJ"),
    (0x9967, "KVI"), (0x9968, "KWG"), (0x996B, "KYW"), (0x996D, "WBZ"),
    (0x996E, "WDZ"), (0x996F, "WEW"), (0x9971, "WGL"), (0x9972, "WGN"),
    (0x9973, "WGR"), (0x9975, "WHA"), (0x9976, "WHB"), (0x9977, "WHK"),
    (0x9978, "WHO"), (0x997A, "WIP"), (0x997B, "WJR"), (0x997C, "WKY"),
    (0x997D, "WLS"), (0x997E, "WLW"), (0x9981, "WOC"), (0x9983, "WOL"),
    (0x9984, "WOR"), (0x9988, "WWJ"), (0x9989, "WWL"), (0x9990, "KDB"),
    (0x9991, "KGB"), (0x9992, "KOY"), (0x9993, "KPQ"), (0x9994, "KSD"),
    (0x9995, "KUT"), (0x9996, "KXL"), (0x9997, "KXO"), (0x9999, "WBT"),
    (0x999A, "WGH"), (0x999B, "WGY"), (0x999C, "WHP"), (0x999D, "WIL"),
    (0x999E, "WMC"), (0x999F, "WMT"), (0x99A0, "WOI"), (0x99A1, "WOW"),
    (0x99A2, "WRR"), (0x99A3, "WSB"), (0x99A4, "WSM"), (0x99A5, "KBW"),
    (0x99A6, "KCY"), (0x99A7, "KDF"), (0x99AA, "KHQ"), (0x99AB, "KOB"),
    (0x99B3, "WIS"), (0x99B4, "WJW"), (0x99B5, "WJZ"), (0x99B9, "WRC"),
];

/// Derive a call sign from an RBDS PI code.
///
/// Returns `None` for any PI outside the documented ranges (including
/// national and regional network codes) rather than guessing.
pub fn callsign(pi: u16) -> Option<String> {
    let pi = expand_abbreviated(pi);

    match pi {
        K_BASE..=K_LAST => Some(base26('K', pi - K_BASE)),
        W_BASE..=W_LAST => Some(base26('W', pi - W_BASE)),
        0x9950..=0x9EFF => THREE_LETTER_CALLS
            .binary_search_by_key(&pi, |&(code, _)| code)
            .ok()
            .map(|idx| THREE_LETTER_CALLS[idx].1.to_string()),
        0xC000..=0xCFFF => canadian(pi),
        _ => None,
    }
}

/// `AFxy` stands for `xy00` and `Axyz` for `x0yz`
fn expand_abbreviated(pi: u16) -> u16 {
    if pi & 0xF000 != 0xA000 {
        return pi;
    }
    if pi & 0x0F00 == 0x0F00 {
        (pi & 0x00FF) << 8
    } else {
        ((pi & 0x0F00) << 4) | (pi & 0x00FF)
    }
}

fn base26(prefix: char, value: u16) -> String {
    let letter = |n: u16| (b'A' + n as u8) as char;
    let mut call = String::with_capacity(4);
    call.push(prefix);
    call.push(letter(value / 676));
    call.push(letter((value % 676) / 26));
    call.push(letter(value % 26));
    call
}

/// Two-letter prefix, one letter, and an optional fourth letter (27 slots, 0 = none)
fn canadian(pi: u16) -> Option<String> {
    let n = pi.checked_sub(CANADA_BASE)?;
    let prefix = CANADA_PREFIXES.get((n / 702) as usize)?;

    let mut call = String::with_capacity(4);
    call.push_str(prefix);
    call.push((b'A' + ((n % 702) / 27) as u8) as char);
    let fourth = n % 27;
    if fourth > 0 {
        call.push((b'A' + (fourth - 1) as u8) as char);
    }
    Some(call)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_and_w_ranges() {
        assert_eq!(callsign(0x1000).as_deref(), Some("KAAA"));
        assert_eq!(callsign(0x354E).as_deref(), Some("KODI"));
        assert_eq!(callsign(0x54A7).as_deref(), Some("KZZZ"));
        assert_eq!(callsign(0x54A8).as_deref(), Some("WAAA"));
        assert_eq!(callsign(0x93ED).as_deref(), Some("WXYZ"));
        assert_eq!(callsign(0x994F).as_deref(), Some("WZZZ"));
    }

    #[test]
    fn test_three_letter_table() {
        assert_eq!(callsign(0x995F).as_deref(), Some("KNX"));
        assert_eq!(callsign(0x99B9).as_deref(), Some("WRC"));
        // Reserved range but not assigned
        assert_eq!(callsign(0x9961), None);
        assert!(THREE_LETTER_CALLS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_abbreviated_codes() {
        assert_eq!(callsign(0xA34E), callsign(0x304E));
        assert_eq!(callsign(0xAF30), callsign(0x3000));
        assert_eq!(callsign(0x304E).as_deref(), Some("KMGC"));
    }

    #[test]
    fn test_canadian_range() {
        assert_eq!(callsign(0xC001).as_deref(), Some("CFA"));
        assert_eq!(callsign(0xC002).as_deref(), Some("CFAA"));
        assert_eq!(callsign(0xC001 + 702).as_deref(), Some("CHA"));
        assert_eq!(callsign(0xC000), None);
        assert_eq!(callsign(0xCFFF), None);
    }

    #[test]
    fn test_unmapped_codes_yield_nothing() {
        assert_eq!(callsign(0x0000), None);
        assert_eq!(callsign(0x0FFF), None);
        assert_eq!(callsign(0xB201), None);
        assert_eq!(callsign(0xE1FF), None);
    }
}
