//! LCID to human-readable language label lookup.
//!
//! Amcache stores the `Language` value as a decimal LCID string. Anything that
//! is not a plain run of ASCII digits, or a number not in the table, resolves
//! to [`UNKNOWN_LOCALE`].

/// Label used when a locale code is missing, non-numeric or unrecognized
pub const UNKNOWN_LOCALE: &str = "Unknown";

const LCID_TABLE: &[(u32, &str)] = &[
    (1025, "Arabic (Saudi Arabia)"),
    (1027, "Catalan (Catalan)"),
    (1028, "Chinese (Traditional, Taiwan)"),
    (1029, "Czech (Czech Republic)"),
    (1030, "Danish (Denmark)"),
    (1031, "German (Germany)"),
    (1032, "Greek (Greece)"),
    (1033, "English (United States)"),
    (1034, "Spanish (Traditional Sort)"),
    (1035, "Finnish (Finland)"),
    (1036, "French (France)"),
    (1037, "Hebrew (Israel)"),
    (1038, "Hungarian (Hungary)"),
    (1039, "Icelandic (Iceland)"),
    (1040, "Italian (Italy)"),
    (1041, "Japanese (Japan)"),
    (1042, "Korean (Korea)"),
    (1043, "Dutch (Netherlands)"),
    (1044, "Norwegian (Bokmål, Norway)"),
    (1045, "Polish (Poland)"),
    (1046, "Portuguese (Brazil)"),
    (1049, "Russian (Russia)"),
    (1051, "Slovak (Slovakia)"),
    (1053, "Swedish (Sweden)"),
    (1054, "Thai (Thailand)"),
    (1055, "Turkish (Turkey)"),
    (1057, "Indonesian (Indonesia)"),
    (1058, "Ukrainian (Ukraine)"),
    (1060, "Slovenian (Slovenia)"),
    (1061, "Estonian (Estonia)"),
    (1062, "Latvian (Latvia)"),
    (1063, "Lithuanian (Lithuania)"),
    (1066, "Vietnamese (Vietnam)"),
    (1069, "Basque (Basque)"),
    (1081, "Hindi (India)"),
    (1086, "Malay (Malaysia)"),
    (1091, "Uzbek (Latin, Uzbekistan)"),
    (1092, "Tatar (Russia)"),
    (1093, "Bengali (India)"),
    (1102, "Marathi (India)"),
    (1110, "Galician (Galician)"),
    (2052, "Chinese (Simplified, China)"),
    (2057, "English (United Kingdom)"),
    (2067, "Dutch (Belgium)"),
    (2068, "Norwegian (Nynorsk, Norway)"),
    (2070, "Portuguese (Portugal)"),
    (2110, "Malay (Brunei)"),
    (3081, "English (Australia)"),
    (3082, "Spanish (Spain, Modern Sort)"),
    (4105, "English (Canada)"),
];

/// Label for a numeric LCID, if known
pub fn label_for_lcid(lcid: u32) -> Option<&'static str> {
    LCID_TABLE
        .binary_search_by_key(&lcid, |(code, _)| *code)
        .ok()
        .map(|idx| LCID_TABLE[idx].1)
}

/// Resolve the stringified `Language` value of an entry to a label
pub fn locale_label(code: Option<&str>) -> &'static str {
    let Some(code) = code else {
        return UNKNOWN_LOCALE;
    };
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return UNKNOWN_LOCALE;
    }
    code.parse::<u32>()
        .ok()
        .and_then(label_for_lcid)
        .unwrap_or(UNKNOWN_LOCALE)
}
