//! Region membership table
//!
//! Maps HHS (`hhs1`..`hhs10`) and Census division (`cen1`..`cen9`) codes to
//! their member state codes.

/// Member state codes of a region, or `None` for an unknown code
pub fn members(code: &str) -> Option<&'static [&'static str]> {
    let states: &'static [&'static str] = match code {
        "hhs1" => &["VT", "CT", "ME", "MA", "NH", "RI"],
        "hhs2" => &["NJ", "NY"],
        "hhs3" => &["DE", "DC", "MD", "PA", "VA", "WV"],
        "hhs4" => &["AL", "FL", "GA", "KY", "MS", "NC", "TN", "SC"],
        "hhs5" => &["IL", "IN", "MI", "MN", "OH", "WI"],
        "hhs6" => &["AR", "LA", "NM", "OK", "TX"],
        "hhs7" => &["IA", "KS", "MO", "NE"],
        "hhs8" => &["CO", "MT", "ND", "SD", "UT", "WY"],
        "hhs9" => &["AZ", "CA", "HI", "NV"],
        "hhs10" => &["AK", "ID", "OR", "WA"],
        "cen1" => &["CT", "ME", "MA", "NH", "RI", "VT"],
        "cen2" => &["NJ", "NY", "PA"],
        "cen3" => &["IL", "IN", "MI", "OH", "WI"],
        "cen4" => &["IA", "KS", "MN", "MO", "NE", "ND", "SD"],
        "cen5" => &["DE", "DC", "FL", "GA", "MD", "NC", "SC", "VA", "WV"],
        "cen6" => &["AL", "KY", "MS", "TN"],
        "cen7" => &["AR", "LA", "OK", "TX"],
        "cen8" => &["AZ", "CO", "ID", "MT", "NV", "NM", "UT", "WY"],
        "cen9" => &["AK", "CA", "HI", "OR", "WA"],
        _ => return None,
    };
    Some(states)
}

/// Comma-separated, single-quoted member list (e.g. `'NJ', 'NY'`)
///
/// For display only; `filter_regions` binds [`members`] as placeholders
/// rather than splicing this list into SQL.
pub fn lookup(code: &str) -> Option<String> {
    members(code).map(|states| {
        states
            .iter()
            .map(|s| format!("'{}'", s))
            .collect::<Vec<_>>()
            .join(", ")
    })
}
