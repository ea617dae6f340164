//! Built-in ACT suburb → postcode table.
//!
//! Kept as pairs so a name can never be matched to the wrong postcode.

use crate::models::SuburbQuery;

pub const DEFAULT_STATE: &str = "ACT";

pub const ACT_SUBURBS: &[(&str, u32)] = &[
    ("Acton", 2601),
    ("Ainslie", 2602),
    ("Amaroo", 2914),
    ("Aranda", 2614),
    ("Banks", 2906),
    ("Barton", 2600),
    ("Belconnen", 2617),
    ("Bonner", 2914),
    ("Bonython", 2905),
    ("Booroomba", 2620),
    ("Braddon", 2612),
    ("Bruce", 2617),
    ("Calwell", 2905),
    ("Campbell", 2612),
    ("Casey", 2913),
    ("Chapman", 2611),
    ("Charnwood", 2615),
    ("Chifley", 2606),
    ("Chisholm", 2905),
    ("City", 2601),
    ("Conder", 2906),
    ("Cook", 2614),
    ("Coombs", 2611),
    ("Crace", 2911),
    ("Curtin", 2605),
    ("Deakin", 2600),
    ("Dickson", 2602),
    ("Downer", 2602),
    ("Duffy", 2611),
    ("Dunlop", 2615),
    ("Evatt", 2617),
    ("Fadden", 2904),
    ("Farrer", 2607),
    ("Fisher", 2615),
    ("Florey", 2615),
    ("Flynn", 2615),
    ("Forde", 2914),
    ("Forrest", 2603),
    ("Franklin", 2913),
    ("Fraser", 2615),
    ("Fyshwick", 2609),
    ("Garran", 2605),
    ("Gilmore", 2905),
    ("Giralang", 2617),
    ("Gordon", 2906),
    ("Gowrie", 2904),
    ("Greenway", 2900),
    ("Griffith", 2603),
    ("Gungahlin", 2912),
    ("Hackett", 2602),
    ("Hall", 2618),
    ("Harrison", 2914),
    ("Hawker", 2614),
    ("Higgins", 2615),
    ("Holder", 2611),
    ("Holt", 2615),
    ("Hughes", 2605),
    ("Hume", 2620),
    ("Isaacs", 2607),
    ("Isabella Plains", 2905),
    ("Jacka", 2914),
    ("Kaleen", 2617),
    ("Kambah", 2902),
    ("Kingston", 2604),
    ("Latham", 2615),
    ("Lawson", 2617),
    ("Lyneham", 2602),
    ("Lyons", 2620),
    ("Macarthur", 2615),
    ("Macgregor", 2615),
    ("Macquarie", 2614),
    ("Mawson", 2607),
    ("McKellar", 2617),
    ("Melba", 2615),
    ("Mitchell", 2911),
    ("Monash", 2904),
    ("Moncrieff", 2914),
    ("Narrabundah", 2604),
    ("Ngunnawal", 2913),
    ("Nicholls", 2913),
    ("Oaks Estate", 2620),
    ("O'Connor", 2602),
    ("O'Malley", 2606),
    ("Oxley", 2903),
    ("Page", 2614),
    ("Palmerston", 2913),
    ("Parkes", 2600),
    ("Pearce", 2607),
    ("Phillip", 2606),
    ("Pialligo", 2609),
    ("Red Hill", 2603),
    ("Reid", 2612),
    ("Richardson", 2905),
    ("Rivett", 2611),
    ("Russell", 2600),
    ("Scullin", 2615),
    ("Spence", 2615),
    ("Stirling", 2611),
    ("Swinger Hill", 2611),
    ("Symonston", 2609),
    ("Tharwa", 2620),
    ("Theodore", 2905),
    ("Torrens", 2607),
    ("Tuggeranong", 2901),
    ("Turner", 2612),
    ("Wanniassa", 2903),
    ("Waramanga", 2611),
    ("Watson", 2602),
    ("Weetangera", 2614),
    ("Weston", 2611),
    ("Weston Creek", 2611),
    ("Wright", 2611),
    ("Yarralumla", 2600),
];

/// Case-insensitive lookup of a suburb's postcode.
pub fn postcode_for(name: &str) -> Option<u32> {
    let name = name.trim();
    ACT_SUBURBS
        .iter()
        .find(|(suburb, _)| suburb.eq_ignore_ascii_case(name))
        .map(|(_, postcode)| *postcode)
}

/// Canonical spelling for a suburb name, as listed in the table.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    let name = name.trim();
    ACT_SUBURBS
        .iter()
        .find(|(suburb, _)| suburb.eq_ignore_ascii_case(name))
        .map(|(suburb, _)| *suburb)
}

/// Build queries for the given names, in the order given.
/// Returns the names that are not in the table as the error.
pub fn resolve(names: &[String], state: &str) -> Result<Vec<SuburbQuery>, Vec<String>> {
    let mut queries = Vec::with_capacity(names.len());
    let mut unknown = Vec::new();

    for name in names {
        match (canonical_name(name), postcode_for(name)) {
            (Some(suburb), Some(postcode)) => queries.push(SuburbQuery::new(suburb, postcode, state)),
            _ => unknown.push(name.clone()),
        }
    }

    if unknown.is_empty() { Ok(queries) } else { Err(unknown) }
}

/// Every suburb in the table, in table order.
pub fn all(state: &str) -> Vec<SuburbQuery> {
    ACT_SUBURBS
        .iter()
        .map(|(suburb, postcode)| SuburbQuery::new(*suburb, *postcode, state))
        .collect()
}
