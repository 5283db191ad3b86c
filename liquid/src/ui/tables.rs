//! Fixed lookup tables for the UI dialect: block types, priorities, flex and
//! span abbreviations, and colour aliases.

use fxhash::FxHashMap;
use once_cell::sync::Lazy;

/// Block types selected by a lone digit.
pub const TYPE_INDICES: [&str; 10] = [
    "container",
    "kpi",
    "bar",
    "line",
    "pie",
    "table",
    "form",
    "list",
    "card",
    "modal",
];

/// Two letter type codes and the block types they stand for.
pub const TYPE_CODES: &[(&str, &str)] = &[
    ("Cn", "container"),
    ("Kp", "kpi"),
    ("Br", "bar"),
    ("Ln", "line"),
    ("Pi", "pie"),
    ("Tb", "table"),
    ("Fm", "form"),
    ("Ls", "list"),
    ("Cd", "card"),
    ("Md", "modal"),
    ("Gd", "grid"),
    ("Sk", "stack"),
    ("Sp", "split"),
    ("Sd", "sidebar"),
    ("Dw", "drawer"),
    ("Sh", "sheet"),
    ("Pp", "popover"),
    ("Tl", "tooltip"),
    ("Ac", "accordion"),
    ("Ts", "tabs"),
    ("Hr", "header"),
    ("Hd", "heading"),
    ("Tx", "text"),
    ("Bt", "button"),
    ("In", "input"),
    ("Se", "select"),
    ("Sw", "switch"),
    ("Ck", "checkbox"),
    ("Rd", "radio"),
    ("Ta", "textarea"),
    ("Dt", "date"),
    ("Dr", "daterange"),
    ("Sl", "slider"),
    ("Bg", "badge"),
    ("Ic", "icon"),
    ("Im", "image"),
    ("Av", "avatar"),
    ("Pg", "progress"),
    ("Al", "alert"),
    ("Nv", "nav"),
    ("Bc", "breadcrumb"),
    ("Ar", "area"),
    ("Sc", "scatter"),
    ("Hm", "heatmap"),
    ("Sn", "sankey"),
    ("Kb", "kanban"),
    ("Ca", "calendar"),
    ("Tm", "timeline"),
    ("Sq", "sparkline"),
    ("Gg", "gauge"),
];

static TYPE_BY_CODE: Lazy<FxHashMap<&'static str, &'static str>> =
    Lazy::new(|| TYPE_CODES.iter().copied().collect());

static CODE_BY_TYPE: Lazy<FxHashMap<&'static str, &'static str>> =
    Lazy::new(|| TYPE_CODES.iter().map(|(code, ty)| (*ty, *code)).collect());

pub fn is_known_code(code: &str) -> bool {
    TYPE_BY_CODE.contains_key(code)
}

/// Matches codes of the form `[A-Z][a-z]{1,2}`, which are accepted as type
/// codes even when they are not in [`TYPE_CODES`].
pub fn looks_like_code(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            let rest = chars.as_str();
            (1..=2).contains(&rest.len()) && rest.chars().all(|ch| ch.is_ascii_lowercase())
        }
        _ => false,
    }
}

/// The block type for a type index, if it is in range.
pub fn type_for_index(index: u8) -> Option<&'static str> {
    TYPE_INDICES.get(usize::from(index)).copied()
}

/// The block type for a type code. Unknown codes stand for their lowercased
/// selves.
pub fn type_for_code(code: &str) -> String {
    match TYPE_BY_CODE.get(code) {
        Some(ty) => (*ty).to_owned(),
        None => code.to_lowercase(),
    }
}

pub fn index_for_type(ty: &str) -> Option<u8> {
    TYPE_INDICES
        .iter()
        .position(|candidate| *candidate == ty)
        .map(|index| index as u8)
}

pub fn code_for_type(ty: &str) -> Option<&'static str> {
    CODE_BY_TYPE.get(ty).copied()
}

/// The closest known type code to `code`, for diagnostics.
pub fn suggest_code(code: &str) -> Option<&'static str> {
    TYPE_CODES
        .iter()
        .map(|(candidate, _)| *candidate)
        .find(|candidate| levenshtein::levenshtein(code, candidate) == 1)
}

pub const PRIORITIES: &[(&str, u32)] = &[("h", 100), ("p", 75), ("s", 50)];

pub fn priority_for_name(name: &str) -> Option<u32> {
    PRIORITIES
        .iter()
        .find(|(abbrev, _)| *abbrev == name)
        .map(|(_, value)| *value)
}

pub fn name_for_priority(value: u32) -> Option<&'static str> {
    PRIORITIES
        .iter()
        .find(|(_, priority)| *priority == value)
        .map(|(abbrev, _)| *abbrev)
}

pub const FLEX_VALUES: &[(&str, &str)] = &[
    ("f", "fixed"),
    ("s", "shrink"),
    ("g", "grow"),
    ("c", "collapse"),
];

pub const SPAN_VALUES: &[(&str, &str)] = &[
    ("f", "full"),
    ("h", "half"),
    ("t", "third"),
    ("q", "quarter"),
];

pub const COLOR_ALIASES: &[(&str, &str)] = &[
    ("g", "green"),
    ("r", "red"),
    ("b", "blue"),
    ("y", "yellow"),
    ("o", "orange"),
    ("p", "purple"),
    ("w", "white"),
    ("k", "black"),
    ("gy", "gray"),
    ("cy", "cyan"),
    ("mg", "magenta"),
];

/// Look up an abbreviation in one of the tables above.
pub fn expand(table: &[(&str, &'static str)], abbrev: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| *key == abbrev)
        .map(|(_, value)| *value)
}

/// Look up the abbreviation of a full value in one of the tables above.
pub fn abbreviate(table: &[(&'static str, &str)], value: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, full)| *full == value)
        .map(|(key, _)| *key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_are_one_to_one() {
        let codes: FxHashMap<_, _> = TYPE_CODES.iter().map(|(c, t)| (*t, *c)).collect();
        assert_eq!(codes.len(), TYPE_CODES.len());
        assert_eq!(TYPE_BY_CODE.len(), TYPE_CODES.len());
    }

    #[test]
    fn type_codes_look_like_codes() {
        for (code, _) in TYPE_CODES {
            assert!(looks_like_code(code), "{code}");
        }
        assert!(looks_like_code("Xyz"));
        assert!(!looks_like_code("Survey"));
        assert!(!looks_like_code("KP"));
        assert!(!looks_like_code("K"));
    }

    #[test]
    fn unknown_codes_lowercase() {
        assert_eq!(type_for_code("Kp"), "kpi");
        assert_eq!(type_for_code("Zz"), "zz");
    }

    #[test]
    fn indexed_types_have_codes() {
        for ty in TYPE_INDICES {
            assert!(code_for_type(ty).is_some(), "{ty}");
        }
    }

    #[test]
    fn suggestions() {
        assert_eq!(suggest_code("Kq"), Some("Kp"));
        assert_eq!(suggest_code("Zz"), None);
    }
}
