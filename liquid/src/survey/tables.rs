//! Fixed lookup tables for the survey dialect: question types and condition
//! operators.

use fxhash::FxHashMap;
use once_cell::sync::Lazy;

/// Two letter question type codes and the question types they stand for.
pub const QUESTION_TYPES: &[(&str, &str)] = &[
    ("Tx", "text"),
    ("Ta", "textarea"),
    ("Rt", "rating"),
    ("Ch", "choice"),
    ("Mc", "multiChoice"),
    ("Ms", "multiSelect"),
    ("Np", "nps"),
    ("Dt", "date"),
    ("Dr", "dateRange"),
    ("Tm", "time"),
    ("Cb", "combobox"),
    ("Nm", "number"),
    ("Cl", "color"),
    ("Fd", "fileDropzone"),
    ("Em", "email"),
    ("Ph", "phone"),
    ("Ur", "url"),
    ("Cy", "currency"),
    ("Lk", "likert"),
    ("Mx", "matrix"),
    ("Lc", "location"),
    ("Sl", "slider"),
    ("Ic", "imageChoice"),
    ("Sg", "signature"),
    ("Rg", "range"),
    ("Yn", "yesNo"),
    ("Pc", "percentage"),
    ("Dm", "dimensions"),
    ("Il", "imageLocation"),
    ("Gl", "geolocation"),
    ("Rk", "ranking"),
    ("Hd", "hidden"),
    ("Pw", "password"),
    ("Cp", "captcha"),
    ("Au", "audio"),
    ("Vd", "video"),
    ("Ad", "address"),
];

static TYPE_BY_CODE: Lazy<FxHashMap<&'static str, &'static str>> =
    Lazy::new(|| QUESTION_TYPES.iter().copied().collect());

static CODE_BY_TYPE: Lazy<FxHashMap<&'static str, &'static str>> =
    Lazy::new(|| QUESTION_TYPES.iter().map(|(code, ty)| (*ty, *code)).collect());

pub fn type_for_code(code: &str) -> Option<&'static str> {
    TYPE_BY_CODE.get(code).copied()
}

pub fn code_for_type(ty: &str) -> Option<&'static str> {
    CODE_BY_TYPE.get(ty).copied()
}

/// Words shaped like a question type code: an upper case letter followed by
/// a lower case one.
pub fn looks_like_code(word: &str) -> bool {
    matches!(word.as_bytes(), [first, second] if first.is_ascii_uppercase() && second.is_ascii_lowercase())
}

pub fn suggest_code(code: &str) -> Option<&'static str> {
    QUESTION_TYPES
        .iter()
        .map(|(candidate, _)| *candidate)
        .find(|candidate| levenshtein::levenshtein(code, candidate) == 1)
}

/// Condition operators, as written after the `?`, and their names.
pub const OPERATORS: &[(&str, &str)] = &[
    ("=", "equals"),
    ("!=", "notEquals"),
    (">", "greater"),
    (">=", "greaterOrEqual"),
    ("<", "less"),
    ("<=", "lessOrEqual"),
    ("in", "in"),
    ("!in", "notIn"),
    ("contains", "contains"),
    ("!contains", "notContains"),
    ("empty", "isEmpty"),
    ("!empty", "isNotEmpty"),
    ("~", "matches"),
];

/// The name of an operator. Unknown operators are named by their text.
pub fn operator_name(text: &str) -> &str {
    OPERATORS
        .iter()
        .find(|(sigil, _)| *sigil == text)
        .map_or(text, |(_, name)| name)
}

pub fn operator_text(name: &str) -> Option<&'static str> {
    OPERATORS
        .iter()
        .find(|(_, candidate)| *candidate == name)
        .map(|(sigil, _)| *sigil)
}
