//! Collection key derivation.
//!
//! A model named `Player` stores its records under `Players`. Only the end of
//! the name is inflected; an all-caps name gets an all-caps suffix.

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("foot", "feet"),
    ("tooth", "teeth"),
];

const UNCOUNTABLE: &[&str] = &["sheep", "fish", "deer", "series", "species", "data", "news"];

/// English plural of a model name.
pub fn pluralize(name: &str) -> String {
    if UNCOUNTABLE.iter().any(|word| ends_with(name, word)) {
        return name.to_string();
    }

    let shouting = name.chars().filter(|c| c.is_alphabetic()).count() > 1
        && !name.chars().any(char::is_lowercase);

    let (stem, ending) = if let Some((singular, plural)) =
        IRREGULAR.iter().find(|(singular, _)| ends_with(name, singular))
    {
        let cut = name.len() - singular.len();
        let ending = if name[cut..].starts_with(char::is_uppercase) {
            capitalize(plural)
        } else {
            plural.to_string()
        };
        (&name[..cut], ending)
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|end| ends_with(name, end)) {
        (name, "es".to_string())
    } else if ends_with(name, "y") && !consonant_before_y(name) {
        (name, "s".to_string())
    } else if ends_with(name, "y") {
        (&name[..name.len() - 1], "ies".to_string())
    } else {
        (name, "s".to_string())
    };

    if shouting {
        format!("{stem}{}", ending.to_uppercase())
    } else {
        format!("{stem}{ending}")
    }
}

/// ASCII case-insensitive suffix test; a match always ends on a char boundary.
fn ends_with(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.as_bytes()[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

fn consonant_before_y(name: &str) -> bool {
    let mut chars = name.chars().rev();
    chars.next();
    !matches!(
        chars.next().map(|c| c.to_ascii_lowercase()),
        Some('a' | 'e' | 'i' | 'o' | 'u') | None
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
