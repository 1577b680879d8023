//! Slug helpers compatible with CKAN's `munge_title_to_name` and `munge_tag`.

use std::sync::LazyLock;

use regex::Regex;

const MAX_NAME_LENGTH: usize = 100;
const MIN_TAG_LENGTH: usize = 2;
const MAX_TAG_LENGTH: usize = 100;

static NAME_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ .:/]").unwrap());
static NAME_INVALID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]").unwrap());
static REPEATED_DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());
static TAG_INVALID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9 -]").unwrap());

/// Folds the Latin-1 letters used in the four national languages to ASCII.
pub fn substitute_ascii_equivalents(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        let folded = match ch {
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
            'Æ' => "AE",
            'æ' => "ae",
            'Ç' => "C",
            'ç' => "c",
            'È' | 'É' | 'Ê' | 'Ë' => "E",
            'è' | 'é' | 'ê' | 'ë' => "e",
            'Ì' | 'Í' | 'Î' | 'Ï' => "I",
            'ì' | 'í' | 'î' | 'ï' => "i",
            'Ñ' => "N",
            'ñ' => "n",
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "O",
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
            'Œ' => "OE",
            'œ' => "oe",
            'Ù' | 'Ú' | 'Û' | 'Ü' => "U",
            'ù' | 'ú' | 'û' | 'ü' => "u",
            'Ý' => "Y",
            'ý' | 'ÿ' => "y",
            'ß' => "ss",
            other => {
                out.push(other);
                continue;
            }
        };
        out.push_str(folded);
    }
    out
}

/// URL-safe package/group/organization name.
pub fn munge_title_to_name(title: &str) -> String {
    let name = substitute_ascii_equivalents(title);
    let name = NAME_SEPARATORS.replace_all(&name, "-");
    let name = NAME_INVALID.replace_all(&name, "").to_lowercase();
    let name = REPEATED_DASHES.replace_all(&name, "-");
    let name = name.trim_matches('-');
    truncate(name, MAX_NAME_LENGTH).trim_end_matches('-').to_string()
}

/// Normalized tag name; short tags are padded with `_` to the minimum length.
pub fn munge_tag(tag: &str) -> String {
    let tag = substitute_ascii_equivalents(tag).to_lowercase();
    let tag = TAG_INVALID.replace_all(tag.trim(), "").replace(' ', "-");
    let mut tag = truncate(&tag, MAX_TAG_LENGTH).to_string();
    while tag.len() < MIN_TAG_LENGTH {
        tag.push('_');
    }
    tag
}

fn truncate(value: &str, max: usize) -> &str {
    // Munged values are ASCII, so byte offsets are char boundaries.
    if value.len() > max { &value[..max] } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_collapses_separators() {
        assert_eq!(
            munge_title_to_name("Schweizerisches Bundesarchiv"),
            "schweizerisches-bundesarchiv"
        );
        assert_eq!(
            munge_title_to_name("  Archives fédérales -- suisses: 2012/13 "),
            "archives-federales-suisses-2012-13"
        );
        assert_eq!(munge_title_to_name("Bürger & Staat"), "burger-staat");
    }

    #[test]
    fn name_is_bounded() {
        let long = "a".repeat(150);
        assert_eq!(munge_title_to_name(&long).len(), 100);
    }

    #[test]
    fn tag_normalization() {
        assert_eq!(munge_tag("Öffentliche Finanzen"), "offentliche-finanzen");
        assert_eq!(munge_tag(" Statistik! "), "statistik");
        assert_eq!(munge_tag("a"), "a_");
    }
}
