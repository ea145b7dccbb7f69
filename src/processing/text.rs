use crate::models::{ExtractionResult, Language};
use crate::processing::similarity::ratio;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref ALLOWED_FRAGMENT: Regex =
        Regex::new(r"^[A-Za-z0-9\x{0600}-\x{06FF}\s./-]+$").unwrap();
    static ref MEANINGFUL_CHAR: Regex = Regex::new(r"[A-Za-z0-9\x{0600}-\x{06FF}]").unwrap();

    static ref ARABIC_FOLDING: HashMap<char, char> = {
        let mut m = HashMap::new();
        m.insert('أ', 'ا');
        m.insert('إ', 'ا');
        m.insert('آ', 'ا');
        m.insert('ى', 'ي');
        m.insert('ئ', 'ي');
        m.insert('ؤ', 'و');
        m.insert('ة', 'ه');
        m
    };

    static ref ARABIC_PHONETIC: HashMap<char, &'static str> = {
        let mut m = HashMap::new();
        m.insert('ا', "a");
        m.insert('ب', "b");
        m.insert('ت', "t");
        m.insert('ث', "s");
        m.insert('ج', "j");
        m.insert('ح', "h");
        m.insert('خ', "kh");
        m.insert('د', "d");
        m.insert('ذ', "d");
        m.insert('ر', "r");
        m.insert('ز', "z");
        m.insert('س', "s");
        m.insert('ش', "sh");
        m.insert('ص', "s");
        m.insert('ض', "d");
        m.insert('ط', "t");
        m.insert('ظ', "z");
        m.insert('ع', "a");
        m.insert('غ', "gh");
        m.insert('ف', "f");
        m.insert('ق', "k");
        m.insert('ك', "k");
        m.insert('ل', "l");
        m.insert('م', "m");
        m.insert('ن', "n");
        m.insert('ه', "h");
        m.insert('و', "u");
        m.insert('ي', "i");
        m
    };
}

fn is_arabic_char(c: char) -> bool {
    matches!(c, '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}' | '\u{08A0}'..='\u{08FF}')
}

/// True when the text holds at least one Arabic-script character.
/// Digits and punctuation are script neutral.
pub fn contains_arabic(text: &str) -> bool {
    text.chars().any(is_arabic_char)
}

/// True when the script of `text` contradicts the `_ar` / `_fr` suffix of `field`.
pub fn is_wrong_script(field: &str, text: &str) -> bool {
    match Language::of_field(field) {
        Some(Language::Ar) => !contains_arabic(text),
        Some(Language::Fr) => contains_arabic(text),
        None => false,
    }
}

/// Fragments made only of Latin/Arabic letters, digits, whitespace and `./-`.
pub fn is_allowed_fragment(text: &str) -> bool {
    ALLOWED_FRAGMENT.is_match(text.trim())
}

pub fn has_meaningful_char(text: &str) -> bool {
    MEANINGFUL_CHAR.is_match(text)
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{0600}'..='\u{0605}'
            | '\u{061C}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
    )
}

/// Drop zero-width and bidi control characters the recognizers leave in Arabic text.
pub fn clean_invisible_chars(text: &str) -> String {
    text.chars().filter(|c| !is_invisible(*c)).collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(
        c,
        '\u{0300}'..='\u{036F}'
            | '\u{0610}'..='\u{061A}'
            | '\u{064B}'..='\u{065F}'
            | '\u{0670}'
            | '\u{06D6}'..='\u{06DC}'
            | '\u{06DF}'..='\u{06E4}'
            | '\u{06E7}'..='\u{06E8}'
            | '\u{06EA}'..='\u{06ED}'
    )
}

/// Base letter of a precomposed character, e.g. `é` to `e` or `أ` to `ا`.
fn base_letter(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'أ' | 'إ' | 'آ' => 'ا',
        'ؤ' => 'و',
        'ئ' => 'ي',
        other => other,
    }
}

/// Drop combining marks and replace precomposed letters by their base letter.
pub fn fold_diacritics(text: &str) -> String {
    text.chars()
        .filter(|c| !is_combining_mark(*c))
        .map(base_letter)
        .collect()
}

/// Lowercase, strip diacritics, keep only `a-z` and the Arabic block.
pub fn normalize_name(text: &str) -> String {
    fold_diacritics(&text.trim().to_lowercase())
        .chars()
        .filter(|c| c.is_ascii_lowercase() || ('\u{0600}'..='\u{06FF}').contains(c))
        .collect()
}

/// Fold Arabic letter variants (hamza carriers, alif maqsura, ta marbuta).
pub fn normalize_arabic(text: &str) -> String {
    text.chars()
        .map(|c| *ARABIC_FOLDING.get(&c).unwrap_or(&c))
        .collect()
}

/// Latin transliteration of Arabic letters; other characters pass through.
pub fn arabic_to_phonetic(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match ARABIC_PHONETIC.get(&c) {
            Some(latin) => out.push_str(latin),
            None => out.push(c),
        }
    }
    out
}

pub fn consonant_skeleton(text: &str) -> String {
    text.chars().filter(|c| !"aeiou".contains(*c)).collect()
}

/// Outcome of comparing an Arabic and a French transcription of the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct NameComparison {
    pub ar_phonetic: String,
    pub fr_phonetic: String,
    pub consonant_score: f32,
    pub global_score: f32,
    pub score: f32,
    pub is_match: bool,
}

/// Scores how well an Arabic transcription matches a French one.
pub trait NameComparator: Send + Sync {
    fn compare(&self, name_ar: &str, name_fr: &str) -> NameComparison;
}

/// Compares the Latin transliteration of the Arabic side against the French
/// side, weighting the consonant skeleton and the full string equally.
#[derive(Debug, Clone, Copy)]
pub struct PhoneticComparator {
    pub min_consonant_score: f32,
    pub global_threshold: f32,
}

impl Default for PhoneticComparator {
    fn default() -> Self {
        PhoneticComparator {
            min_consonant_score: 0.75,
            global_threshold: 0.7,
        }
    }
}

impl NameComparator for PhoneticComparator {
    fn compare(&self, name_ar: &str, name_fr: &str) -> NameComparison {
        let ar_phonetic = arabic_to_phonetic(&normalize_arabic(&normalize_name(name_ar)));
        let fr_phonetic = normalize_name(name_fr);

        let consonant_score = ratio(
            &consonant_skeleton(&ar_phonetic),
            &consonant_skeleton(&fr_phonetic),
        );
        let global_score = ratio(&ar_phonetic, &fr_phonetic);
        let score = ((consonant_score * 0.5 + global_score * 0.5) * 1000.0).round() / 1000.0;

        NameComparison {
            is_match: consonant_score >= self.min_consonant_score
                && score >= self.global_threshold,
            ar_phonetic,
            fr_phonetic,
            consonant_score,
            global_score,
            score,
        }
    }
}

/// Exactly eight digits anywhere in the text become `DD.MM.YYYY`; anything
/// else is returned unchanged.
pub fn normalize_date(text: &str) -> String {
    let digits: Vec<char> = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 8 {
        return text.to_string();
    }
    let d: String = digits.iter().collect();
    format!("{}.{}.{}", &d[0..2], &d[2..4], &d[4..8])
}

const IDENTITY_GROUPS: [&str; 3] = ["prenom", "nom", "lieu_naissance"];

/// Name and birthplace pairs first (Arabic then French), then the rest in
/// their original order.
pub fn reorder_identity_fields(fields: ExtractionResult) -> ExtractionResult {
    let mut ordered = ExtractionResult::new();

    for group in IDENTITY_GROUPS {
        for suffix in ["_ar", "_fr"] {
            let key = format!("{}{}", group, suffix);
            if let Some(value) = fields.get(&key) {
                ordered.insert(key.clone(), value);
            }
        }
    }

    for (key, value) in fields.iter() {
        if !ordered.contains_key(key) {
            ordered.insert(key, value);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_detection() {
        assert!(contains_arabic("محمد"));
        assert!(contains_arabic("AB 12 محمد"));
        assert!(!contains_arabic("MOHAMED"));
        assert!(!contains_arabic("12.03.1990"));
        assert!(!contains_arabic(""));
    }

    #[test]
    fn test_wrong_script_follows_field_suffix() {
        assert!(is_wrong_script("nom_ar", "ALAMI"));
        assert!(!is_wrong_script("nom_ar", "العلمي"));
        assert!(is_wrong_script("nom_fr", "العلمي"));
        assert!(!is_wrong_script("nom_fr", "ALAMI"));
        assert!(!is_wrong_script("cin", "العلمي"));
    }

    #[test]
    fn test_allowed_fragments() {
        assert!(is_allowed_fragment(" AB123456 "));
        assert!(is_allowed_fragment("12.03/1990-x"));
        assert!(is_allowed_fragment("الرباط"));
        assert!(!is_allowed_fragment("|"));
        assert!(!is_allowed_fragment("N°"));
        assert!(!is_allowed_fragment("   "));
    }

    #[test]
    fn test_invisible_chars_are_removed() {
        assert_eq!(clean_invisible_chars("\u{200F}المالك\u{200E}"), "المالك");
        assert_eq!(clean_invisible_chars("A\u{FEFF}B\u{00AD}C"), "ABC");
        assert!(!has_meaningful_char("\u{200F}:;"));
        assert!(has_meaningful_char(": 7"));
    }

    #[test]
    fn test_fold_diacritics() {
        assert_eq!(fold_diacritics("pièce ñandú ýves"), "piece nandu yves");
        assert_eq!(fold_diacritics("e\u{0301}te\u{0301}"), "ete");
        assert_eq!(fold_diacritics("أحمد"), "احمد");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Hélène-Marie "), "helenemarie");
        assert_eq!(normalize_name("أَحْمَد"), "احمد");
        assert_eq!(normalize_arabic("فاطمة"), "فاطمه");
        assert_eq!(arabic_to_phonetic("محمد"), "mhmd");
        assert_eq!(consonant_skeleton("mohamed"), "mhmd");
    }

    #[test]
    fn test_comparator_matches_transliterations() {
        let comparator = PhoneticComparator::default();

        let same = comparator.compare("محمد", "MOHAMED");
        assert!((same.consonant_score - 1.0).abs() < 1e-6);
        assert!((same.score - 0.864).abs() < 1e-3);
        assert!(same.is_match);

        let different = comparator.compare("محمد", "FATIMA");
        assert!(!different.is_match);
        assert!(different.score < same.score);
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("12 03 1990"), "12.03.1990");
        assert_eq!(normalize_date("1203l990"), "1203l990");
        assert_eq!(normalize_date("né le 01/02/2003"), "01.02.2003");
        assert_eq!(normalize_date(""), "");
    }

    #[test]
    fn test_reorder_identity_fields() {
        let fields: ExtractionResult = vec![
            ("prenom_fr", "AHMED"),
            ("prenom_ar", "أحمد"),
            ("nom_fr", "ALAMI"),
            ("nom_ar", "العلمي"),
            ("date_naissance", "01.01.1990"),
            ("lieu_naissance_fr", "RABAT"),
            ("lieu_naissance_ar", "الرباط"),
            ("cin", "AB123456"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let ordered = reorder_identity_fields(fields);
        let keys: Vec<&str> = ordered.keys().collect();
        assert_eq!(
            keys,
            vec![
                "prenom_ar",
                "prenom_fr",
                "nom_ar",
                "nom_fr",
                "lieu_naissance_ar",
                "lieu_naissance_fr",
                "date_naissance",
                "cin",
            ]
        );
        assert_eq!(ordered.get("nom_ar"), Some("العلمي"));
    }
}
