use crate::models::{DualLanguageRecord, ExtractionResult};
use crate::processing::text::{contains_arabic, fold_diacritics};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

lazy_static! {
    static ref KEY_PUNCTUATION: Regex = Regex::new(r#"[°'"]"#).unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref NON_WORD: Regex = Regex::new(r"[^\w]").unwrap();
    static ref DATE_SEPARATORS: Regex = Regex::new(r"[./\-]").unwrap();

    // Keys are accent-free, lowercase, without ° ' or ".
    static ref FRENCH_KEYS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("prenom", "prenom");
        m.insert("nom", "nom");
        m.insert("date de naissance", "date_naissance");
        m.insert("lieu de naissance", "lieu_naissance");
        m.insert("cin", "cin");
        m.insert("numero cin", "cin");
        m.insert("date dexpiration", "date_expiration");
        m.insert("date expiration", "date_expiration");
        m.insert("sexe", "sexe");

        m.insert("numero dimmatriculation", "numero_immatriculation");
        m.insert("immatriculation", "numero_immatriculation");
        m.insert("immatriculation anterieure", "immatriculation_anterieure");
        m.insert("premiere mise en circulation", "premiere_mise_circulation");
        m.insert("mise en circulation", "premiere_mise_circulation");
        m.insert("m.c au maroc", "mc_maroc");
        m.insert("mc au maroc", "mc_maroc");
        m.insert("mutation le", "date_mutation");
        m.insert("mutation", "date_mutation");
        m.insert("usage", "usage");
        m.insert("proprietaire", "proprietaire");
        m.insert("adresse", "adresse");
        m.insert("fin de validite", "fin_validite");
        m.insert("validite", "fin_validite");

        m.insert("marque", "marque");
        m.insert("type", "type");
        m.insert("genre", "genre");
        m.insert("modele", "modele");
        m.insert("type carburant", "type_carburant");
        m.insert("carburant", "type_carburant");
        m.insert("n du chassis", "numero_chassis");
        m.insert("numero chassis", "numero_chassis");
        m.insert("chassis", "numero_chassis");
        m.insert("nombre de cylindres", "nombre_cylindres");
        m.insert("cylindres", "nombre_cylindres");
        m.insert("puissance fiscale", "puissance_fiscale");
        m.insert("nombre de places", "nombre_places");
        m.insert("places", "nombre_places");
        m.insert("p.t.a.c", "ptac");
        m.insert("p.t.a.c.", "ptac");
        m.insert("ptac", "ptac");
        m.insert("poids total", "ptac");
        m.insert("poids a vide", "poids_vide");
        m.insert("poids vide", "poids_vide");
        m.insert("p.t.r.a", "ptra");
        m.insert("p.t.r.a.", "ptra");
        m.insert("ptra", "ptra");
        m.insert("restrictions", "restrictions");
        m
    };

    static ref ARABIC_KEYS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("الاسم الشخصي", "prenom");
        m.insert("الاسم العائلي", "nom");
        m.insert("تاريخ الازدياد", "date_naissance");
        m.insert("مكان الازدياد", "lieu_naissance");
        m.insert("رقم البطاقة", "cin");
        m.insert("تاريخ انتهاء الصلاحية", "date_expiration");

        m.insert("رقم التسجيل", "numero_immatriculation");
        m.insert("الترقيم السابق", "immatriculation_anterieure");
        m.insert("أول شروع في الإستخدام", "premiere_mise_circulation");
        m.insert("أول استخدام بالمغرب", "mc_maroc");
        m.insert("تحويل بتاريخ", "date_mutation");
        m.insert("نوع الإستعمال", "usage");
        m.insert("المالك", "proprietaire");
        m.insert("العنوان", "adresse");
        m.insert("نهاية الصلاحية", "fin_validite");

        m.insert("الاسم التجاري", "marque");
        m.insert("الصنف", "type");
        m.insert("النوع", "genre");
        m.insert("النموذج", "modele");
        m.insert("نوع الوقود", "type_carburant");
        m.insert("رقم الإطار الحديدي", "numero_chassis");
        m.insert("عدد الأسطوانات", "nombre_cylindres");
        m.insert("القوة الجبائية", "puissance_fiscale");
        m.insert("عدد المقاعد", "nombre_places");
        m.insert("الوزن جمالي", "ptac");
        m.insert("الوزن الفارغ", "poids_vide");
        m.insert("الوزن الإجمالي مع المجرور", "ptra");
        m.insert("التقييدات", "restrictions");
        m
    };
}

/// Placeholder key for an Arabic label with no French equivalent. Stable
/// across runs: first four bytes of the SHA-256 of the label, mod 10000.
fn arabic_placeholder(label: &str) -> String {
    let digest = Sha256::digest(label.as_bytes());
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 10000;
    format!("field_ar_{}", n)
}

/// Canonical snake_case field name for a label pair. The French label wins
/// when present.
pub fn normalize_key(key_fr: Option<&str>, key_ar: Option<&str>) -> Option<String> {
    if let Some(fr) = key_fr.map(str::trim).filter(|k| !k.is_empty()) {
        let clean = fold_diacritics(&fr.to_lowercase());
        let clean = KEY_PUNCTUATION.replace_all(&clean, "");
        let clean = WHITESPACE.replace_all(&clean, " ").trim().to_string();

        if let Some(key) = FRENCH_KEYS.get(clean.as_str()) {
            return Some(key.to_string());
        }
        let snake = clean.replace(' ', "_");
        return Some(NON_WORD.replace_all(&snake, "").into_owned());
    }

    let ar = key_ar.map(str::trim).filter(|k| !k.is_empty())?;
    Some(match ARABIC_KEYS.get(ar) {
        Some(key) => key.to_string(),
        None => arabic_placeholder(ar),
    })
}

/// Flatten one record into `<key>_fr` / `<key>_ar` entries.
pub fn flatten_record(record: &DualLanguageRecord, out: &mut ExtractionResult) {
    let Some(base) = normalize_key(record.fr.key.as_deref(), record.ar.key.as_deref()) else {
        return;
    };
    let value_fr = record.fr.value.trim();
    let value_ar = record.ar.value.trim();

    if value_fr.is_empty() && value_ar.is_empty() {
        return;
    }

    if value_fr == value_ar {
        let suffix = if contains_arabic(value_fr) { "_ar" } else { "_fr" };
        out.insert(format!("{}{}", base, suffix), value_fr);
        return;
    }

    if !value_fr.is_empty() {
        out.insert(format!("{}_fr", base), value_fr);
    }
    if !value_ar.is_empty() {
        out.insert(format!("{}_ar", base), value_ar);
    }
}

pub fn flatten_records(records: &[DualLanguageRecord]) -> ExtractionResult {
    let mut out = ExtractionResult::new();
    for record in records {
        flatten_record(record, &mut out);
    }
    out
}

/// `11.02.1994` or `11/02/1994` to `11 02 1994`.
pub fn space_date(text: &str) -> String {
    let spaced = DATE_SEPARATORS.replace_all(text, " ");
    WHITESPACE.replace_all(&spaced, " ").trim().to_string()
}

/// Rewrite every non-empty date field with spaces as separators.
pub fn post_process(mut result: ExtractionResult) -> ExtractionResult {
    for (key, value) in result.values_mut() {
        if key.to_lowercase().contains("date") && !value.is_empty() {
            *value = space_date(value);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SideValue;

    fn record(key_fr: Option<&str>, fr: &str, key_ar: Option<&str>, ar: &str) -> DualLanguageRecord {
        DualLanguageRecord {
            field: "test".to_string(),
            fr: SideValue {
                key: key_fr.map(str::to_string),
                value: fr.to_string(),
                ..SideValue::default()
            },
            ar: SideValue {
                key: key_ar.map(str::to_string),
                value: ar.to_string(),
                ..SideValue::default()
            },
        }
    }

    #[test]
    fn test_normalize_french_keys() {
        assert_eq!(normalize_key(Some("Marque"), None).as_deref(), Some("marque"));
        assert_eq!(normalize_key(Some("N° du chassis"), None).as_deref(), Some("numero_chassis"));
        assert_eq!(
            normalize_key(Some("Numéro d'immatriculation"), Some("رقم التسجيل")).as_deref(),
            Some("numero_immatriculation")
        );
        assert_eq!(normalize_key(Some(" Poids à  vide "), None).as_deref(), Some("poids_vide"));
        assert_eq!(normalize_key(Some("Couleur dominante"), None).as_deref(), Some("couleur_dominante"));
        assert_eq!(normalize_key(Some("Carrosserie / Año"), None).as_deref(), Some("carrosserie__ano"));
    }

    #[test]
    fn test_normalize_arabic_keys() {
        assert_eq!(normalize_key(None, Some("النوع")).as_deref(), Some("genre"));
        assert_eq!(normalize_key(Some("  "), Some("المالك")).as_deref(), Some("proprietaire"));

        let placeholder = normalize_key(None, Some("اللون")).unwrap();
        assert!(placeholder.starts_with("field_ar_"));
        assert_eq!(normalize_key(None, Some("اللون")).unwrap(), placeholder);
        assert_eq!(normalize_key(None, None), None);
    }

    #[test]
    fn test_flatten_rules() {
        let records = vec![
            record(Some("Marque"), "TOYOTA", Some("الاسم التجاري"), "TOYOTA"),
            record(Some("Genre"), "VP", Some("النوع"), "سياحية"),
            record(Some("Type"), "", Some("الصنف"), ""),
            record(None, "", Some("المالك"), "العلمي"),
            record(Some("Adresse"), "الرباط", None, "الرباط"),
        ];
        let flat = flatten_records(&records);

        assert_eq!(flat.get("marque_fr"), Some("TOYOTA"));
        assert!(!flat.contains_key("marque_ar"));
        assert_eq!(flat.get("genre_fr"), Some("VP"));
        assert_eq!(flat.get("genre_ar"), Some("سياحية"));
        assert!(!flat.contains_key("type_fr") && !flat.contains_key("type_ar"));
        assert_eq!(flat.get("proprietaire_ar"), Some("العلمي"));
        assert_eq!(flat.get("adresse_ar"), Some("الرباط"));
        assert_eq!(flat.len(), 5);
    }

    #[test]
    fn test_post_process_spaces_dates() {
        let result: ExtractionResult = vec![
            ("date_mutation_fr".to_string(), "11.02.1994".to_string()),
            ("Date_Naissance".to_string(), "11/02/1994".to_string()),
            ("numero_chassis_fr".to_string(), "JT-123.4".to_string()),
        ]
        .into_iter()
        .collect();

        let processed = post_process(result);
        assert_eq!(processed.get("date_mutation_fr"), Some("11 02 1994"));
        assert_eq!(processed.get("Date_Naissance"), Some("11 02 1994"));
        assert_eq!(processed.get("numero_chassis_fr"), Some("JT-123.4"));
    }
}
