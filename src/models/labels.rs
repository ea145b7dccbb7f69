/// A printed bilingual label on the registration card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLabel {
    pub key: &'static str,
    pub fr: &'static str,
    pub ar: &'static str,
    /// Value may wrap onto the following lines (owner name, address).
    pub multi_line: bool,
}

const fn label(key: &'static str, fr: &'static str, ar: &'static str, multi_line: bool) -> FieldLabel {
    FieldLabel { key, fr, ar, multi_line }
}

/// Front side (owner and registration data).
pub const RECTO_LABELS: &[FieldLabel] = &[
    label("registration_number", "Numéro d'immatriculation", "رقم التسجيل", false),
    label("previous_registration", "Immatriculation antérieure", "الترقيم السابق", false),
    label("first_registration_date", "Première mise en circulation", "أول شروع في الإستخدام", false),
    label("first_usage_date", "M.C au maroc", "أول استخدام بالمغرب", false),
    label("date_mutation", "Mutation le", "تحويل بتاريخ", false),
    label("usage", "Usage", "نوع الإستعمال", false),
    label("owner", "Propriétaire", "المالك", true),
    label("address", "Adresse", "العنوان", true),
    label("expiry_date", "Fin de validité", "نهاية الصلاحية", false),
];

/// Back side (vehicle data).
pub const VERSO_LABELS: &[FieldLabel] = &[
    label("marque", "Marque", "الاسم التجاري", false),
    label("type", "Type", "الصنف", false),
    label("genre", "Genre", "النوع", false),
    label("modele", "Modèle", "النموذج", false),
    label("type_carburant", "Type carburant", "نوع الوقود", false),
    label("numero_chassis", "N° du chassis", "رقم الإطار الحديدي", false),
    label("nombre_cylindres", "Nombre de cylindres", "عدد الأسطوانات", false),
    label("puissance_fiscale", "Puissance fiscale", "القوة الجبائية", false),
    label("nombre_places", "Nombre de places", "عدد المقاعد", false),
    label("ptac", "P.T.A.C", "الوزن جمالي", false),
    label("poids_vide", "Poids à vide", "الوزن الفارغ", false),
    label("ptra", "P.T.R.A", "الوزن الإجمالي مع المجرور", false),
    label("restrictions", "Restrictions", "التقييدات", false),
];
