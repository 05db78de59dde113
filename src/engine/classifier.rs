//! Keyword rules mapping a novelty description to a canned remediation note.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    CustomerAbsent,
    PaymentIssue,
    AddressCorrection,
    DeliveryRefused,
}

#[derive(Debug)]
pub struct ClassificationRule {
    pub category: Category,
    pub triggers: &'static [&'static str],
    pub message: &'static str,
}

/// Evaluated top to bottom; the first rule with a matching trigger wins.
pub static RULES: &[ClassificationRule] = &[
    ClassificationRule {
        category: Category::CustomerAbsent,
        triggers: &["CLIENTE AUSENTE", "NADIE EN CASA"],
        message: "Entramos en contacto con el cliente y él se disculpó y mencionó que estará en casa para recibir el producto en este próximo intento.",
    },
    ClassificationRule {
        category: Category::PaymentIssue,
        triggers: &["PROBLEMA COBRO"],
        message: "En llamada telefónica, el cliente afirmó que estará con dinero suficiente para comprar el producto, por favor intenten nuevamente.",
    },
    ClassificationRule {
        category: Category::AddressCorrection,
        triggers: &[
            "DIRECCIÓN INCORRECTA",
            "DIRECCION INCORRECTA",
            "FALTAN DATOS",
            "INUBICABLE",
            "COMUNA ERRADA",
            "CAMBIO DE DOMICILIO",
        ],
        message: "En llamada telefónica, el cliente rectificó sus datos para que la entrega suceda de forma más asertiva.",
    },
    ClassificationRule {
        category: Category::DeliveryRefused,
        triggers: &["RECHAZA", "RECHAZADA"],
        message: "En llamada telefónica, el cliente afirma que quiere el producto y mencionó que no fue buscado por la transportadora. Por lo tanto, por favor envíen el producto hasta el cliente.",
    },
];

pub fn matching_rule(text: &str) -> Option<&'static ClassificationRule> {
    let haystack = text.trim().to_uppercase();
    RULES
        .iter()
        .find(|rule| rule.triggers.iter().any(|t| haystack.contains(t)))
}

/// Remediation message for `text`, or an empty string when no rule applies.
pub fn classify(text: &str) -> &'static str {
    matching_rule(text).map_or("", |rule| rule.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_outranks_refusal() {
        let text = "Motivo: cliente ausente. El cliente rechaza la visita";
        assert_eq!(classify(text), RULES[0].message);
        assert_eq!(
            matching_rule(text).map(|r| r.category),
            Some(Category::CustomerAbsent)
        );
    }

    #[test]
    fn unrelated_text_has_no_message() {
        assert_eq!(classify("Paquete dañado en bodega"), "");
        assert_eq!(classify(""), "");
    }

    #[test]
    fn matching_is_case_insensitive_and_accent_aware() {
        assert_eq!(
            matching_rule("  dirección incorrecta  ").map(|r| r.category),
            Some(Category::AddressCorrection)
        );
        assert_eq!(
            matching_rule("Problema cobro en destino").map(|r| r.category),
            Some(Category::PaymentIssue)
        );
    }

    #[test]
    fn substring_containment_not_tokens() {
        // "RECHAZADA" also contains "RECHAZA"; either way it is a refusal.
        assert_eq!(
            matching_rule("ENTREGA RECHAZADA").map(|r| r.category),
            Some(Category::DeliveryRefused)
        );
        assert_eq!(
            matching_rule("NADIE EN CASAS").map(|r| r.category),
            Some(Category::CustomerAbsent)
        );
    }

    #[test]
    fn address_rule_precedes_refusal() {
        let text = "COMUNA ERRADA - cliente rechaza";
        assert_eq!(
            matching_rule(text).map(|r| r.category),
            Some(Category::AddressCorrection)
        );
    }
}
