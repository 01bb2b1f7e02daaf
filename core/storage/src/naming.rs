//! Drive file names for generated invoices.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("static pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

const DEFAULT_BUYER: &str = "Unknown";
const DEFAULT_INVOICE_NO: &str = "1";
const DEFAULT_EXTENSION: &str = "pdf";

/// Fold diacritics, drop punctuation and join words with underscores.
///
/// `"Açme Corp!"` becomes `"Acme_Corp"`.
pub fn sanitize_buyer_name(name: &str) -> String {
    let folded: String = name.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let stripped = DISALLOWED.replace_all(&folded, "");
    WHITESPACE.replace_all(stripped.trim(), "_").into_owned()
}

/// Name an uploaded invoice `<Buyer>_(Invoice_<no>).<ext>`.
///
/// The extension comes from `original_filename` and defaults to `pdf`.
/// Path separators in the invoice number and the extension are replaced
/// so the result is always a single path component.
pub fn derive_invoice_filename(
    buyer_name: Option<&str>,
    invoice_no: Option<&str>,
    original_filename: &str,
) -> String {
    let buyer = sanitize_buyer_name(buyer_name.unwrap_or(DEFAULT_BUYER));
    let invoice_no = invoice_no
        .map(str::trim)
        .filter(|no| !no.is_empty())
        .unwrap_or(DEFAULT_INVOICE_NO)
        .replace(['/', '\\'], "-");
    let extension = original_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or(DEFAULT_EXTENSION)
        .replace(['/', '\\'], "-");

    format!("{}_(Invoice_{}).{}", buyer, invoice_no, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_diacritics_and_punctuation() {
        assert_eq!(
            derive_invoice_filename(Some("Açme Corp!"), Some("7"), "x.pdf"),
            "Acme_Corp_(Invoice_7).pdf"
        );
        assert_eq!(sanitize_buyer_name("  Société   Générale  "), "Societe_Generale");
        assert_eq!(sanitize_buyer_name("Smith-Jones & Co."), "Smith-Jones_Co");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            derive_invoice_filename(None, None, "blob"),
            "Unknown_(Invoice_1).pdf"
        );
        assert_eq!(
            derive_invoice_filename(Some("Acme"), Some("  "), "scan.final.PDF"),
            "Acme_(Invoice_1).PDF"
        );
    }

    #[test]
    fn test_invoice_number_never_adds_path_components() {
        assert_eq!(
            derive_invoice_filename(Some("Acme"), Some("../2024/7"), "a.pdf"),
            "Acme_(Invoice_..-2024-7).pdf"
        );
    }

    #[test]
    fn test_extension_never_adds_path_components() {
        assert_eq!(
            derive_invoice_filename(Some("Acme"), Some("7"), "invoice.v2/../x"),
            "Acme_(Invoice_7).-x"
        );
        assert_eq!(
            derive_invoice_filename(Some("Acme"), Some("7"), "scan.a\\b"),
            "Acme_(Invoice_7).a-b"
        );
    }

    proptest! {
        #[test]
        fn test_sanitized_buyer_is_word_characters(name in "\\PC{0,40}") {
            let sanitized = sanitize_buyer_name(&name);
            let allowed = Regex::new(r"^[\w-]*$").unwrap();
            prop_assert!(allowed.is_match(&sanitized), "{:?}", sanitized);
        }

        #[test]
        fn test_derivation_is_deterministic(
            buyer in "\\PC{0,20}",
            no in "[0-9A-Za-z/]{0,8}",
            file in "[a-z]{1,6}(\\.[a-z/\\\\]{1,4})?",
        ) {
            let first = derive_invoice_filename(Some(&buyer), Some(&no), &file);
            let second = derive_invoice_filename(Some(&buyer), Some(&no), &file);
            prop_assert_eq!(&first, &second);
            prop_assert!(!first.contains('/'));
            prop_assert!(!first.contains('\\'));
            prop_assert!(first.contains("_(Invoice_"));
        }
    }
}
