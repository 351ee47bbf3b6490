//! Record validation and transformation.
//!
//! Converts a raw [`ProductModel`] row into a sanitized, remote-shaped
//! [`ValidatedProduct`]. Validation collects *every* violation found on a
//! record rather than stopping at the first, so a failed record carries a
//! complete diagnosis into the final report.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::entity::prelude::ProductModel;
use crate::error::SyncError;

/// Maximum title length in characters. Longer titles are truncated with a
/// trailing ellipsis (warning, not error).
pub const MAX_TITLE_CHARS: usize = 250;

/// Maximum description length in characters, truncated the same way.
pub const MAX_DESCRIPTION_CHARS: usize = 2_000;

/// Price bounds in minor currency units (inclusive).
pub const MIN_UNIT_AMOUNT: i64 = 1;
pub const MAX_UNIT_AMOUNT: i64 = 99_999_999;

/// Ceiling on the serialized metadata map, in bytes. The remote platform
/// rejects entities whose metadata exceeds this.
pub const METADATA_MAX_BYTES: usize = 1_000;

/// Metadata key carrying the source identifier. Never dropped: it is the
/// idempotency key for find-or-create.
pub const METADATA_SOURCE_ID: &str = "source_id";

const ELLIPSIS: char = '…';

/// One validation violation on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub reason: String,
}

impl Violation {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Fold a violation list into a single record-level error.
pub fn violations_to_error(violations: &[Violation]) -> SyncError {
    let field = violations.first().map(|v| v.field).unwrap_or("record");
    let reason = violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.reason))
        .collect::<Vec<_>>()
        .join("; ");
    SyncError::validation(field, reason)
}

/// Sanitized, remote-platform-shaped payload derived from one source row.
/// Produced fresh per record and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedProduct {
    pub source_id: uuid::Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Price in integer minor currency units (e.g. cents).
    pub unit_amount: i64,
    /// Lowercase ISO currency code.
    pub currency: String,
    pub available: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Outcome of validating one record: the payload plus any non-fatal
/// warnings raised while sanitizing it.
#[derive(Debug, Clone)]
pub struct Validated {
    pub product: ValidatedProduct,
    pub warnings: Vec<String>,
}

/// Partition of a batch into processable and unprocessable records.
#[derive(Debug, Default)]
pub struct BatchValidation {
    pub valid: Vec<(ProductModel, ValidatedProduct)>,
    pub invalid: Vec<(ProductModel, Vec<Violation>)>,
    pub warnings: Vec<String>,
}

/// Validates and transforms source records.
///
/// In lenient mode (the `--skip-validation` path) title and description
/// rules are downgraded to warnings and an empty title becomes a
/// placeholder, but price parsing stays a hard error since no payload can
/// be built without an amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    lenient: bool,
}

impl Validator {
    pub fn new() -> Self {
        Self { lenient: false }
    }

    pub fn lenient() -> Self {
        Self { lenient: true }
    }

    /// Validate one record, collecting all violations.
    pub fn validate(&self, record: &ProductModel) -> Result<Validated, Vec<Violation>> {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        let title = match sanitize_title(&record.title) {
            Ok((title, truncated)) => {
                if truncated {
                    warnings.push(format!(
                        "product {}: title truncated to {MAX_TITLE_CHARS} characters",
                        record.id
                    ));
                }
                title
            }
            Err(v) if self.lenient => {
                warnings.push(format!("product {}: {}: {}", record.id, v.field, v.reason));
                "Untitled".to_string()
            }
            Err(v) => {
                violations.push(v);
                String::new()
            }
        };

        let description = record.description.as_deref().and_then(|d| {
            let d = d.trim();
            if d.is_empty() {
                return None;
            }
            let (desc, truncated) = truncate_with_ellipsis(d, MAX_DESCRIPTION_CHARS);
            if truncated {
                warnings.push(format!(
                    "product {}: description truncated to {MAX_DESCRIPTION_CHARS} characters",
                    record.id
                ));
            }
            Some(desc)
        });

        let unit_amount = match parse_price(&record.price) {
            Ok(amount) => amount,
            Err(v) => {
                violations.push(v);
                0
            }
        };

        let currency = record.currency.trim().to_ascii_lowercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            violations.push(Violation::new(
                "currency",
                format!("expected a 3-letter currency code, got {:?}", record.currency),
            ));
        }

        if !violations.is_empty() {
            return Err(violations);
        }

        let metadata = build_metadata(record, &mut warnings);

        Ok(Validated {
            product: ValidatedProduct {
                source_id: record.id,
                title,
                description,
                unit_amount,
                currency,
                available: record.available,
                metadata,
            },
            warnings,
        })
    }

    /// Partition a batch without raising. Invalid records are returned with
    /// their violation lists so the caller can record them as failures and
    /// keep going.
    pub fn validate_batch(&self, records: Vec<ProductModel>) -> BatchValidation {
        let mut out = BatchValidation::default();
        for record in records {
            match self.validate(&record) {
                Ok(validated) => {
                    out.warnings.extend(validated.warnings);
                    out.valid.push((record, validated.product));
                }
                Err(violations) => out.invalid.push((record, violations)),
            }
        }
        out
    }
}

fn sanitize_title(raw: &str) -> Result<(String, bool), Violation> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Violation::new("title", "title is required and must be non-empty"));
    }
    Ok(truncate_with_ellipsis(trimmed, MAX_TITLE_CHARS))
}

/// Truncate to `max` characters, replacing the tail with a single ellipsis
/// so the result is exactly `max` characters long. Counts chars, not bytes.
fn truncate_with_ellipsis(text: &str, max: usize) -> (String, bool) {
    if text.chars().count() <= max {
        return (text.to_string(), false);
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    truncated.push(ELLIPSIS);
    (truncated, true)
}

/// Parse a free-text price into integer minor units.
///
/// Strips currency symbols and whitespace, normalizes the decimal separator
/// (`"25,50"` and `"25.50"` both parse to 2550), rounds to the nearest minor
/// unit, and rejects zero, negative, non-numeric, or out-of-bound amounts.
pub fn parse_price(raw: &str) -> Result<i64, Violation> {
    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();

    if stripped.is_empty() {
        return Err(Violation::new(
            "price",
            format!("not a numeric amount: {raw:?}"),
        ));
    }

    // A comma alongside a dot is a thousands separator; a lone comma is a
    // decimal separator.
    let normalized = if stripped.contains('.') {
        stripped.replace(',', "")
    } else {
        stripped.replace(',', ".")
    };

    let amount: f64 = normalized
        .parse()
        .map_err(|_| Violation::new("price", format!("not a numeric amount: {raw:?}")))?;

    let minor = (amount * 100.0).round() as i64;
    if minor <= 0 {
        return Err(Violation::new(
            "price",
            format!("amount must be positive, got {raw:?}"),
        ));
    }
    if !(MIN_UNIT_AMOUNT..=MAX_UNIT_AMOUNT).contains(&minor) {
        return Err(Violation::new(
            "price",
            format!("amount {minor} outside [{MIN_UNIT_AMOUNT}, {MAX_UNIT_AMOUNT}]"),
        ));
    }
    Ok(minor)
}

/// Build the metadata map from the fixed key set, then enforce the size
/// ceiling by dropping non-essential keys (subcategory first, then category,
/// then the migration timestamp). The source id is never dropped.
fn build_metadata(record: &ProductModel, warnings: &mut Vec<String>) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(METADATA_SOURCE_ID.to_string(), record.id.to_string());
    if let Some(category) = record.category.as_deref().map(str::trim) {
        if !category.is_empty() {
            metadata.insert("category".to_string(), category.to_string());
        }
    }
    if let Some(subcategory) = record.subcategory.as_deref().map(str::trim) {
        if !subcategory.is_empty() {
            metadata.insert("subcategory".to_string(), subcategory.to_string());
        }
    }
    metadata.insert("migrated_at".to_string(), Utc::now().to_rfc3339());

    for key in ["subcategory", "category", "migrated_at"] {
        if serialized_len(&metadata) <= METADATA_MAX_BYTES {
            break;
        }
        if metadata.remove(key).is_some() {
            warnings.push(format!(
                "product {}: metadata over {METADATA_MAX_BYTES} bytes, dropped key {key:?}",
                record.id
            ));
        }
    }
    metadata
}

fn serialized_len(metadata: &BTreeMap<String, String>) -> usize {
    serde_json::to_string(metadata).map(|s| s.len()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::sync_status::SyncStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(title: &str, price: &str) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            price: price.to_string(),
            currency: "usd".to_string(),
            category: None,
            subcategory: None,
            dimensions: None,
            weight_grams: None,
            available: true,
            remote_product_id: None,
            remote_price_id: None,
            sync_status: SyncStatus::Unset,
            sync_error: None,
            synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn both_decimal_separators_parse_to_same_minor_units() {
        assert_eq!(parse_price("25.50").unwrap(), 2550);
        assert_eq!(parse_price("25,50").unwrap(), 2550);
    }

    #[test]
    fn currency_symbols_and_thousands_separators_are_stripped() {
        assert_eq!(parse_price("$1,299.99").unwrap(), 129999);
        assert_eq!(parse_price("€ 19,95").unwrap(), 1995);
        assert_eq!(parse_price(" 42 ").unwrap(), 4200);
    }

    #[test]
    fn zero_negative_and_garbage_prices_are_rejected() {
        assert!(parse_price("0").is_err());
        assert!(parse_price("-5.00").is_err());
        assert!(parse_price("free").is_err());
        assert!(parse_price("").is_err());
    }

    #[test]
    fn out_of_bound_price_is_rejected() {
        assert!(parse_price("1000000.00").is_err());
        assert_eq!(parse_price("999999.99").unwrap(), MAX_UNIT_AMOUNT);
    }

    #[test]
    fn overlong_title_is_truncated_to_max_with_ellipsis() {
        let long = "x".repeat(MAX_TITLE_CHARS + 40);
        let validated = Validator::new().validate(&record(&long, "9.99")).unwrap();
        assert_eq!(validated.product.title.chars().count(), MAX_TITLE_CHARS);
        assert!(validated.product.title.ends_with('…'));
        assert!(!validated.warnings.is_empty());
    }

    #[test]
    fn title_at_or_under_max_is_unchanged() {
        let exact = "y".repeat(MAX_TITLE_CHARS);
        let validated = Validator::new().validate(&record(&exact, "9.99")).unwrap();
        assert_eq!(validated.product.title, exact);
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn validate_collects_all_violations() {
        let mut bad = record("  ", "free");
        bad.currency = "dollars".to_string();
        let violations = Validator::new().validate(&bad).unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["title", "price", "currency"]);
    }

    #[test]
    fn metadata_carries_source_id_and_drops_nonessential_keys_over_ceiling() {
        let mut r = record("widget", "5.00");
        r.category = Some("a".repeat(600));
        r.subcategory = Some("b".repeat(600));
        let validated = Validator::new().validate(&r).unwrap();
        let metadata = &validated.product.metadata;
        assert_eq!(metadata.get(METADATA_SOURCE_ID), Some(&r.id.to_string()));
        assert!(!metadata.contains_key("subcategory"));
        assert!(serialized_len(metadata) <= METADATA_MAX_BYTES);
    }

    #[test]
    fn validate_batch_partitions_without_raising() {
        let records = vec![record("", "9.99"), record("ok", "0"), record("good", "3.50")];
        let batch = Validator::new().validate_batch(records);
        assert_eq!(batch.valid.len(), 1);
        assert_eq!(batch.invalid.len(), 2);
        assert_eq!(batch.valid[0].1.unit_amount, 350);
    }

    #[test]
    fn lenient_mode_downgrades_empty_title_but_not_bad_price() {
        let validated = Validator::lenient().validate(&record("", "9.99")).unwrap();
        assert_eq!(validated.product.title, "Untitled");
        assert!(!validated.warnings.is_empty());

        assert!(Validator::lenient().validate(&record("", "free")).is_err());
    }

    #[test]
    fn violations_fold_into_one_record_error() {
        let violations = vec![
            Violation::new("title", "title is required and must be non-empty"),
            Violation::new("price", "amount must be positive, got \"0\""),
        ];
        let err = violations_to_error(&violations);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("title"));
        assert!(err.to_string().contains("price"));
    }
}
