//! # Validation Module
//!
//! Draft validation for the billing core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI (out of scope)                                            │
//! │  └── Immediate format feedback                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - rejected before any write, no partial effect   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Store-level guards (duplicate-invoice query, fail-closed     │
//! │           batches) in taller-store                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{ValidationError, ValidationResult};
use crate::types::SaleDraft;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates an invoice number.
///
/// Invoice numbers are caller-supplied opaque unique strings; the only
/// local rule is non-emptiness - uniqueness is the store-level guard.
pub fn validate_invoice_number(invoice_number: &str) -> ValidationResult<()> {
    if invoice_number.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "invoice_number".to_string(),
        });
    }
    Ok(())
}

/// Validates a ledger quantity: strictly positive, direction is carried by
/// the movement type.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a monetary amount in cents: strictly positive. Caja movements
/// store positive amounts; sign is applied at presentation time.
pub fn validate_amount(amount_cents: i64) -> ValidationResult<()> {
    if amount_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount_cents".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Draft Validation
// =============================================================================

/// Validates a sale draft before submission.
///
/// ## Rules
/// - invoice number non-empty
/// - at least one product line, all quantities positive
/// - `total_cents == Σ(unit_price × quantity)`
pub fn validate_sale_draft(draft: &SaleDraft) -> ValidationResult<()> {
    validate_invoice_number(&draft.invoice_number)?;

    if draft.products.is_empty() {
        return Err(ValidationError::Empty {
            field: "products".to_string(),
        });
    }

    for line in &draft.products {
        validate_quantity(line.quantity)?;
    }

    let line_sum = draft.line_sum_cents();
    if draft.total_cents != line_sum {
        return Err(ValidationError::TotalMismatch {
            total_cents: draft.total_cents,
            line_sum_cents: line_sum,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InvoiceLine, PaymentType};
    use chrono::NaiveDate;

    fn draft() -> SaleDraft {
        SaleDraft {
            invoice_number: "20260823-0001".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 8, 23).unwrap(),
            client_name: "Ana".to_string(),
            equipment_id: "eq-1".to_string(),
            products: vec![InvoiceLine {
                product_id: "p1".to_string(),
                name: "Filtro".to_string(),
                quantity: 2,
                unit_price_cents: 1500,
            }],
            total_cents: 3000,
            payment_type: PaymentType::Contado,
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(validate_sale_draft(&draft()).is_ok());
    }

    #[test]
    fn test_empty_invoice_number() {
        let mut d = draft();
        d.invoice_number = "  ".to_string();
        assert!(matches!(
            validate_sale_draft(&d),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_empty_products() {
        let mut d = draft();
        d.products.clear();
        d.total_cents = 0;
        assert!(matches!(
            validate_sale_draft(&d),
            Err(ValidationError::Empty { .. })
        ));
    }

    #[test]
    fn test_total_mismatch() {
        let mut d = draft();
        d.total_cents = 2999;
        assert!(matches!(
            validate_sale_draft(&d),
            Err(ValidationError::TotalMismatch { .. })
        ));
    }

    #[test]
    fn test_non_positive_line_quantity() {
        let mut d = draft();
        d.products[0].quantity = 0;
        assert!(validate_sale_draft(&d).is_err());
    }
}
