//! Footing arithmetic: line and payment sums must reconcile to the header
//! total within one cent.
//!
//! Rounding residue is absorbed into the last line's discount/surcharge
//! (resp. the last payment's amount) instead of being dropped; the remote
//! platform rejects batches whose amounts do not foot.

use cashlink_domain::{CashlinkError, Result, SaleLine, SalePayment};

/// Half a cent; differences below this are treated as already footed.
const TOLERANCE: f64 = 0.005;

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Remove lines whose net amount falls below one cent.
///
/// The platform rejects zero-value lines outright. If removal empties the
/// list the record is not sendable and the build must fail.
///
/// # Errors
/// Returns `CashlinkError::Payload` when no sendable line remains.
pub fn drop_subcent_lines(lines: &mut Vec<SaleLine>) -> Result<()> {
    lines.retain(|line| line.amount >= 0.01);
    if lines.is_empty() {
        return Err(CashlinkError::Payload(
            "no sendable lines remain after removing sub-cent amounts".into(),
        ));
    }
    Ok(())
}

/// Reconcile `sum(line.amount)` with the header total.
///
/// Any residual within reason is pushed into the last line: the amount is
/// adjusted and the difference reflected in that line's discount (shortfall)
/// or surcharge (excess).
pub fn foot_lines(lines: &mut [SaleLine], header_total: f64) {
    let Some(last_index) = lines.len().checked_sub(1) else {
        return;
    };

    let sum: f64 = lines.iter().map(|line| line.amount).sum();
    let residual = round2(header_total - round2(sum));
    if residual.abs() < TOLERANCE {
        return;
    }

    let last = &mut lines[last_index];
    last.amount = round2(last.amount + residual);
    if residual > 0.0 {
        last.surcharge = round2(last.surcharge + residual);
    } else {
        last.discount = round2(last.discount - residual);
    }
}

/// Reconcile `sum(payment.amount)` with the header total, absorbing the
/// residual into the last payment entry.
pub fn foot_payments(payments: &mut [SalePayment], header_total: f64) {
    let Some(last_index) = payments.len().checked_sub(1) else {
        return;
    };

    let sum: f64 = payments.iter().map(|payment| payment.amount).sum();
    let residual = round2(header_total - round2(sum));
    if residual.abs() < TOLERANCE {
        return;
    }

    payments[last_index].amount = round2(payments[last_index].amount + residual);
}
