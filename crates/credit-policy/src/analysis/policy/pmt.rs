/// Round a currency value to cents, ties to even.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Fixed installment for an amortizing loan, rounded to cents.
///
/// Uses `pv * r / (1 - (1 + r)^-n)`. Financial libraries return this with a negative
/// sign for a positive present value; the amount here is always the positive payment.
/// A zero rate degenerates to straight division of the principal.
pub fn calculate_pmt(present_value: f64, periodic_rate: f64, periods: u32) -> f64 {
    if periods == 0 {
        return round_cents(present_value);
    }

    let n = periods as f64;
    let payment = if periodic_rate == 0.0 {
        present_value / n
    } else {
        present_value * periodic_rate / (1.0 - (1.0 + periodic_rate).powf(-n))
    };

    round_cents(payment)
}
