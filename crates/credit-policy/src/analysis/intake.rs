use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::domain::{LoanApplication, LoanId, LoanRequest, LoanStatus};
use super::policy::StakeholderPolicy;

/// Single field that failed intake validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation errors raised by the intake guard, one per offending field.
#[derive(Debug, thiserror::Error)]
#[error("invalid loan request: {}", render(.violations))]
pub struct IntakeError {
    pub violations: Vec<FieldViolation>,
}

impl IntakeError {
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|violation| violation.field == field)
    }
}

fn render(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Guard turning raw requests into stored applications for one stakeholder.
///
/// Amount and terms are checked here, against the stakeholder's thresholds, and are not
/// re-checked by the analysis steps.
pub struct IntakeGuard<'a> {
    policy: &'a dyn StakeholderPolicy,
}

impl<'a> IntakeGuard<'a> {
    pub fn new(policy: &'a dyn StakeholderPolicy) -> Self {
        Self { policy }
    }

    pub fn admit(
        &self,
        request: LoanRequest,
        today: NaiveDate,
    ) -> Result<LoanApplication, IntakeError> {
        let mut violations = Vec::new();
        let mut reject = |field: &'static str, message: String| {
            violations.push(FieldViolation { field, message });
        };

        let name = request.name.trim().to_string();
        if name.is_empty() {
            reject("name", "Field may not be blank.".to_string());
        }

        let cpf = only_digits(&request.cpf);
        if !is_valid_cpf(&cpf) {
            reject("cpf", "Invalid CPF number.".to_string());
        }

        let birthdate = match NaiveDate::parse_from_str(request.birthdate.trim(), "%Y-%m-%d") {
            Ok(date) if date >= today => {
                reject("birthdate", "Date must be lower than today".to_string());
                None
            }
            Ok(date) => Some(date),
            Err(_) => {
                reject("birthdate", "Date must be in format YYYY-MM-DD".to_string());
                None
            }
        };

        let thresholds = self.policy.thresholds();
        if !self.policy.run_amount_policy(request.amount) {
            reject(
                "amount",
                format!(
                    "Amount must be between {:?} and {:?}. Current: {:?}",
                    thresholds.minimum_amount, thresholds.maximum_amount, request.amount
                ),
            );
        }

        if !self.policy.run_terms_policy(request.terms) {
            reject(
                "terms",
                format!("Terms must be one of {:?}.", thresholds.valid_terms),
            );
        }

        if !(request.income.is_finite() && request.income > 0.0) {
            reject("income", "Income must be positive.".to_string());
        }

        match birthdate {
            Some(birthdate) if violations.is_empty() => Ok(LoanApplication {
                id: LoanId::generate(),
                stakeholder: self.policy.stakeholder(),
                name,
                cpf,
                birthdate,
                amount: request.amount,
                terms: request.terms,
                income: request.income,
                status: LoanStatus::Processing,
                result: None,
                refused_policy: None,
                allowed_amount: None,
                allowed_terms: None,
                version: 0,
            }),
            _ => Err(IntakeError { violations }),
        }
    }
}

/// Decode a raw request body, reporting every missing or mistyped field.
pub fn parse_request(payload: &Value) -> Result<LoanRequest, IntakeError> {
    let Some(fields) = payload.as_object() else {
        return Err(IntakeError {
            violations: vec![FieldViolation {
                field: "_schema",
                message: "Invalid input type.".to_string(),
            }],
        });
    };

    let mut violations = Vec::new();
    let name = required(fields, "name", text, &mut violations);
    let cpf = required(fields, "cpf", text, &mut violations);
    let birthdate = required(fields, "birthdate", text, &mut violations);
    let amount = required(fields, "amount", number, &mut violations);
    let terms = required(fields, "terms", whole_number, &mut violations);
    let income = required(fields, "income", number, &mut violations);

    match (name, cpf, birthdate, amount, terms, income) {
        (Some(name), Some(cpf), Some(birthdate), Some(amount), Some(terms), Some(income))
            if violations.is_empty() =>
        {
            Ok(LoanRequest {
                name,
                cpf,
                birthdate,
                amount,
                terms,
                income,
            })
        }
        _ => Err(IntakeError { violations }),
    }
}

fn required<T>(
    fields: &Map<String, Value>,
    field: &'static str,
    decode: fn(&Value) -> Result<T, &'static str>,
    violations: &mut Vec<FieldViolation>,
) -> Option<T> {
    let outcome = match fields.get(field) {
        None => Err("Missing data for required field."),
        Some(Value::Null) => Err("Field may not be null."),
        Some(value) => decode(value),
    };
    match outcome {
        Ok(value) => Some(value),
        Err(message) => {
            violations.push(FieldViolation {
                field,
                message: message.to_string(),
            });
            None
        }
    }
}

fn text(value: &Value) -> Result<String, &'static str> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or("Not a valid string.")
}

fn number(value: &Value) -> Result<f64, &'static str> {
    value.as_f64().ok_or("Not a valid number.")
}

fn whole_number(value: &Value) -> Result<u32, &'static str> {
    let whole = match value.as_u64() {
        Some(whole) => Some(whole),
        None => value
            .as_f64()
            .filter(|raw| raw.fract() == 0.0 && *raw >= 0.0 && *raw <= f64::from(u32::MAX))
            .map(|raw| raw as u64),
    };
    whole
        .and_then(|whole| u32::try_from(whole).ok())
        .ok_or("Not a valid integer.")
}

pub fn only_digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Brazilian individual taxpayer id: eleven digits, not all equal, two mod-11 check digits.
pub fn is_valid_cpf(digits: &str) -> bool {
    let numbers: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if numbers.len() != 11 || digits.len() != 11 {
        return false;
    }
    if numbers.iter().all(|digit| *digit == numbers[0]) {
        return false;
    }

    let check_digit = |len: usize| -> u32 {
        let weight_start = len as u32 + 1;
        let sum: u32 = numbers[..len]
            .iter()
            .enumerate()
            .map(|(index, digit)| digit * (weight_start - index as u32))
            .sum();
        match (sum * 10) % 11 {
            10 => 0,
            remainder => remainder,
        }
    };

    check_digit(9) == numbers[9] && check_digit(10) == numbers[10]
}
