//! Level-payment loan math and the two tools built on it:
//! `generate_amortization` and `solve_loan_parameter`.
//!
//! Rates are annual percentages (`6.0` means 6%). Months are 30 days when
//! converting a payment count into a date.

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use finassist_core::artifact::{Artifact, ArtifactKind, ChartData, DataLabels, RowData};
use finassist_core::error::ToolError;
use finassist_core::tool::{Tool, ToolContext, ToolOutput};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::format::{cents, failed, parse_args, render_artifact, tool_message_content};

/// Payments within half a cent of the remaining balance settle the loan.
const SETTLE_EPSILON: f64 = 0.005;
/// Allowed shortfall against the level payment.
const PAYMENT_TOLERANCE: f64 = 0.01;
const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Loan math ────────────────────────────────────────────────────────────

fn monthly_rate(annual_rate: f64) -> f64 {
    annual_rate / 12.0 / 100.0
}

/// Payment that retires `balance` in exactly `term_months` payments.
pub fn level_payment(balance: f64, annual_rate: f64, term_months: u32) -> f64 {
    let r = monthly_rate(annual_rate);
    let n = f64::from(term_months);
    if r == 0.0 {
        return balance / n;
    }
    let factor = (1.0 + r).powf(n);
    balance * r * factor / (factor - 1.0)
}

/// Number of payments needed to retire `balance` at `payment` per month.
pub fn solve_term(balance: f64, annual_rate: f64, payment: f64) -> Result<u32, String> {
    if payment <= 0.0 {
        return Err("Monthly payment must be positive".into());
    }
    let r = monthly_rate(annual_rate);
    let months = if r == 0.0 {
        (balance / payment).ceil()
    } else {
        if payment <= balance * r {
            return Err("Payment too small to pay off loan".into());
        }
        ((payment / (payment - balance * r)).ln() / (1.0 + r).ln()).ceil()
    };
    Ok(months as u32)
}

/// Annual rate (percent) at which `payment` retires `balance` in
/// `term_months` payments. Bisection on the level-payment function.
pub fn solve_rate(balance: f64, term_months: u32, payment: f64) -> Result<f64, String> {
    if term_months == 0 || payment <= 0.0 {
        return Err("Invalid parameters for solving interest rate".into());
    }
    if payment < level_payment(balance, 0.0, term_months) - PAYMENT_TOLERANCE {
        return Err("Payment is too small to repay the loan at any non-negative rate".into());
    }

    let (mut lo, mut hi) = (0.0_f64, 100.0_f64);
    if level_payment(balance, hi, term_months) < payment {
        return Err("Could not converge on interest rate solution".into());
    }
    for _ in 0..200 {
        let mid = (lo + hi) / 2.0;
        if level_payment(balance, mid, term_months) < payment {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok((lo + hi) / 2.0)
}

/// Validated inputs for an amortization schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanTerms {
    pub balance: f64,
    pub annual_rate: f64,
    pub term_months: u32,
    pub monthly_payment: f64,
    pub start_date: NaiveDate,
}

impl LoanTerms {
    /// Check ranges and that the payment retires the loan within the term.
    pub fn validate(&self) -> Result<(), String> {
        if self.balance <= 0.0 {
            return Err("Balance must be positive".into());
        }
        if self.annual_rate < 0.0 {
            return Err("Annual rate cannot be negative".into());
        }
        if self.term_months == 0 {
            return Err("Term months must be positive".into());
        }
        if self.monthly_payment <= 0.0 {
            return Err("Monthly payment must be positive".into());
        }

        let monthly_interest = self.balance * monthly_rate(self.annual_rate);
        if self.monthly_payment <= monthly_interest {
            return Err(format!(
                "Monthly payment of ${:.2} is insufficient. Minimum payment to cover interest is ${:.2}. \
                 This would result in negative amortization where the loan balance grows over time",
                self.monthly_payment, monthly_interest
            ));
        }

        let required = level_payment(self.balance, self.annual_rate, self.term_months);
        if self.monthly_payment < required - PAYMENT_TOLERANCE {
            return Err(format!(
                "Monthly payment of ${:.2} is insufficient to pay off the loan in {} months. \
                 Minimum payment required is ${:.2}",
                self.monthly_payment, self.term_months, required
            ));
        }
        Ok(())
    }
}

/// One month of the schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    pub month: u32,
    pub principal: f64,
    pub interest: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmortizationSummary {
    pub original_balance: f64,
    pub total_payments: u32,
    pub total_interest_paid: f64,
    pub total_principal_paid: f64,
    pub total_amount_paid: f64,
    pub monthly_payment: f64,
    pub start_date: String,
    pub loan_fully_paid_off: bool,
    pub remaining_balance: f64,
    pub payoff_date: Option<String>,
    pub months_to_payoff: Option<u32>,
    pub years_to_payoff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub rows: Vec<ScheduleRow>,
    pub summary: AmortizationSummary,
}

/// Effect of paying extra each month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Savings {
    pub interest_saved: f64,
    pub months_saved: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regular_schedule_remaining_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_schedule_remaining_balance: Option<f64>,
}

fn add_months(start: NaiveDate, months: u32) -> NaiveDate {
    start + Duration::days(i64::from(months) * 30)
}

/// Build the month-by-month schedule. Stops early once the balance is gone.
pub fn amortize(terms: &LoanTerms) -> Schedule {
    let r = monthly_rate(terms.annual_rate);
    let mut balance = terms.balance;
    let mut rows = Vec::new();
    let mut total_interest = 0.0;
    let mut total_principal = 0.0;
    let mut months = 0;

    for month in 1..=terms.term_months {
        if balance <= 0.0 {
            break;
        }
        let interest = balance * r;
        let principal = if balance + interest <= terms.monthly_payment + SETTLE_EPSILON {
            let last = balance;
            balance = 0.0;
            last
        } else {
            let p = terms.monthly_payment - interest;
            balance = (balance - p).max(0.0);
            p
        };

        rows.push(ScheduleRow {
            month,
            principal: cents(principal),
            interest: cents(interest),
            balance: cents(balance),
        });
        total_interest += interest;
        total_principal += principal;
        months = month;

        if balance == 0.0 {
            break;
        }
    }

    let paid_off = balance == 0.0;
    let summary = AmortizationSummary {
        original_balance: terms.balance,
        total_payments: months,
        total_interest_paid: cents(total_interest),
        total_principal_paid: cents(total_principal),
        total_amount_paid: cents(total_interest + total_principal),
        monthly_payment: terms.monthly_payment,
        start_date: terms.start_date.format(DATE_FORMAT).to_string(),
        loan_fully_paid_off: paid_off,
        remaining_balance: cents(balance),
        payoff_date: paid_off.then(|| add_months(terms.start_date, months).format(DATE_FORMAT).to_string()),
        months_to_payoff: paid_off.then_some(months),
        years_to_payoff: paid_off.then(|| (f64::from(months) / 12.0 * 10.0).round() / 10.0),
    };

    Schedule { rows, summary }
}

/// Compare a regular schedule with one that pays extra.
pub fn savings(regular: &AmortizationSummary, extra: &AmortizationSummary) -> Savings {
    let interest_saved = cents(regular.total_interest_paid - extra.total_interest_paid);
    match (regular.months_to_payoff, extra.months_to_payoff) {
        (Some(a), Some(b)) => Savings {
            interest_saved,
            months_saved: Some(a.saturating_sub(b)),
            regular_schedule_remaining_balance: None,
            extra_schedule_remaining_balance: None,
        },
        (regular_months, extra_months) => Savings {
            interest_saved,
            months_saved: None,
            regular_schedule_remaining_balance: regular_months.is_none().then_some(regular.remaining_balance),
            extra_schedule_remaining_balance: extra_months.is_none().then_some(extra.remaining_balance),
        },
    }
}

// ── Chart shaping ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisualKind {
    AmortizationPlot,
    SummaryChart,
}

fn month_label(start: NaiveDate, month: u32) -> serde_json::Value {
    serde_json::Value::String(add_months(start, month).format("%Y-%m").to_string())
}

/// Keep every 12th point above 60, every 6th above 24. The last point stays.
fn thin<T: Clone>(rows: Vec<T>) -> Vec<T> {
    let n = rows.len();
    let step = match n {
        n if n > 60 => 12,
        n if n > 24 => 6,
        _ => return rows,
    };
    let mut kept: Vec<T> = rows.iter().step_by(step).cloned().collect();
    if (n - 1) % step != 0
        && let Some(last) = rows.last()
    {
        kept.push(last.clone());
    }
    kept
}

fn balance_chart(start: NaiveDate, regular: &Schedule, extra: Option<&Schedule>) -> ChartData {
    match extra {
        None => ChartData {
            rows: thin(
                regular
                    .rows
                    .iter()
                    .map(|row| RowData {
                        x: month_label(start, row.month),
                        y0: row.balance,
                        y1: None,
                        y2: None,
                    })
                    .collect(),
            ),
            labels: DataLabels {
                x: "Month".into(),
                y0: "Remaining Balance".into(),
                y1: None,
                y2: None,
            },
        },
        Some(extra) => {
            let months = regular.rows.len().max(extra.rows.len()) as u32;
            let balance_at = |schedule: &Schedule, month: u32| {
                schedule
                    .rows
                    .iter()
                    .find(|r| r.month == month)
                    .map_or(0.0, |r| r.balance)
            };
            ChartData {
                rows: thin(
                    (1..=months)
                        .map(|month| RowData {
                            x: month_label(start, month),
                            y0: balance_at(regular, month),
                            y1: Some(balance_at(extra, month)),
                            y2: None,
                        })
                        .collect(),
                ),
                labels: DataLabels {
                    x: "Month".into(),
                    y0: "Regular Schedule Balance".into(),
                    y1: Some("With Extra Payments".into()),
                    y2: None,
                },
            }
        }
    }
}

fn cost_chart(regular: &Schedule, extra: Option<&Schedule>) -> ChartData {
    let (summary, principal_label, interest_label) = match extra {
        Some(extra) => (
            &extra.summary,
            "Principal with Extra Payments",
            "Interest with Extra Payments",
        ),
        None => (&regular.summary, "Principal Paid", "Interest Paid"),
    };
    let bar = |label: &str, value: f64| RowData {
        x: serde_json::Value::String(label.into()),
        y0: value,
        y1: None,
        y2: None,
    };
    ChartData {
        rows: vec![
            bar(principal_label, summary.total_principal_paid),
            bar(interest_label, summary.total_interest_paid),
        ],
        labels: DataLabels {
            x: "Payment Type".into(),
            y0: "Amount ($)".into(),
            y1: None,
            y2: None,
        },
    }
}

fn visual_artifact(
    call_id: &str,
    visual: VisualKind,
    start: NaiveDate,
    regular: &Schedule,
    extra: Option<&Schedule>,
) -> Artifact {
    let with_extra = extra.is_some();
    match visual {
        VisualKind::AmortizationPlot => Artifact::chart(
            call_id,
            ArtifactKind::LineChart,
            "Loan Payoff Timeline",
            if with_extra {
                "See how your balance decreases with extra payments"
            } else {
                "See how your balance decreases with each payment"
            },
            &balance_chart(start, regular, extra),
        ),
        VisualKind::SummaryChart => Artifact::chart(
            call_id,
            ArtifactKind::BarChart,
            "Total Loan Costs",
            if with_extra {
                "Compare principal vs. interest with extra payments"
            } else {
                "Compare what you pay in principal vs. interest"
            },
            &cost_chart(regular, extra),
        ),
    }
}

// ── generate_amortization ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AmortizationArgs {
    loan_balance: f64,
    annual_interest_rate: f64,
    loan_term_months: u32,
    monthly_payment: f64,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    monthly_extra_payment: Option<f64>,
    #[serde(default)]
    show_tool_visual: Option<VisualKind>,
}

pub struct GenerateAmortizationTool;

impl GenerateAmortizationTool {
    const NAME: &'static str = "generate_amortization";

    fn terms(args: &AmortizationArgs) -> Result<LoanTerms, String> {
        let start_date = match &args.start_date {
            Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map_err(|_| "Start date must be in YYYY-MM-DD format".to_string())?,
            None => Local::now().date_naive(),
        };
        let terms = LoanTerms {
            balance: args.loan_balance,
            annual_rate: args.annual_interest_rate,
            term_months: args.loan_term_months,
            monthly_payment: args.monthly_payment,
            start_date,
        };
        terms.validate()?;
        Ok(terms)
    }
}

#[async_trait]
impl Tool for GenerateAmortizationTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Generate a month-by-month amortization schedule and summary statistics for a level \
         payment loan. Optionally compares against paying an extra amount each month and shows \
         a balance-over-time line chart (AMORTIZATION_PLOT) or a principal vs. interest bar chart \
         (SUMMARY_CHART)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "loan_balance": {
                    "type": "number",
                    "description": "Starting loan balance, must be positive"
                },
                "annual_interest_rate": {
                    "type": "number",
                    "description": "Annual interest rate as a percent, e.g. 5.25 for 5.25%"
                },
                "loan_term_months": {
                    "type": "integer",
                    "description": "Number of monthly payments, must be positive"
                },
                "monthly_payment": {
                    "type": "number",
                    "description": "Scheduled monthly payment, must be positive"
                },
                "start_date": {
                    "type": "string",
                    "description": "First payment date in YYYY-MM-DD format (default today)"
                },
                "monthly_extra_payment": {
                    "type": "number",
                    "description": "Extra amount paid on top of the monthly payment, must be positive"
                },
                "show_tool_visual": {
                    "type": "string",
                    "enum": ["AMORTIZATION_PLOT", "SUMMARY_CHART"],
                    "description": "Visual to show the user"
                }
            },
            "required": ["loan_balance", "annual_interest_rate", "loan_term_months", "monthly_payment"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let args: AmortizationArgs = parse_args(arguments)?;
        if args.monthly_extra_payment.is_some_and(|extra| extra <= 0.0) {
            return Err(failed(Self::NAME, "Monthly extra payment must be positive if provided"));
        }

        let terms = Self::terms(&args).map_err(|reason| {
            warn!(tool = Self::NAME, reason = %reason, "Rejected amortization inputs");
            failed(Self::NAME, reason)
        })?;
        let regular = amortize(&terms);
        let extra = args.monthly_extra_payment.map(|extra| {
            amortize(&LoanTerms {
                monthly_payment: terms.monthly_payment + extra,
                ..terms.clone()
            })
        });

        let mut data = serde_json::to_value(&regular.summary)
            .map_err(|e| failed(Self::NAME, e.to_string()))?;
        if let Some(extra) = &extra {
            data["extra_payment_summary"] = serde_json::to_value(&extra.summary)
                .map_err(|e| failed(Self::NAME, e.to_string()))?;
            data["savings_with_extra_payment"] = serde_json::to_value(savings(&regular.summary, &extra.summary))
                .map_err(|e| failed(Self::NAME, e.to_string()))?;
        }

        match args.show_tool_visual {
            Some(visual) if !regular.rows.is_empty() => {
                let artifact = visual_artifact(ctx.call_id, visual, terms.start_date, &regular, extra.as_ref());
                let content = tool_message_content(
                    ctx.call_id,
                    true,
                    &artifact.name,
                    &artifact.description,
                    Some(data),
                );
                Ok(render_artifact(ctx, Self::NAME, artifact, content).await)
            }
            _ => Ok(ToolOutput::Text(tool_message_content(
                ctx.call_id,
                false,
                "Amortization Schedule",
                "Summary of the amortization schedule",
                Some(data),
            ))),
        }
    }
}

// ── solve_loan_parameter ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SolveArgs {
    loan_amount: f64,
    #[serde(default)]
    annual_rate: Option<f64>,
    #[serde(default)]
    term_months: Option<u32>,
    #[serde(default)]
    monthly_payment: Option<f64>,
}

/// The solved field and the complete parameter set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub solved_field: &'static str,
    pub value: f64,
    pub all_params: SolvedParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolvedParams {
    pub loan_amount: f64,
    pub annual_rate: f64,
    pub term_months: u32,
    pub monthly_payment: f64,
}

/// Solve whichever of rate, term or payment is missing.
pub fn solve(
    loan_amount: f64,
    annual_rate: Option<f64>,
    term_months: Option<u32>,
    monthly_payment: Option<f64>,
) -> Result<Solution, String> {
    if loan_amount <= 0.0 {
        return Err("Loan amount must be positive".into());
    }
    if annual_rate.is_some_and(|r| r < 0.0) {
        return Err("Annual rate cannot be negative".into());
    }
    if term_months == Some(0) {
        return Err("Term months must be positive".into());
    }
    if monthly_payment.is_some_and(|p| p <= 0.0) {
        return Err("Monthly payment must be positive".into());
    }

    match (annual_rate, term_months, monthly_payment) {
        (None, Some(term), Some(payment)) => {
            let rate = solve_rate(loan_amount, term, payment)?;
            Ok(Solution {
                solved_field: "annual_rate",
                value: rate,
                all_params: SolvedParams {
                    loan_amount,
                    annual_rate: rate,
                    term_months: term,
                    monthly_payment: payment,
                },
            })
        }
        (Some(rate), None, Some(payment)) => {
            let term = solve_term(loan_amount, rate, payment)?;
            Ok(Solution {
                solved_field: "term_months",
                value: f64::from(term),
                all_params: SolvedParams {
                    loan_amount,
                    annual_rate: rate,
                    term_months: term,
                    monthly_payment: payment,
                },
            })
        }
        (Some(rate), Some(term), None) => {
            let payment = level_payment(loan_amount, rate, term);
            Ok(Solution {
                solved_field: "monthly_payment",
                value: payment,
                all_params: SolvedParams {
                    loan_amount,
                    annual_rate: rate,
                    term_months: term,
                    monthly_payment: payment,
                },
            })
        }
        _ => Err("Exactly one of annual_rate, term_months, or monthly_payment must be omitted".into()),
    }
}

pub struct SolveLoanParameterTool;

impl SolveLoanParameterTool {
    const NAME: &'static str = "solve_loan_parameter";
}

#[async_trait]
impl Tool for SolveLoanParameterTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Solve for exactly one missing level-payment loan parameter (annual rate, term in months, \
         or monthly payment) given the loan amount and the other two. Omit the field to solve for."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "loan_amount": {
                    "type": "number",
                    "description": "Remaining loan principal, must be positive"
                },
                "annual_rate": {
                    "type": "number",
                    "description": "Annual interest rate as a percent, e.g. 7.25. Omit to solve for it"
                },
                "term_months": {
                    "type": "integer",
                    "description": "Number of monthly payments remaining. Omit to solve for it"
                },
                "monthly_payment": {
                    "type": "number",
                    "description": "Scheduled monthly payment. Omit to solve for it"
                }
            },
            "required": ["loan_amount"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let args: SolveArgs = parse_args(arguments)?;
        let solution = solve(args.loan_amount, args.annual_rate, args.term_months, args.monthly_payment)
            .map_err(|reason| {
                warn!(tool = Self::NAME, reason = %reason, "Could not solve loan parameter");
                failed(Self::NAME, reason)
            })?;
        let data = serde_json::to_value(&solution).map_err(|e| failed(Self::NAME, e.to_string()))?;

        Ok(ToolOutput::Text(tool_message_content(
            ctx.call_id,
            false,
            "Loan Parameter Solution",
            "Calculated missing loan parameter",
            Some(data),
        )))
    }
}
