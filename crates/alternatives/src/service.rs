use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

use arrears_core::{DomainError, DomainResult, Money};
use arrears_invoicing::{Invoice, PaymentMethod};

use crate::option::{
    AlternativeOptionType, AlternativePaymentOption, OptionId, OptionStatus, OptionTerms,
};
use crate::profile::CustomerPaymentProfile;

const INSTALLMENT_MONTHS: [u32; 4] = [3, 6, 9, 12];
/// (discount percent, pay within days)
const SETTLEMENT_TIERS: [(i64, u32); 3] = [(5, 7), (8, 14), (12, 30)];
const MAX_SETTLEMENT_PERCENT: i64 = 15;
const SETTLEMENT_APPROVAL_PERCENT: i64 = 10;
const EARLY_PAYMENT_PERCENT: i64 = 2;
const EARLY_PAYMENT_DAYS: u32 = 3;
const HARDSHIP_CAP_PERCENT: i64 = 25;
const HARDSHIP_MONTHS: u32 = 6;
const MIN_MONTHLY_PAYMENT: i64 = 100;
const SETUP_FEE: i64 = 25;
const PLAN_VALIDITY_DAYS: i64 = 30;
const MAX_OPTIONS: usize = 10;

/// An option together with its expected outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOption {
    pub option: AlternativePaymentOption,
    pub success_rate: f64,
    pub expected_collection: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub recommended: ScoredOption,
    /// Runners-up, best first (at most three).
    pub alternatives: Vec<ScoredOption>,
}

/// Builds and ranks alternative payment offers for one invoice.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlternativePaymentService;

impl AlternativePaymentService {
    pub fn new() -> Self {
        Self
    }

    /// All applicable offers for the invoice's open balance, ranked by
    /// effectiveness (best first, at most ten).
    pub fn generate(
        &self,
        invoice: &Invoice,
        profile: &CustomerPaymentProfile,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<AlternativePaymentOption>> {
        let mut options = self.candidates(invoice, profile, now)?;
        options.truncate(MAX_OPTIONS);
        Ok(options)
    }

    /// Every applicable offer, ranked by effectiveness, without the cap.
    fn candidates(
        &self,
        invoice: &Invoice,
        profile: &CustomerPaymentProfile,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<AlternativePaymentOption>> {
        if profile.customer_id != invoice.customer_id() {
            return Err(DomainError::validation(
                "payment profile belongs to a different customer",
            ));
        }
        let balance = invoice.current_balance();
        if !balance.is_positive() {
            return Err(DomainError::business_rule(format!(
                "invoice {} has no open balance",
                invoice.invoice_number()
            )));
        }

        let builder = OptionBuilder {
            invoice,
            balance,
            now,
        };
        let mut options = Vec::new();
        options.extend(builder.installment_plans(profile.risk_score)?);
        options.extend(builder.settlement_discounts(profile.risk_score)?);
        options.push(builder.early_payment_incentive()?);
        if profile.prefers_online_payment {
            options.extend(builder.method_alternatives(&profile.preferred_payment_methods));
        }
        if let Some(hardship) = profile.active_hardship() {
            options.push(builder.hardship_plan(hardship.severity)?);
        }

        for option in &mut options {
            option.effectiveness_score = self.effectiveness(option, profile);
        }
        options.sort_by(|a, b| b.effectiveness_score.total_cmp(&a.effectiveness_score));
        Ok(options)
    }

    /// How well an offer fits the customer, in `[0, 1]`.
    pub fn effectiveness(
        &self,
        option: &AlternativePaymentOption,
        profile: &CustomerPaymentProfile,
    ) -> f64 {
        let mut score: f64 = 0.5;
        match profile.preference_rank(option.option_type) {
            Some(0) => score += 0.3,
            Some(_) => score += 0.2,
            None => {}
        }
        if let Some(ratio) = affordability_ratio(option, profile) {
            score += if ratio <= 0.5 {
                0.2
            } else if ratio <= 0.8 {
                0.0
            } else if ratio <= 1.0 {
                -0.2
            } else {
                -0.3
            };
        }
        score.clamp(0.0, 1.0)
    }

    /// Probability that the customer takes the offer and pays it off.
    pub fn success_rate(
        &self,
        option: &AlternativePaymentOption,
        profile: &CustomerPaymentProfile,
    ) -> f64 {
        let mut rate = option.option_type.base_success_rate() * (1.0 - 0.5 * profile.risk_score);
        if affordability_ratio(option, profile).is_some_and(|r| r > 1.0) {
            rate *= 0.5;
        }
        rate.clamp(0.0, 1.0)
    }

    /// The offer with the highest expected collection over every candidate
    /// (not just the ten `generate` returns), plus the next three.
    pub fn recommend_optimal_strategy(
        &self,
        invoice: &Invoice,
        profile: &CustomerPaymentProfile,
        now: DateTime<Utc>,
    ) -> DomainResult<StrategyRecommendation> {
        let mut scored = self
            .candidates(invoice, profile, now)?
            .into_iter()
            .map(|option| -> DomainResult<ScoredOption> {
                let success_rate = self.success_rate(&option, profile);
                let expected_collection = option
                    .total_amount
                    .multiply(to_decimal(success_rate))?;
                Ok(ScoredOption {
                    option,
                    success_rate,
                    expected_collection,
                })
            })
            .collect::<DomainResult<Vec<ScoredOption>>>()?;

        scored.sort_by(|a, b| {
            b.expected_collection
                .amount()
                .cmp(&a.expected_collection.amount())
        });
        let mut ranked = scored.into_iter();
        let recommended = ranked.next().ok_or_else(|| {
            DomainError::business_rule("no alternative payment option applies to this invoice")
        })?;
        Ok(StrategyRecommendation {
            recommended,
            alternatives: ranked.take(3).collect(),
        })
    }
}

fn affordability_ratio(
    option: &AlternativePaymentOption,
    profile: &CustomerPaymentProfile,
) -> Option<f64> {
    let capacity = profile.monthly_payment_capacity?;
    if !capacity.is_positive() {
        return None;
    }
    Some(option.payment_amount.to_f64() / capacity.to_f64())
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(6)
}

fn percent(p: i64) -> Decimal {
    Decimal::new(p, 2)
}

struct OptionBuilder<'a> {
    invoice: &'a Invoice,
    balance: Money,
    now: DateTime<Utc>,
}

impl OptionBuilder<'_> {
    fn option(
        &self,
        option_type: AlternativeOptionType,
        payment_amount: Money,
        total_amount: Money,
        discount_amount: Money,
        terms: OptionTerms,
        approval_required: bool,
        valid_for_days: i64,
    ) -> AlternativePaymentOption {
        AlternativePaymentOption {
            id: OptionId::new(),
            invoice_id: self.invoice.invoice_id(),
            option_type,
            payment_amount,
            total_amount,
            discount_amount,
            terms,
            approval_required,
            status: OptionStatus::Pending,
            effectiveness_score: 0.0,
            offered_at: self.now,
            valid_until: self.now + Duration::days(valid_for_days),
            responded_at: None,
        }
    }

    fn zero(&self) -> Money {
        Money::zero(self.balance.currency())
    }

    fn installment_plans(&self, risk: f64) -> DomainResult<Vec<AlternativePaymentOption>> {
        let minimum = Money::new(Decimal::from(MIN_MONTHLY_PAYMENT), self.balance.currency())?;
        let risk_factor = Decimal::ONE + to_decimal(risk);
        let mut plans = Vec::new();

        for months in INSTALLMENT_MONTHS {
            let rate = Decimal::new(5, 3) * Decimal::from(months) * risk_factor;
            let interest = self.balance.multiply(rate)?;
            let setup_fee = if months > 6 {
                Money::new(Decimal::from(SETUP_FEE), self.balance.currency())?
            } else {
                self.zero()
            };
            let total = self.balance.checked_add(&interest)?.checked_add(&setup_fee)?;
            let monthly = total.divide(months)?;
            if monthly.compare(&minimum)?.is_lt() {
                continue;
            }
            plans.push(self.option(
                AlternativeOptionType::InstallmentPlan,
                monthly,
                total,
                self.zero(),
                OptionTerms {
                    description: format!("{months} monthly payments of {monthly}"),
                    installments: Some(months),
                    interest_amount: Some(interest),
                    setup_fee: setup_fee.is_positive().then_some(setup_fee),
                    ..OptionTerms::default()
                },
                months > 6,
                PLAN_VALIDITY_DAYS,
            ));
        }
        Ok(plans)
    }

    fn settlement_discounts(&self, risk: f64) -> DomainResult<Vec<AlternativePaymentOption>> {
        let scale = Decimal::ONE + Decimal::new(5, 1) * to_decimal(risk);
        SETTLEMENT_TIERS
            .iter()
            .map(|&(base, days)| -> DomainResult<AlternativePaymentOption> {
                let rate = (percent(base) * scale)
                    .min(percent(MAX_SETTLEMENT_PERCENT))
                    .round_dp(4);
                let discount = self.balance.multiply(rate)?;
                let total = self.balance.checked_sub(&discount)?;
                Ok(self.option(
                    AlternativeOptionType::SettlementDiscount,
                    total,
                    total,
                    discount,
                    OptionTerms {
                        description: format!(
                            "pay {total} within {days} days ({}% off)",
                            (rate * Decimal::ONE_HUNDRED).normalize()
                        ),
                        discount_rate: Some(rate),
                        pay_within_days: Some(days),
                        ..OptionTerms::default()
                    },
                    rate > percent(SETTLEMENT_APPROVAL_PERCENT),
                    i64::from(days),
                ))
            })
            .collect()
    }

    fn early_payment_incentive(&self) -> DomainResult<AlternativePaymentOption> {
        let rate = percent(EARLY_PAYMENT_PERCENT);
        let discount = self.balance.multiply(rate)?;
        let total = self.balance.checked_sub(&discount)?;
        Ok(self.option(
            AlternativeOptionType::EarlyPaymentIncentive,
            total,
            total,
            discount,
            OptionTerms {
                description: format!("pay {total} within {EARLY_PAYMENT_DAYS} days"),
                discount_rate: Some(rate),
                pay_within_days: Some(EARLY_PAYMENT_DAYS),
                ..OptionTerms::default()
            },
            false,
            i64::from(EARLY_PAYMENT_DAYS),
        ))
    }

    fn method_alternatives(&self, preferred: &[PaymentMethod]) -> Vec<AlternativePaymentOption> {
        let methods: &[PaymentMethod] = if preferred.is_empty() {
            &[PaymentMethod::Card, PaymentMethod::BankTransfer]
        } else {
            preferred
        };
        methods
            .iter()
            .map(|method| {
                self.option(
                    AlternativeOptionType::PaymentMethodAlternative,
                    self.balance,
                    self.balance,
                    self.zero(),
                    OptionTerms {
                        description: format!("pay {} by {method:?}", self.balance),
                        payment_method: Some(*method),
                        ..OptionTerms::default()
                    },
                    false,
                    PLAN_VALIDITY_DAYS,
                )
            })
            .collect()
    }

    fn hardship_plan(&self, severity: f64) -> DomainResult<AlternativePaymentOption> {
        let rate = to_decimal(severity)
            .min(percent(HARDSHIP_CAP_PERCENT))
            .max(Decimal::ZERO);
        let discount = self.balance.multiply(rate)?;
        let total = self.balance.checked_sub(&discount)?;
        let monthly = total.divide(HARDSHIP_MONTHS)?;
        Ok(self.option(
            AlternativeOptionType::HardshipPlan,
            monthly,
            total,
            discount,
            OptionTerms {
                description: format!(
                    "hardship plan: {HARDSHIP_MONTHS} interest-free payments of {monthly}"
                ),
                installments: Some(HARDSHIP_MONTHS),
                interest_amount: Some(self.zero()),
                discount_rate: Some(rate),
                ..OptionTerms::default()
            },
            true,
            PLAN_VALIDITY_DAYS,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrears_core::Currency;
    use arrears_customers::CustomerId;
    use arrears_invoicing::{InvoiceId, NewInvoice};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap()
    }

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::usd()).unwrap()
    }

    fn test_invoice(customer: CustomerId, amount: Decimal) -> Invoice {
        Invoice::issue(NewInvoice {
            id: InvoiceId::new(),
            customer_id: customer,
            invoice_number: "INV-900".to_string(),
            amount: usd(amount),
            issue_date: test_time() - Duration::days(60),
            due_date: test_time() - Duration::days(30),
            lines: vec![],
        })
        .unwrap()
    }

    fn of_type(
        options: &[AlternativePaymentOption],
        option_type: AlternativeOptionType,
    ) -> Vec<&AlternativePaymentOption> {
        options.iter().filter(|o| o.option_type == option_type).collect()
    }

    #[test]
    fn hardship_discount_is_capped_at_25_percent() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(2400));
        let profile = CustomerPaymentProfile::new(customer, 0.4)
            .unwrap()
            .with_hardship(0.30, vec!["job loss".to_string()])
            .unwrap();

        let options = AlternativePaymentService::new()
            .generate(&invoice, &profile, test_time())
            .unwrap();
        let hardship = of_type(&options, AlternativeOptionType::HardshipPlan);
        assert_eq!(hardship.len(), 1);
        let plan = hardship[0];
        assert_eq!(plan.terms.discount_rate, Some(dec!(0.25)));
        assert_eq!(plan.discount_amount, usd(dec!(600)));
        assert_eq!(plan.total_amount, usd(dec!(1800)));
        assert_eq!(plan.payment_amount, usd(dec!(300)));
        assert!(plan.approval_required);
    }

    #[test]
    fn hardship_without_indicators_is_ignored() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(2400));
        let profile = CustomerPaymentProfile::new(customer, 0.4)
            .unwrap()
            .with_hardship(0.2, vec![])
            .unwrap();
        let options = AlternativePaymentService::new()
            .generate(&invoice, &profile, test_time())
            .unwrap();
        assert!(of_type(&options, AlternativeOptionType::HardshipPlan).is_empty());
    }

    #[test]
    fn installment_plans_follow_pricing_rules() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(1200));
        let profile = CustomerPaymentProfile::new(customer, 0.0).unwrap();
        let options = AlternativePaymentService::new()
            .generate(&invoice, &profile, test_time())
            .unwrap();
        let plans = of_type(&options, AlternativeOptionType::InstallmentPlan);

        // 12 months: 1200 + 72 interest + 25 fee = 1297 / 12 = 108.08
        // 9 months: 1200 + 54 + 25 = 1279 / 9 = 142.11
        assert_eq!(plans.len(), 4);
        let twelve = plans
            .iter()
            .find(|p| p.terms.installments == Some(12))
            .unwrap();
        assert_eq!(twelve.terms.interest_amount, Some(usd(dec!(72))));
        assert_eq!(twelve.terms.setup_fee, Some(usd(dec!(25))));
        assert_eq!(twelve.total_amount, usd(dec!(1297)));
        assert_eq!(twelve.payment_amount, usd(dec!(108.08)));
        assert!(twelve.approval_required);

        let three = plans
            .iter()
            .find(|p| p.terms.installments == Some(3))
            .unwrap();
        assert_eq!(three.terms.setup_fee, None);
        assert!(!three.approval_required);
    }

    #[test]
    fn small_balances_skip_plans_under_minimum_payment() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(500));
        let profile = CustomerPaymentProfile::new(customer, 0.0).unwrap();
        let options = AlternativePaymentService::new()
            .generate(&invoice, &profile, test_time())
            .unwrap();
        let plans = of_type(&options, AlternativeOptionType::InstallmentPlan);
        // Only the 3-month plan clears 100 per month.
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].terms.installments, Some(3));
    }

    #[test]
    fn settlement_discounts_scale_with_risk_and_cap() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(1000));
        let profile = CustomerPaymentProfile::new(customer, 1.0).unwrap();
        let options = AlternativePaymentService::new()
            .generate(&invoice, &profile, test_time())
            .unwrap();
        let mut rates: Vec<Decimal> = of_type(&options, AlternativeOptionType::SettlementDiscount)
            .iter()
            .filter_map(|o| o.terms.discount_rate)
            .collect();
        rates.sort();
        assert_eq!(rates, vec![dec!(0.075), dec!(0.12), dec!(0.15)]);

        let capped = of_type(&options, AlternativeOptionType::SettlementDiscount)
            .into_iter()
            .find(|o| o.terms.discount_rate == Some(dec!(0.15)))
            .unwrap();
        assert!(capped.approval_required);
        assert_eq!(capped.total_amount, usd(dec!(850)));
    }

    #[test]
    fn online_payers_get_method_alternatives() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(1000));
        let profile = CustomerPaymentProfile::new(customer, 0.2)
            .unwrap()
            .with_online_payment(vec![]);
        let options = AlternativePaymentService::new()
            .generate(&invoice, &profile, test_time())
            .unwrap();
        let methods: Vec<_> = of_type(&options, AlternativeOptionType::PaymentMethodAlternative)
            .iter()
            .filter_map(|o| o.terms.payment_method)
            .collect();
        assert_eq!(methods.len(), 2);
        assert!(methods.contains(&PaymentMethod::Card));
        assert!(methods.contains(&PaymentMethod::BankTransfer));
    }

    #[test]
    fn effectiveness_rewards_preference_and_affordability() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(1200));
        let profile = CustomerPaymentProfile::new(customer, 0.0)
            .unwrap()
            .with_capacity(usd(dec!(1000)))
            .with_preferences(vec![
                AlternativeOptionType::InstallmentPlan,
                AlternativeOptionType::SettlementDiscount,
            ]);
        let service = AlternativePaymentService::new();
        let options = service.generate(&invoice, &profile, test_time()).unwrap();

        // First preference and affordable (< 50% of capacity): 0.5 + 0.3 + 0.2.
        let plan = of_type(&options, AlternativeOptionType::InstallmentPlan)[0];
        assert!((plan.effectiveness_score - 1.0).abs() < 1e-9);
        // Second preference but unaffordable lump sum: 0.5 + 0.2 - 0.3.
        let settlement = of_type(&options, AlternativeOptionType::SettlementDiscount)[0];
        assert!((settlement.effectiveness_score - 0.4).abs() < 1e-9);
        // Ranked best first.
        assert!(options
            .windows(2)
            .all(|w| w[0].effectiveness_score >= w[1].effectiveness_score));
        assert!(options.len() <= 10);
    }

    #[test]
    fn recommendation_maximises_expected_collection() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(3000));
        let profile = CustomerPaymentProfile::new(customer, 0.2).unwrap();
        let service = AlternativePaymentService::new();

        let strategy = service
            .recommend_optimal_strategy(&invoice, &profile, test_time())
            .unwrap();
        assert_eq!(strategy.alternatives.len(), 3);
        for alt in &strategy.alternatives {
            assert!(strategy.recommended.expected_collection.amount() >= alt.expected_collection.amount());
        }
        // Installments carry the highest base rate among the offers here and
        // the largest totals.
        assert_eq!(
            strategy.recommended.option.option_type,
            AlternativeOptionType::InstallmentPlan
        );
    }

    #[test]
    fn recommendation_considers_offers_beyond_the_top_ten() {
        let customer = CustomerId::new();
        let invoice = test_invoice(customer, dec!(3000));
        let profile = CustomerPaymentProfile::new(customer, 0.0)
            .unwrap()
            .with_capacity(usd(dec!(1000000)))
            .with_preferences(vec![
                AlternativeOptionType::PaymentMethodAlternative,
                AlternativeOptionType::SettlementDiscount,
                AlternativeOptionType::EarlyPaymentIncentive,
                AlternativeOptionType::HardshipPlan,
            ])
            .with_online_payment(vec![])
            .with_hardship(0.01, vec!["medical bills".to_string()])
            .unwrap();
        let service = AlternativePaymentService::new();

        // 4 plans + 3 settlements + early payment + 2 methods + hardship = 11;
        // the unpreferred 12-month plan ranks last and falls off the list.
        let options = service.generate(&invoice, &profile, test_time()).unwrap();
        assert_eq!(options.len(), 10);
        assert!(!options.iter().any(|o| o.terms.installments == Some(12)
            && o.option_type == AlternativeOptionType::InstallmentPlan));

        // 3000 + 180 interest + 25 fee = 3205 at a 0.75 success rate.
        let strategy = service
            .recommend_optimal_strategy(&invoice, &profile, test_time())
            .unwrap();
        assert_eq!(
            strategy.recommended.option.option_type,
            AlternativeOptionType::InstallmentPlan
        );
        assert_eq!(strategy.recommended.option.terms.installments, Some(12));
        assert_eq!(strategy.recommended.expected_collection.amount(), dec!(2403.75));
    }

    #[test]
    fn profile_of_other_customer_is_rejected() {
        let invoice = test_invoice(CustomerId::new(), dec!(1000));
        let profile = CustomerPaymentProfile::new(CustomerId::new(), 0.2).unwrap();
        assert!(matches!(
            AlternativePaymentService::new().generate(&invoice, &profile, test_time()),
            Err(DomainError::Validation(_))
        ));
    }
}
