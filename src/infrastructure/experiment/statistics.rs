//! Statistical analysis for experiment results
//!
//! Provides two-proportion significance testing, confidence intervals,
//! and the sample-size planning formula used when experiments start.

use crate::domain::experiment::{
    ConfidenceInterval, MultipleTestingCorrection, PairwiseComparison, StatisticalAnalysis,
    StatisticalConfig, VariantResult,
};

/// z width of the reported 95% confidence interval
const WALD_Z: f64 = 1.96;

/// Baseline conversion rate assumed when the config does not supply one.
/// 0.5 maximizes variance, so the planned sample size is never optimistic.
pub const DEFAULT_BASELINE_RATE: f64 = 0.5;

const P_VALUE_FLOOR: f64 = 0.001;
const P_VALUE_CEILING: f64 = 0.999;

/// Relative lift of a variant over the control
///
/// Returns 0 when the control rate is 0, so a dead control arm never
/// produces an infinite lift.
pub fn lift(control_rate: f64, variant_rate: f64) -> f64 {
    if control_rate == 0.0 {
        0.0
    } else {
        (variant_rate - control_rate) / control_rate
    }
}

/// Two-sided p-value for the difference between two conversion rates
///
/// Uses the pooled two-proportion z-test. The result is clamped to
/// `[0.001, 0.999]` except for the degenerate case of an empty arm,
/// which yields exactly 1.0.
pub fn two_proportion_p_value(
    control_conversions: u64,
    control_participants: u64,
    treatment_conversions: u64,
    treatment_participants: u64,
) -> f64 {
    if control_participants == 0 || treatment_participants == 0 {
        return 1.0;
    }

    let n1 = control_participants as f64;
    let n2 = treatment_participants as f64;
    let rate1 = control_conversions as f64 / n1;
    let rate2 = treatment_conversions as f64 / n2;

    let pooled = (control_conversions + treatment_conversions) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    // Pooled rate of 0 or 1 means both arms sit at the same extreme
    if se == 0.0 {
        return P_VALUE_CEILING;
    }

    let z = (rate2 - rate1) / se;
    let p = 2.0 * (1.0 - normal_cdf(z.abs()));

    p.clamp(P_VALUE_FLOOR, P_VALUE_CEILING)
}

/// Wald 95% confidence interval on the rate difference, pooled standard error
pub fn wald_interval(
    control_conversions: u64,
    control_participants: u64,
    treatment_conversions: u64,
    treatment_participants: u64,
) -> ConfidenceInterval {
    if control_participants == 0 || treatment_participants == 0 {
        return ConfidenceInterval::new(0.0, 0.0);
    }

    let n1 = control_participants as f64;
    let n2 = treatment_participants as f64;
    let diff = treatment_conversions as f64 / n2 - control_conversions as f64 / n1;

    let pooled = (control_conversions + treatment_conversions) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    ConfidenceInterval::new(diff - WALD_Z * se, diff + WALD_Z * se)
}

/// Post-hoc power of a comparison at the current sample size
///
/// Probability of detecting the observed rate difference, were it the
/// true effect, at the given significance level.
pub fn observed_power(
    control_conversions: u64,
    control_participants: u64,
    treatment_conversions: u64,
    treatment_participants: u64,
    significance_level: f64,
) -> f64 {
    if control_participants == 0 || treatment_participants == 0 {
        return 0.0;
    }

    let n1 = control_participants as f64;
    let n2 = treatment_participants as f64;
    let diff = treatment_conversions as f64 / n2 - control_conversions as f64 / n1;

    let pooled = (control_conversions + treatment_conversions) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    if se == 0.0 {
        return 0.0;
    }

    let z_alpha = normal_quantile(1.0 - significance_level / 2.0);
    normal_cdf(diff.abs() / se - z_alpha)
}

/// Per-arm sample size required to power the experiment
///
/// `n = ceil((z_a/2 + z_b)^2 * 2 * p * (1 - p) / MDE^2)`, scaled up by
/// 20% per declared cultural segment and, beyond two arms, by 15% per
/// additional variant.
pub fn required_sample_size(
    config: &StatisticalConfig,
    num_segments: usize,
    num_variants: usize,
) -> u64 {
    let baseline = config
        .baseline_conversion_rate()
        .unwrap_or(DEFAULT_BASELINE_RATE);
    let mde = config.minimum_detectable_effect();

    let z_alpha = normal_quantile(1.0 - config.significance_level() / 2.0);
    let z_beta = normal_quantile(config.power());

    let base =
        ((z_alpha + z_beta).powi(2) * 2.0 * baseline * (1.0 - baseline) / (mde * mde)).ceil();

    let mut n = base * (1.0 + 0.2 * num_segments as f64);

    if num_variants > 2 {
        n *= 1.0 + 0.15 * (num_variants as f64 - 2.0);
    }

    n.ceil() as u64
}

/// Compare a treatment arm against the control arm
pub fn compare_proportions(
    control: &VariantResult,
    treatment: &VariantResult,
    effective_significance_level: f64,
) -> PairwiseComparison {
    let p_value = two_proportion_p_value(
        control.conversions,
        control.participants,
        treatment.conversions,
        treatment.participants,
    );

    PairwiseComparison {
        control_variant_id: control.variant_id.clone(),
        treatment_variant_id: treatment.variant_id.clone(),
        control_rate: control.conversion_rate,
        treatment_rate: treatment.conversion_rate,
        lift: lift(control.conversion_rate, treatment.conversion_rate),
        p_value,
        confidence_interval: wald_interval(
            control.conversions,
            control.participants,
            treatment.conversions,
            treatment.participants,
        ),
        observed_power: observed_power(
            control.conversions,
            control.participants,
            treatment.conversions,
            treatment.participants,
            effective_significance_level,
        ),
        is_significant: p_value < effective_significance_level,
    }
}

/// Run the full pairwise analysis for an experiment
///
/// The first result is treated as the control arm. Every later arm is
/// compared against it, against a significance level that Bonferroni
/// divides by the number of comparisons when configured.
pub fn analyze(
    config: &StatisticalConfig,
    results: &[VariantResult],
    num_segments: usize,
) -> StatisticalAnalysis {
    let num_comparisons = results.len().saturating_sub(1).max(1);

    let effective_significance_level = match config.correction() {
        MultipleTestingCorrection::None => config.significance_level(),
        MultipleTestingCorrection::Bonferroni => {
            config.significance_level() / num_comparisons as f64
        }
    };

    let mut comparisons = Vec::new();

    if let Some((control, treatments)) = results.split_first() {
        for treatment in treatments {
            comparisons.push(compare_proportions(
                control,
                treatment,
                effective_significance_level,
            ));
        }
    }

    StatisticalAnalysis {
        significance_level: config.significance_level(),
        effective_significance_level,
        required_sample_size: required_sample_size(config, num_segments, results.len().max(2)),
        comparisons,
    }
}

/// Standard normal cumulative distribution function
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function approximation
///
/// Uses Horner's method for the polynomial approximation.
/// Accurate to about 1.5e-7.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

/// Standard normal quantile function (inverse CDF)
///
/// Acklam's rational approximation, accurate to about 1.15e-9 over
/// the open unit interval.
fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let a = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    let b = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    let c = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    let d = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    let p_low = 0.02425;
    let p_high = 1.0 - p_low;

    if p < p_low {
        let q = (-2.0 * p.ln()).sqrt();
        (((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    } else if p <= p_high {
        let q = p - 0.5;
        let r = q * q;
        (((((a[0] * r + a[1]) * r + a[2]) * r + a[3]) * r + a[4]) * r + a[5]) * q
            / (((((b[0] * r + b[1]) * r + b[2]) * r + b[3]) * r + b[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    }
}
