//! Experiment domain entities

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::validation::{validate_experiment_id, validate_variant_id, ValidationViolation};

// ============================================================================
// ExperimentId
// ============================================================================

/// Unique identifier for an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Create a new experiment ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationViolation> {
        let id = id.into();
        validate_experiment_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh experiment ID
    pub fn generate() -> Self {
        Self(format!("exp-{}", uuid::Uuid::new_v4()))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExperimentId {
    type Error = ValidationViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExperimentId> for String {
    fn from(id: ExperimentId) -> Self {
        id.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExperimentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// VariantId
// ============================================================================

/// Unique identifier for a variant within an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VariantId(String);

impl VariantId {
    /// Create a new variant ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationViolation> {
        let id = id.into();
        validate_variant_id(&id)?;
        Ok(Self(id))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VariantId {
    type Error = ValidationViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VariantId> for String {
    fn from(id: VariantId) -> Self {
        id.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VariantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ExperimentStatus
// ============================================================================

/// Status of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Experiment is being configured, not yet running
    #[default]
    Draft,
    /// Experiment is actively running and routing traffic
    Running,
    /// Experiment is temporarily paused
    Paused,
    /// Experiment has finished and holds final results
    Completed,
    /// Experiment was abandoned before completion
    Cancelled,
}

impl ExperimentStatus {
    /// Check if the experiment is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the experiment can accept new configuration changes
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Check if a transition to the target status is valid
    pub fn can_transition_to(&self, target: ExperimentStatus) -> bool {
        match (self, target) {
            // Draft -> Running (start)
            (Self::Draft, Self::Running) => true,
            // Running -> Paused (pause)
            (Self::Running, Self::Paused) => true,
            // Paused -> Running (resume)
            (Self::Paused, Self::Running) => true,
            // Running -> Completed (stop)
            (Self::Running, Self::Completed) => true,
            // Running | Paused -> Cancelled (cancel)
            (Self::Running, Self::Cancelled) => true,
            (Self::Paused, Self::Cancelled) => true,
            // All other transitions are invalid
            _ => false,
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ============================================================================
// ExperimentType
// ============================================================================

/// The experimental design of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    /// Classic two-or-more arm A/B test
    #[default]
    Ab,
    /// Several independent factors varied at once
    Multivariate,
    /// Adaptive allocation toward winning arms
    Bandit,
    /// Full factorial combination of factors
    Factorial,
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ab => write!(f, "ab"),
            Self::Multivariate => write!(f, "multivariate"),
            Self::Bandit => write!(f, "bandit"),
            Self::Factorial => write!(f, "factorial"),
        }
    }
}

// ============================================================================
// AudienceRule
// ============================================================================

/// Comparison operator for audience targeting rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    In,
    NotIn,
    Contains,
    GreaterThan,
    LessThan,
}

/// A single audience targeting rule evaluated against a participant attribute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudienceRule {
    field: String,
    operator: RuleOperator,
    value: Value,
}

impl AudienceRule {
    /// Create a new rule
    pub fn new(field: impl Into<String>, operator: RuleOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Get the attribute name this rule inspects
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Get the comparison operator
    pub fn operator(&self) -> RuleOperator {
        self.operator
    }

    /// Get the comparison value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Evaluate the rule against the participant's value for this field.
    ///
    /// A missing attribute never matches, whatever the operator.
    pub fn matches_value(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return false;
        };

        match self.operator {
            RuleOperator::Equals => values_equal(actual, &self.value),
            RuleOperator::In => self
                .value
                .as_array()
                .is_some_and(|candidates| candidates.iter().any(|c| values_equal(actual, c))),
            RuleOperator::NotIn => self
                .value
                .as_array()
                .is_some_and(|candidates| !candidates.iter().any(|c| values_equal(actual, c))),
            RuleOperator::Contains => match actual {
                Value::String(haystack) => self
                    .value
                    .as_str()
                    .is_some_and(|needle| haystack.contains(needle)),
                Value::Array(items) => items.iter().any(|item| values_equal(item, &self.value)),
                _ => false,
            },
            RuleOperator::GreaterThan => match (actual.as_f64(), self.value.as_f64()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            RuleOperator::LessThan => match (actual.as_f64(), self.value.as_f64()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
        }
    }
}

/// Value equality that treats numeric representations uniformly
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

// ============================================================================
// TrafficAllocation
// ============================================================================

/// Traffic allocation for a variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficAllocation {
    variant_id: VariantId,
    percentage: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<AudienceRule>,
}

impl TrafficAllocation {
    /// Create a new traffic allocation
    pub fn new(variant_id: VariantId, percentage: f64) -> Self {
        Self {
            variant_id,
            percentage: percentage.clamp(0.0, 100.0),
            conditions: Vec::new(),
        }
    }

    /// Attach a per-allocation condition
    pub fn with_condition(mut self, condition: AudienceRule) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Get the variant ID
    pub fn variant_id(&self) -> &VariantId {
        &self.variant_id
    }

    /// Get the traffic percentage
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    /// Get the per-allocation conditions
    pub fn conditions(&self) -> &[AudienceRule] {
        &self.conditions
    }
}

// ============================================================================
// Variant
// ============================================================================

/// One treatment arm of an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    id: VariantId,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    weight: f64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    payload: Value,
}

impl Variant {
    /// Create a new variant with weight 1.0 and an empty payload
    pub fn new(id: VariantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            weight: 1.0,
            payload: Value::Null,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the variant weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the free-form payload delivered to callers on assignment
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Get the variant ID
    pub fn id(&self) -> &VariantId {
        &self.id
    }

    /// Get the variant name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the variant weight
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Get the variant payload
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

// ============================================================================
// CulturalSegment
// ============================================================================

/// A cultural participant segment the experiment is stratified over
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CulturalSegment {
    id: String,
    name: String,
    expected_share: f64,
    #[serde(default)]
    other: bool,
}

impl CulturalSegment {
    /// Create a new segment with its expected population share in `[0, 1]`
    pub fn new(id: impl Into<String>, name: impl Into<String>, expected_share: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            expected_share,
            other: false,
        }
    }

    /// Mark this segment as the catch-all bucket
    pub fn with_other(mut self, other: bool) -> Self {
        self.other = other;
        self
    }

    /// Get the segment ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the segment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the expected population share
    pub fn expected_share(&self) -> f64 {
        self.expected_share
    }

    /// Check if this is the catch-all segment
    pub fn is_other(&self) -> bool {
        self.other
    }

    /// Check whether a participant's cultural attribute falls in this segment
    pub fn matches(&self, cultural: &str) -> bool {
        self.other || self.id == cultural
    }
}

// ============================================================================
// NeuroscienceObjective
// ============================================================================

/// A neuroscience outcome the experiment is validated against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeuroscienceObjective {
    id: String,
    name: String,
    metric_id: String,
    validation_method: String,
    expected_improvement: f64,
}

impl NeuroscienceObjective {
    /// Create a new objective
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric_id: impl Into<String>,
        validation_method: impl Into<String>,
        expected_improvement: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metric_id: metric_id.into(),
            validation_method: validation_method.into(),
            expected_improvement,
        }
    }

    /// Get the objective ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the objective name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the metric this objective is measured on
    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    /// Get the declared validation method
    pub fn validation_method(&self) -> &str {
        &self.validation_method
    }

    /// Get the expected relative improvement
    pub fn expected_improvement(&self) -> f64 {
        self.expected_improvement
    }
}

// ============================================================================
// AccessibilityConsideration
// ============================================================================

/// An accessibility need the experiment explicitly accounts for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessibilityConsideration {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl AccessibilityConsideration {
    /// Create a new consideration for a need kind such as `screen_reader`
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Get the need kind
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Get the description
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Check whether this consideration covers a declared need
    pub fn covers(&self, need: &str) -> bool {
        self.kind == need
    }
}

// ============================================================================
// Guardrail
// ============================================================================

/// Breach direction for a guardrail threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailDirection {
    /// Breached when the observed value rises above the threshold
    Above,
    /// Breached when the observed value falls below the threshold
    Below,
}

/// Action taken when a guardrail is breached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailAction {
    /// Emit an alert event only
    Alert,
    /// Pause the experiment
    Pause,
    /// Stop the experiment permanently
    Stop,
}

impl fmt::Display for GuardrailAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alert => write!(f, "alert"),
            Self::Pause => write!(f, "pause"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// A safety threshold on a metric that can alert, pause, or stop the experiment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guardrail {
    metric_id: String,
    threshold: f64,
    direction: GuardrailDirection,
    action: GuardrailAction,
}

impl Guardrail {
    /// Create a new guardrail
    pub fn new(
        metric_id: impl Into<String>,
        threshold: f64,
        direction: GuardrailDirection,
        action: GuardrailAction,
    ) -> Self {
        Self {
            metric_id: metric_id.into(),
            threshold,
            direction,
            action,
        }
    }

    /// Get the guarded metric ID
    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    /// Get the threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Get the breach direction
    pub fn direction(&self) -> GuardrailDirection {
        self.direction
    }

    /// Get the configured action
    pub fn action(&self) -> GuardrailAction {
        self.action
    }

    /// Check whether an observed value breaches the threshold
    pub fn is_breached(&self, value: f64) -> bool {
        match self.direction {
            GuardrailDirection::Above => value > self.threshold,
            GuardrailDirection::Below => value < self.threshold,
        }
    }
}

// ============================================================================
// StatisticalConfig
// ============================================================================

/// Correction applied when testing more than one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MultipleTestingCorrection {
    #[default]
    None,
    Bonferroni,
}

/// Statistical parameters of an experiment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticalConfig {
    significance_level: f64,
    power: f64,
    minimum_detectable_effect: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    baseline_conversion_rate: Option<f64>,
    #[serde(default)]
    correction: MultipleTestingCorrection,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            power: 0.8,
            minimum_detectable_effect: 0.05,
            baseline_conversion_rate: None,
            correction: MultipleTestingCorrection::None,
        }
    }
}

impl StatisticalConfig {
    /// Create a config with explicit significance level, power and MDE
    pub fn new(significance_level: f64, power: f64, minimum_detectable_effect: f64) -> Self {
        Self {
            significance_level,
            power,
            minimum_detectable_effect,
            baseline_conversion_rate: None,
            correction: MultipleTestingCorrection::None,
        }
    }

    /// Set the expected baseline conversion rate
    pub fn with_baseline_conversion_rate(mut self, rate: f64) -> Self {
        self.baseline_conversion_rate = Some(rate);
        self
    }

    /// Set the multiple-testing correction
    pub fn with_correction(mut self, correction: MultipleTestingCorrection) -> Self {
        self.correction = correction;
        self
    }

    /// Get the significance level α
    pub fn significance_level(&self) -> f64 {
        self.significance_level
    }

    /// Get the statistical power
    pub fn power(&self) -> f64 {
        self.power
    }

    /// Get the minimum detectable effect
    pub fn minimum_detectable_effect(&self) -> f64 {
        self.minimum_detectable_effect
    }

    /// Get the baseline conversion rate, if declared
    pub fn baseline_conversion_rate(&self) -> Option<f64> {
        self.baseline_conversion_rate
    }

    /// Get the multiple-testing correction
    pub fn correction(&self) -> MultipleTestingCorrection {
        self.correction
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Planned time window of an experiment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Schedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_duration_secs: Option<u64>,
}

impl Schedule {
    /// Create an open-ended schedule
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the planned start date
    pub fn with_start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.start_date = Some(start_date);
        self
    }

    /// Set the hard end date
    pub fn with_end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Set the maximum run duration in seconds
    pub fn with_max_duration_secs(mut self, secs: u64) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }

    /// Get the planned start date
    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    /// Get the hard end date
    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    /// Get the maximum run duration in seconds
    pub fn max_duration_secs(&self) -> Option<u64> {
        self.max_duration_secs
    }

    /// Check whether the schedule has expired at `now` for an experiment
    /// started at `started_at`
    pub fn is_expired(&self, started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        if let Some(end) = self.end_date {
            if now > end {
                return true;
            }
        }

        if let (Some(started), Some(secs)) = (started_at, self.max_duration_secs) {
            if now > started + Duration::seconds(secs as i64) {
                return true;
            }
        }

        false
    }
}

// ============================================================================
// ApprovalGates
// ============================================================================

/// Sign-off gates that must be set before an experiment can start
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ApprovalGates {
    #[serde(default)]
    cultural_approval: bool,
    #[serde(default)]
    neuroscience_validation: bool,
    #[serde(default)]
    ethics_review: bool,
}

impl ApprovalGates {
    /// Create gates with nothing approved
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cultural approval gate
    pub fn with_cultural_approval(mut self, approved: bool) -> Self {
        self.cultural_approval = approved;
        self
    }

    /// Set the neuroscience validation gate
    pub fn with_neuroscience_validation(mut self, validated: bool) -> Self {
        self.neuroscience_validation = validated;
        self
    }

    /// Set the ethics review gate
    pub fn with_ethics_review(mut self, reviewed: bool) -> Self {
        self.ethics_review = reviewed;
        self
    }

    /// Check the cultural approval gate
    pub fn cultural_approval(&self) -> bool {
        self.cultural_approval
    }

    /// Check the neuroscience validation gate
    pub fn neuroscience_validation(&self) -> bool {
        self.neuroscience_validation
    }

    /// Check the ethics review gate
    pub fn ethics_review(&self) -> bool {
        self.ethics_review
    }
}

// ============================================================================
// Experiment
// ============================================================================

/// An online experiment: configuration, lifecycle state and schedule.
///
/// The variant and allocation lists are fixed once the experiment leaves
/// draft; assignment walks them in declared order, so existing users never
/// reshuffle across arms mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    id: ExperimentId,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hypothesis: Option<String>,
    experiment_type: ExperimentType,
    status: ExperimentStatus,
    variants: Vec<Variant>,
    traffic_allocation: Vec<TrafficAllocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    include_rules: Vec<AudienceRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    exclude_rules: Vec<AudienceRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cultural_segments: Vec<CulturalSegment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    neuroscience_objectives: Vec<NeuroscienceObjective>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    accessibility_considerations: Vec<AccessibilityConsideration>,
    primary_metric: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    secondary_metrics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    guardrails: Vec<Guardrail>,
    statistics: StatisticalConfig,
    schedule: Schedule,
    gates: ApprovalGates,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_sample_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Experiment {
    /// Create a new experiment in Draft status with the default primary
    /// metric `conversion`
    pub fn new(id: ExperimentId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            hypothesis: None,
            experiment_type: ExperimentType::default(),
            status: ExperimentStatus::Draft,
            variants: Vec::new(),
            traffic_allocation: Vec::new(),
            include_rules: Vec::new(),
            exclude_rules: Vec::new(),
            cultural_segments: Vec::new(),
            neuroscience_objectives: Vec::new(),
            accessibility_considerations: Vec::new(),
            primary_metric: "conversion".to_string(),
            secondary_metrics: Vec::new(),
            guardrails: Vec::new(),
            statistics: StatisticalConfig::default(),
            schedule: Schedule::default(),
            gates: ApprovalGates::default(),
            required_sample_size: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    // Builder methods

    /// Set the hypothesis
    pub fn with_hypothesis(mut self, hypothesis: impl Into<String>) -> Self {
        self.hypothesis = Some(hypothesis.into());
        self
    }

    /// Set the experiment type
    pub fn with_experiment_type(mut self, experiment_type: ExperimentType) -> Self {
        self.experiment_type = experiment_type;
        self
    }

    /// Add a variant
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Add a traffic allocation
    pub fn with_traffic_allocation(mut self, allocation: TrafficAllocation) -> Self {
        self.traffic_allocation.push(allocation);
        self
    }

    /// Add an audience include rule
    pub fn with_include_rule(mut self, rule: AudienceRule) -> Self {
        self.include_rules.push(rule);
        self
    }

    /// Add an audience exclude rule
    pub fn with_exclude_rule(mut self, rule: AudienceRule) -> Self {
        self.exclude_rules.push(rule);
        self
    }

    /// Add a cultural segment
    pub fn with_cultural_segment(mut self, segment: CulturalSegment) -> Self {
        self.cultural_segments.push(segment);
        self
    }

    /// Add a neuroscience objective
    pub fn with_neuroscience_objective(mut self, objective: NeuroscienceObjective) -> Self {
        self.neuroscience_objectives.push(objective);
        self
    }

    /// Add an accessibility consideration
    pub fn with_accessibility_consideration(
        mut self,
        consideration: AccessibilityConsideration,
    ) -> Self {
        self.accessibility_considerations.push(consideration);
        self
    }

    /// Set the primary metric
    pub fn with_primary_metric(mut self, metric_id: impl Into<String>) -> Self {
        self.primary_metric = metric_id.into();
        self
    }

    /// Add a secondary metric
    pub fn with_secondary_metric(mut self, metric_id: impl Into<String>) -> Self {
        self.secondary_metrics.push(metric_id.into());
        self
    }

    /// Add a guardrail
    pub fn with_guardrail(mut self, guardrail: Guardrail) -> Self {
        self.guardrails.push(guardrail);
        self
    }

    /// Set the statistical configuration
    pub fn with_statistics(mut self, statistics: StatisticalConfig) -> Self {
        self.statistics = statistics;
        self
    }

    /// Set the schedule
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set the approval gates
    pub fn with_gates(mut self, gates: ApprovalGates) -> Self {
        self.gates = gates;
        self
    }

    // Getters

    /// Get the experiment ID
    pub fn id(&self) -> &ExperimentId {
        &self.id
    }

    /// Get the experiment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the hypothesis
    pub fn hypothesis(&self) -> Option<&str> {
        self.hypothesis.as_deref()
    }

    /// Get the experiment type
    pub fn experiment_type(&self) -> ExperimentType {
        self.experiment_type
    }

    /// Get the current status
    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Get all variants
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Get all traffic allocations
    pub fn traffic_allocation(&self) -> &[TrafficAllocation] {
        &self.traffic_allocation
    }

    /// Get the audience include rules
    pub fn include_rules(&self) -> &[AudienceRule] {
        &self.include_rules
    }

    /// Get the audience exclude rules
    pub fn exclude_rules(&self) -> &[AudienceRule] {
        &self.exclude_rules
    }

    /// Get the cultural segments
    pub fn cultural_segments(&self) -> &[CulturalSegment] {
        &self.cultural_segments
    }

    /// Get the neuroscience objectives
    pub fn neuroscience_objectives(&self) -> &[NeuroscienceObjective] {
        &self.neuroscience_objectives
    }

    /// Get the accessibility considerations
    pub fn accessibility_considerations(&self) -> &[AccessibilityConsideration] {
        &self.accessibility_considerations
    }

    /// Get the primary metric ID
    pub fn primary_metric(&self) -> &str {
        &self.primary_metric
    }

    /// Get the secondary metric IDs
    pub fn secondary_metrics(&self) -> &[String] {
        &self.secondary_metrics
    }

    /// Get the guardrails
    pub fn guardrails(&self) -> &[Guardrail] {
        &self.guardrails
    }

    /// Get the statistical configuration
    pub fn statistics(&self) -> &StatisticalConfig {
        &self.statistics
    }

    /// Get the schedule
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Get the approval gates
    pub fn gates(&self) -> &ApprovalGates {
        &self.gates
    }

    /// Get the required sample size computed at start
    pub fn required_sample_size(&self) -> Option<u64> {
        self.required_sample_size
    }

    /// Get when the experiment was started
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get when the experiment reached a terminal state
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Get when the experiment was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get when the experiment was last updated
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Status transitions

    /// Start the experiment, recording the start time and the required
    /// sample size
    pub fn start(&mut self, required_sample_size: u64) -> Result<(), ValidationViolation> {
        self.check_transition(ExperimentStatus::Running)?;
        self.status = ExperimentStatus::Running;
        self.required_sample_size = Some(required_sample_size);
        self.started_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Pause the experiment
    pub fn pause(&mut self) -> Result<(), ValidationViolation> {
        self.check_transition(ExperimentStatus::Paused)?;
        self.status = ExperimentStatus::Paused;
        self.touch();
        Ok(())
    }

    /// Resume a paused experiment
    pub fn resume(&mut self) -> Result<(), ValidationViolation> {
        if self.status != ExperimentStatus::Paused {
            return Err(ValidationViolation::InvalidStatusTransition(
                self.status.to_string(),
                ExperimentStatus::Running.to_string(),
            ));
        }
        self.status = ExperimentStatus::Running;
        self.touch();
        Ok(())
    }

    /// Complete the experiment. Fills in the schedule end date only when
    /// none was declared.
    pub fn complete(&mut self) -> Result<(), ValidationViolation> {
        self.check_transition(ExperimentStatus::Completed)?;
        let now = Utc::now();
        self.status = ExperimentStatus::Completed;
        self.completed_at = Some(now);
        if self.schedule.end_date.is_none() {
            self.schedule.end_date = Some(now);
        }
        self.touch();
        Ok(())
    }

    /// Cancel the experiment
    pub fn cancel(&mut self) -> Result<(), ValidationViolation> {
        self.check_transition(ExperimentStatus::Cancelled)?;
        self.status = ExperimentStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    // Lookup helpers

    /// Find a variant by ID
    pub fn variant(&self, id: &VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id() == id)
    }

    /// Get the first declared variant, the control arm by convention
    pub fn first_variant(&self) -> Option<&Variant> {
        self.variants.first()
    }

    /// Walk the cumulative traffic allocation for a hash percentage in
    /// `[0, 100)`. An allocation is selected when the cumulative total
    /// reaches the percentage and `conditions_pass` accepts it; failing
    /// allocations still advance the cumulative walk.
    pub fn allocation_for_percent<F>(
        &self,
        percent: f64,
        mut conditions_pass: F,
    ) -> Option<&VariantId>
    where
        F: FnMut(&TrafficAllocation) -> bool,
    {
        let mut cumulative = 0.0;

        for allocation in &self.traffic_allocation {
            cumulative += allocation.percentage();

            if percent <= cumulative && conditions_pass(allocation) {
                return Some(allocation.variant_id());
            }
        }

        None
    }

    /// Find the cultural segment a participant falls in, if any. A
    /// participant without a cultural attribute only lands in a segment
    /// marked as the catch-all.
    pub fn matching_segment(&self, cultural: Option<&str>) -> Option<&CulturalSegment> {
        match cultural {
            Some(field) => self
                .cultural_segments
                .iter()
                .find(|s| !s.is_other() && s.matches(field))
                .or_else(|| self.cultural_segments.iter().find(|s| s.is_other())),
            None => self.cultural_segments.iter().find(|s| s.is_other()),
        }
    }

    /// Check declared accessibility needs against the experiment's
    /// considerations. Participants without declared needs always pass.
    pub fn accessibility_matches(&self, needs: &[String]) -> bool {
        if self.accessibility_considerations.is_empty() || needs.is_empty() {
            return true;
        }
        needs
            .iter()
            .any(|need| self.accessibility_considerations.iter().any(|c| c.covers(need)))
    }

    // Private helpers

    fn check_transition(&self, target: ExperimentStatus) -> Result<(), ValidationViolation> {
        if !self.status.can_transition_to(target) {
            return Err(ValidationViolation::InvalidStatusTransition(
                self.status.to_string(),
                target.to_string(),
            ));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
