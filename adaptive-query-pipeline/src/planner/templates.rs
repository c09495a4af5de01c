//! Planning rules and task templates used by the task planner.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

use adaptive_query_core::types::{Domain, IntentType, QueryIntent, RetryPolicy, TaskType};

/// Id of the rule that receives the high-complexity bonus.
pub const COMPLEX_PLANNING: &str = "complex_planning";

/// Maps an intent profile to an ordered sequence of task templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanningRule {
    /// Rule id.
    pub id: String,
    /// Intent types the rule is written for.
    pub intent_types: Vec<IntentType>,
    /// Domains the rule is written for.
    pub domains: Vec<Domain>,
    /// Inclusive complexity range.
    pub complexity_range: (f32, f32),
    /// Template names, in order.
    pub task_sequence: Vec<String>,
    /// Whether the tasks may run concurrently.
    pub parallel: bool,
    /// Plan priority.
    pub priority: u32,
    /// Parameters merged into every task.
    pub config: HashMap<String, Value>,
}

/// Weights applied when scoring a rule against an intent.
#[derive(Debug, Clone, Copy)]
struct ScoreWeights {
    intent: f32,
    domain: f32,
    complexity: f32,
    confidence: f32,
}

impl ScoreWeights {
    fn for_complexity(complexity: f32) -> Self {
        if complexity >= 0.7 {
            Self {
                intent: 0.2,
                domain: 0.2,
                complexity: 0.5,
                confidence: 0.1,
            }
        } else {
            Self {
                intent: 0.3,
                domain: 0.3,
                complexity: 0.3,
                confidence: 0.1,
            }
        }
    }
}

impl PlanningRule {
    /// Whether `complexity` lies in the rule's range.
    pub fn covers_complexity(&self, complexity: f32) -> bool {
        let (low, high) = self.complexity_range;
        complexity >= low && complexity <= high
    }

    /// Applicability score of this rule for an intent.
    pub fn score(&self, intent: &QueryIntent) -> f32 {
        let weights = ScoreWeights::for_complexity(intent.complexity);
        let mut score = 0.0;
        if self.intent_types.contains(&intent.intent_type) {
            score += weights.intent;
        }
        if self.domains.contains(&intent.domain) {
            score += weights.domain;
        }
        if self.covers_complexity(intent.complexity) {
            score += weights.complexity;
            if self.id == COMPLEX_PLANNING && intent.complexity >= 0.7 {
                score += 0.2;
            }
        }
        score + intent.confidence * weights.confidence
    }
}

/// Blueprint for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTemplate {
    /// Template name, also the task's target component.
    pub name: String,
    /// Task kind.
    pub task_type: TaskType,
    /// Task priority.
    pub default_priority: u32,
    /// Expected run time.
    pub estimated_time: Duration,
    /// Default parameters.
    pub parameters: HashMap<String, Value>,
    /// Retry policy.
    pub retry_policy: RetryPolicy,
}

fn params(value: Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}

fn template(
    name: &str,
    task_type: TaskType,
    priority: u32,
    estimated_ms: u64,
    parameters: Value,
    retry_policy: RetryPolicy,
) -> TaskTemplate {
    TaskTemplate {
        name: name.to_string(),
        task_type,
        default_priority: priority,
        estimated_time: Duration::from_millis(estimated_ms),
        parameters: params(parameters),
        retry_policy,
    }
}

#[allow(clippy::too_many_arguments)]
fn rule(
    id: &str,
    intent_types: &[IntentType],
    domains: &[Domain],
    complexity_range: (f32, f32),
    task_sequence: &[&str],
    parallel: bool,
    priority: u32,
    config: Value,
) -> PlanningRule {
    PlanningRule {
        id: id.to_string(),
        intent_types: intent_types.to_vec(),
        domains: domains.to_vec(),
        complexity_range,
        task_sequence: task_sequence.iter().map(ToString::to_string).collect(),
        parallel,
        priority,
        config: params(config),
    }
}

/// The built-in planning rules.
pub fn builtin_planning_rules() -> Vec<PlanningRule> {
    use Domain::{Architecture, Backend, Database, Devops, Frontend, Programming};
    use IntentType::{Conceptual, Debugging, Procedural, Technical};

    vec![
        rule(
            "debug_planning",
            &[Debugging],
            &[Programming, Database, Frontend, Backend],
            (0.0, 1.0),
            &["analyze_error", "enhance_debug_context", "filter_debug_noise"],
            false,
            90,
            json!({
                "focus_on_errors": true,
                "include_stack_trace": true,
                "error_categorization": true,
            }),
        ),
        rule(
            "concept_planning",
            &[Conceptual],
            &[Architecture, Programming, Database],
            (0.0, 0.8),
            &["extract_concepts", "enhance_definitions", "provide_examples"],
            true,
            70,
            json!({
                "include_examples": true,
                "provide_comparisons": true,
                "conceptual_depth": "medium",
            }),
        ),
        rule(
            "procedural_planning",
            &[Procedural],
            &[Devops, Frontend, Backend, Architecture],
            (0.3, 1.0),
            &["break_down_steps", "enhance_instructions", "add_prerequisites"],
            false,
            80,
            json!({
                "step_by_step": true,
                "include_commands": true,
                "add_verification": true,
            }),
        ),
        rule(
            "technical_planning",
            &[Technical],
            &[Programming, Architecture, Database, Frontend, Backend],
            (0.0, 0.9),
            &[
                "enhance_technical_context",
                "filter_implementation_noise",
                "add_best_practices",
            ],
            true,
            60,
            json!({
                "include_code_examples": true,
                "best_practices": true,
                "performance_tips": true,
            }),
        ),
        rule(
            COMPLEX_PLANNING,
            &[Debugging, Procedural, Conceptual, Technical],
            &[Architecture, Programming, Database, Frontend, Backend, Devops],
            (0.7, 1.0),
            &[
                "decompose_query",
                "parallel_enhancement",
                "synthesize_results",
                "quality_check",
            ],
            true,
            100,
            json!({
                "multi_stage_processing": true,
                "quality_threshold": 0.8,
                "comprehensive_search": true,
            }),
        ),
    ]
}

/// The built-in task templates keyed by name.
pub fn builtin_templates() -> HashMap<String, TaskTemplate> {
    use TaskType::{Enhance, Filter};

    [
        template(
            "analyze_error",
            Enhance,
            90,
            50,
            json!({"focus_keywords": ["错误", "异常", "问题", "bug", "error"], "context_window": 3}),
            RetryPolicy::new(2, 1.5, 10),
        ),
        template(
            "enhance_debug_context",
            Enhance,
            80,
            30,
            json!({"enhancement_terms": ["调试", "问题排查", "错误分析", "代码质量"], "boost_factor": 1.5}),
            RetryPolicy::new(2, 1.2, 5),
        ),
        template(
            "extract_concepts",
            Enhance,
            70,
            40,
            json!({"concept_keywords": ["概念", "原理", "理论", "定义"], "depth_level": "medium"}),
            RetryPolicy::new(2, 1.3, 8),
        ),
        template(
            "break_down_steps",
            Enhance,
            85,
            60,
            json!({"step_keywords": ["步骤", "教程", "操作指南", "如何"], "sequential": true}),
            RetryPolicy::new(3, 1.4, 12),
        ),
        template(
            "enhance_technical_context",
            Enhance,
            75,
            45,
            json!({"technical_terms": ["实现", "技术方案", "代码", "算法"], "include_examples": true}),
            RetryPolicy::new(2, 1.3, 10),
        ),
        template(
            "filter_debug_noise",
            Filter,
            60,
            25,
            json!({"noise_patterns": ["无关", "干扰", "冗余"], "filter_threshold": 0.3}),
            RetryPolicy::new(1, 1.0, 5),
        ),
        template(
            "enhance_definitions",
            Enhance,
            70,
            35,
            json!({"definition_terms": ["定义", "解释", "含义"]}),
            RetryPolicy::new(2, 1.2, 8),
        ),
        template(
            "provide_examples",
            Enhance,
            65,
            40,
            json!({"example_keywords": ["示例", "例子", "案例"]}),
            RetryPolicy::new(2, 1.2, 8),
        ),
        template(
            "enhance_instructions",
            Enhance,
            80,
            50,
            json!({"instruction_terms": ["指令", "步骤", "操作"]}),
            RetryPolicy::new(2, 1.3, 10),
        ),
        template(
            "add_prerequisites",
            Enhance,
            75,
            30,
            json!({"prerequisite_terms": ["前提", "要求", "准备"]}),
            RetryPolicy::new(2, 1.2, 8),
        ),
        template(
            "filter_implementation_noise",
            Filter,
            60,
            25,
            json!({"noise_patterns": ["无关实现", "冗余代码"]}),
            RetryPolicy::new(1, 1.0, 5),
        ),
        template(
            "add_best_practices",
            Enhance,
            70,
            35,
            json!({"best_practice_terms": ["最佳实践", "推荐做法", "优化建议"]}),
            RetryPolicy::new(2, 1.2, 8),
        ),
        template(
            "decompose_query",
            Enhance,
            95,
            60,
            json!({"decomposition_strategy": "hierarchical"}),
            RetryPolicy::new(3, 1.4, 15),
        ),
        template(
            "parallel_enhancement",
            Enhance,
            90,
            80,
            json!({"parallel_strategies": ["semantic", "syntactic", "contextual"]}),
            RetryPolicy::new(3, 1.5, 20),
        ),
        template(
            "synthesize_results",
            Enhance,
            85,
            70,
            json!({"synthesis_method": "weighted_combination"}),
            RetryPolicy::new(2, 1.3, 12),
        ),
        template(
            "quality_check",
            Filter,
            80,
            40,
            json!({"quality_threshold": 0.8}),
            RetryPolicy::new(2, 1.2, 10),
        ),
    ]
    .into_iter()
    .map(|t| (t.name.clone(), t))
    .collect()
}
